//! [`MessagingCapable`] implementation over an injected client handle.

use super::traits::*;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Pause after a "composing" presence update.
pub const TYPING_DELAY: Duration = Duration::from_millis(200);
/// Pause after a "recording" presence update.
pub const RECORDING_DELAY: Duration = Duration::from_millis(400);
/// Pause between deleting a quoted message and the command that quoted it.
pub const DELETE_DELAY: Duration = Duration::from_millis(750);

const USER_JID_SUFFIX: &str = "@s.whatsapp.net";

/// Chat helpers for one client handle.
#[derive(Debug, Clone)]
pub struct Messenger<C> {
    client: C,
    typing_delay: Duration,
    recording_delay: Duration,
    delete_delay: Duration,
}

impl<C: ProtocolClient> Messenger<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            typing_delay: TYPING_DELAY,
            recording_delay: RECORDING_DELAY,
            delete_delay: DELETE_DELAY,
        }
    }

    /// Override the presence pauses.
    pub fn with_delays(mut self, typing: Duration, recording: Duration) -> Self {
        self.typing_delay = typing;
        self.recording_delay = recording;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Show "composing", wait, then send.
    async fn send_message(
        &self,
        jid: &str,
        content: OutgoingContent,
        options: SendOptions,
    ) -> MessagingResult<()> {
        self.client
            .send_presence_update(Presence::Composing, jid)
            .await?;
        sleep(self.typing_delay).await;
        self.client.send_message(jid, content, options).await
    }

    /// Answer in the chat of `m`, optionally quoting it.
    async fn respond(
        &self,
        action: &'static str,
        m: &WebMessage,
        content: OutgoingContent,
        quote: bool,
    ) -> MessagingResult<()> {
        let result = async {
            let jid = m.remote_jid()?;
            let options = if quote {
                SendOptions::quoting(m)
            } else {
                SendOptions::default()
            };
            debug!(action, jid, quoted = quote, "sending message");
            self.send_message(jid, content, options).await
        }
        .await;

        result.map_err(|err| MessagingError::Action {
            action,
            source: Box::new(err),
        })
    }

    async fn respond_audio(
        &self,
        action: &'static str,
        m: &WebMessage,
        media: MediaSource,
        ptt: bool,
        quote: bool,
    ) -> MessagingResult<()> {
        let result = async {
            let jid = m.remote_jid()?;
            self.client
                .send_presence_update(Presence::Recording, jid)
                .await?;
            sleep(self.recording_delay).await;
            Ok::<(), MessagingError>(())
        }
        .await;

        if let Err(err) = result {
            return Err(MessagingError::Action {
                action,
                source: Box::new(err),
            });
        }

        let content = OutgoingContent::Audio {
            media,
            ptt,
            mimetype: AUDIO_MIMETYPE.to_string(),
        };
        self.respond(action, m, content, quote).await
    }

    async fn ensure_group_admin(&self, jid: &str) -> MessagingResult<()> {
        let user = self
            .client
            .user_id()
            .await
            .ok_or(MessagingError::NotLoggedIn)?;
        let number = user.split([':', '@']).next().unwrap_or_default();
        let own_jid = format!("{}{}", number, USER_JID_SUFFIX);

        let participants = self.client.group_participants(jid).await?;
        if participants
            .iter()
            .any(|p| p.admin && p.id.contains(&own_jid))
        {
            Ok(())
        } else {
            Err(MessagingError::NotGroupAdmin)
        }
    }

    /// Delete the message `m` quotes, pause, then delete `m`.
    async fn delete_quoted(
        &self,
        action: &'static str,
        m: &WebMessage,
        require_admin: bool,
    ) -> MessagingResult<()> {
        let result = async {
            let jid = m.remote_jid()?;
            if require_admin {
                self.ensure_group_admin(jid).await?;
            }
            let quoted = m.quoted_key()?;

            debug!(action, jid, "deleting message");
            self.send_message(jid, OutgoingContent::Delete(quoted), SendOptions::default())
                .await?;
            sleep(self.delete_delay).await;
            self.client
                .send_message(jid, OutgoingContent::Delete(m.key.clone()), SendOptions::default())
                .await
        }
        .await;

        result.map_err(|err| MessagingError::Action {
            action,
            source: Box::new(err),
        })
    }
}

fn caption(caption: Option<&str>) -> Option<String> {
    caption.map(str::to_string)
}

#[async_trait]
impl<C: ProtocolClient> MessagingCapable for Messenger<C> {
    async fn send_text(&self, jid: &str, text: &str) -> MessagingResult<()> {
        self.send_message(jid, OutgoingContent::Text(text.to_string()), SendOptions::default())
            .await
    }

    async fn send(&self, m: &WebMessage, text: &str) -> MessagingResult<()> {
        self.respond("send", m, OutgoingContent::Text(text.to_string()), false)
            .await
    }

    async fn reply(&self, m: &WebMessage, text: &str) -> MessagingResult<()> {
        self.respond("reply", m, OutgoingContent::Text(text.to_string()), true)
            .await
    }

    async fn react(&self, m: &WebMessage, emoji: &str) -> MessagingResult<()> {
        let content = OutgoingContent::React {
            text: emoji.to_string(),
            key: m.key.clone(),
        };
        self.respond("react", m, content, false).await
    }

    async fn send_image(
        &self,
        m: &WebMessage,
        media: MediaSource,
        text: Option<&str>,
    ) -> MessagingResult<()> {
        let content = OutgoingContent::Image {
            media,
            caption: caption(text),
        };
        self.respond("sendImage", m, content, false).await
    }

    async fn send_image_reply(
        &self,
        m: &WebMessage,
        media: MediaSource,
        text: Option<&str>,
    ) -> MessagingResult<()> {
        let content = OutgoingContent::Image {
            media,
            caption: caption(text),
        };
        self.respond("sendImageReply", m, content, true).await
    }

    async fn send_video(
        &self,
        m: &WebMessage,
        media: MediaSource,
        text: Option<&str>,
    ) -> MessagingResult<()> {
        let content = OutgoingContent::Video {
            media,
            caption: caption(text),
        };
        self.respond("sendVideo", m, content, false).await
    }

    async fn send_video_reply(
        &self,
        m: &WebMessage,
        media: MediaSource,
        text: Option<&str>,
    ) -> MessagingResult<()> {
        let content = OutgoingContent::Video {
            media,
            caption: caption(text),
        };
        self.respond("sendVideoReply", m, content, true).await
    }

    async fn send_document(
        &self,
        m: &WebMessage,
        media: MediaSource,
        mimetype: &str,
        file_name: &str,
        text: Option<&str>,
    ) -> MessagingResult<()> {
        let content = OutgoingContent::Document {
            media,
            mimetype: mimetype.to_string(),
            file_name: file_name.to_string(),
            caption: caption(text),
        };
        self.respond("sendDocument", m, content, false).await
    }

    async fn send_document_reply(
        &self,
        m: &WebMessage,
        media: MediaSource,
        mimetype: &str,
        file_name: &str,
        text: Option<&str>,
    ) -> MessagingResult<()> {
        let content = OutgoingContent::Document {
            media,
            mimetype: mimetype.to_string(),
            file_name: file_name.to_string(),
            caption: caption(text),
        };
        self.respond("sendDocumentReply", m, content, true).await
    }

    async fn send_sticker(&self, m: &WebMessage, media: MediaSource) -> MessagingResult<()> {
        self.respond("sendSticker", m, OutgoingContent::Sticker(media), false)
            .await
    }

    async fn send_sticker_reply(&self, m: &WebMessage, media: MediaSource) -> MessagingResult<()> {
        self.respond("sendStickerReply", m, OutgoingContent::Sticker(media), true)
            .await
    }

    async fn send_audio(&self, m: &WebMessage, media: MediaSource, ptt: bool) -> MessagingResult<()> {
        self.respond_audio("sendAudio", m, media, ptt, false).await
    }

    async fn send_audio_reply(
        &self,
        m: &WebMessage,
        media: MediaSource,
        ptt: bool,
    ) -> MessagingResult<()> {
        self.respond_audio("sendAudioReply", m, media, ptt, true).await
    }

    async fn send_gif(
        &self,
        m: &WebMessage,
        media: MediaSource,
        playback: bool,
    ) -> MessagingResult<()> {
        self.respond("sendGif", m, OutgoingContent::Gif { media, playback }, false)
            .await
    }

    async fn send_gif_reply(
        &self,
        m: &WebMessage,
        media: MediaSource,
        playback: bool,
    ) -> MessagingResult<()> {
        self.respond("sendGifReply", m, OutgoingContent::Gif { media, playback }, true)
            .await
    }

    async fn edit_message(
        &self,
        m: &WebMessage,
        sent: &MessageKey,
        text: &str,
    ) -> MessagingResult<()> {
        let content = OutgoingContent::Edit {
            key: sent.clone(),
            text: text.to_string(),
        };
        self.respond("editMsg", m, content, false).await
    }

    async fn delete_message(&self, m: &WebMessage) -> MessagingResult<()> {
        self.delete_quoted("deleteMsg", m, false).await
    }

    async fn delete_message_in_group(&self, m: &WebMessage) -> MessagingResult<()> {
        self.delete_quoted("deleteMsgGroup", m, true).await
    }
}
