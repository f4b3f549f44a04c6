//! Messaging trait abstractions.
//!
//! [`ProtocolClient`] is the black-box client handle (connection, encryption,
//! delivery). [`MessagingCapable`] is the helper surface built on top of it.

use async_trait::async_trait;
use std::fmt;

/// Identifies a message within a chat.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageKey {
    /// Chat the message belongs to.
    pub remote_jid: Option<String>,
    pub id: Option<String>,
    pub from_me: bool,
    /// Sender within a group chat.
    pub participant: Option<String>,
}

/// Reference from a message to the one it quotes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContextInfo {
    /// Id of the quoted message.
    pub stanza_id: Option<String>,
    /// Sender of the quoted message.
    pub participant: Option<String>,
}

/// A received message, as far as replies, reactions and deletes need it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WebMessage {
    pub key: MessageKey,
    pub context: Option<ContextInfo>,
}

impl WebMessage {
    pub fn new(remote_jid: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            key: MessageKey {
                remote_jid: Some(remote_jid.into()),
                id: Some(id.into()),
                ..MessageKey::default()
            },
            context: None,
        }
    }

    /// Mark this message as quoting `stanza_id`, sent by `participant`.
    pub fn in_reply_to(mut self, stanza_id: impl Into<String>, participant: Option<String>) -> Self {
        self.context = Some(ContextInfo {
            stanza_id: Some(stanza_id.into()),
            participant,
        });
        self
    }

    /// Key of the quoted message, in this message's chat.
    ///
    /// The quoted message counts as our own when its sender matches this
    /// message's sender.
    pub fn quoted_key(&self) -> MessagingResult<MessageKey> {
        let context = self
            .context
            .as_ref()
            .ok_or(MessagingError::MissingQuotedMessage)?;
        let id = context
            .stanza_id
            .clone()
            .ok_or(MessagingError::MissingQuotedMessage)?;
        Ok(MessageKey {
            remote_jid: self.key.remote_jid.clone(),
            id: Some(id),
            from_me: self.key.participant == context.participant,
            participant: context.participant.clone(),
        })
    }

    /// Chat to answer in.
    pub fn remote_jid(&self) -> MessagingResult<&str> {
        self.key
            .remote_jid
            .as_deref()
            .filter(|jid| !jid.is_empty())
            .ok_or(MessagingError::MissingRemoteJid)
    }
}

/// Media payload: inline bytes or a URL the client fetches.
#[derive(Clone, PartialEq, Eq)]
pub enum MediaSource {
    Bytes(Vec<u8>),
    Url(String),
}

impl fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaSource::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            MediaSource::Url(url) => write!(f, "Url({})", url),
        }
    }
}

impl From<Vec<u8>> for MediaSource {
    fn from(bytes: Vec<u8>) -> Self {
        MediaSource::Bytes(bytes)
    }
}

impl From<&str> for MediaSource {
    fn from(url: &str) -> Self {
        MediaSource::Url(url.to_string())
    }
}

impl From<String> for MediaSource {
    fn from(url: String) -> Self {
        MediaSource::Url(url)
    }
}

pub const AUDIO_MIMETYPE: &str = "audio/mpeg";

/// Outgoing message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingContent {
    Text(String),
    Image {
        media: MediaSource,
        caption: Option<String>,
    },
    Video {
        media: MediaSource,
        caption: Option<String>,
    },
    Document {
        media: MediaSource,
        mimetype: String,
        file_name: String,
        caption: Option<String>,
    },
    Sticker(MediaSource),
    Audio {
        media: MediaSource,
        ptt: bool,
        mimetype: String,
    },
    /// Video played back as a looping GIF when `playback` is set.
    Gif {
        media: MediaSource,
        playback: bool,
    },
    React {
        text: String,
        key: MessageKey,
    },
    /// Replace the text of an earlier message.
    Edit {
        key: MessageKey,
        text: String,
    },
    /// Delete a message for everyone.
    Delete(MessageKey),
}

/// Member of a group chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupParticipant {
    pub id: String,
    pub admin: bool,
}

/// Per-send options.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SendOptions {
    /// Message being replied to.
    pub quoted: Option<WebMessage>,
}

impl SendOptions {
    pub fn quoting(message: &WebMessage) -> Self {
        Self {
            quoted: Some(message.clone()),
        }
    }
}

/// Chat presence shown to the recipient before a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Composing,
    Recording,
}

/// Result type for messaging operations
pub type MessagingResult<T> = Result<T, MessagingError>;

/// Messaging errors
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("Message has no remote JID")]
    MissingRemoteJid,

    #[error("Message does not quote another message")]
    MissingQuotedMessage,

    #[error("Client has no logged-in user")]
    NotLoggedIn,

    #[error("I cannot delete messages because I am not an admin in this group.")]
    NotGroupAdmin,

    #[error("Client error: {0}")]
    Client(String),

    #[error("Error in {action}: {source}")]
    Action {
        action: &'static str,
        #[source]
        source: Box<MessagingError>,
    },
}

/// Protocol client handle.
///
/// Injected into [`Messenger`](super::Messenger) so several identities can
/// run side by side, each with its own client.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    async fn send_presence_update(&self, presence: Presence, jid: &str) -> MessagingResult<()>;

    async fn send_message(
        &self,
        jid: &str,
        content: OutgoingContent,
        options: SendOptions,
    ) -> MessagingResult<()>;

    async fn group_participants(&self, jid: &str) -> MessagingResult<Vec<GroupParticipant>>;

    /// JID of the logged-in account, possibly with a `:device` suffix.
    async fn user_id(&self) -> Option<String>;
}

/// Chat helpers built on a [`ProtocolClient`].
///
/// Every method except `send_text` answers in the chat of the given message
/// and fails with [`MessagingError::MissingRemoteJid`] when it has none.
#[async_trait]
pub trait MessagingCapable {
    async fn send_text(&self, jid: &str, text: &str) -> MessagingResult<()>;

    async fn send(&self, m: &WebMessage, text: &str) -> MessagingResult<()>;

    async fn reply(&self, m: &WebMessage, text: &str) -> MessagingResult<()>;

    async fn react(&self, m: &WebMessage, emoji: &str) -> MessagingResult<()>;

    async fn send_image(
        &self,
        m: &WebMessage,
        media: MediaSource,
        caption: Option<&str>,
    ) -> MessagingResult<()>;

    async fn send_image_reply(
        &self,
        m: &WebMessage,
        media: MediaSource,
        caption: Option<&str>,
    ) -> MessagingResult<()>;

    async fn send_video(
        &self,
        m: &WebMessage,
        media: MediaSource,
        caption: Option<&str>,
    ) -> MessagingResult<()>;

    async fn send_video_reply(
        &self,
        m: &WebMessage,
        media: MediaSource,
        caption: Option<&str>,
    ) -> MessagingResult<()>;

    async fn send_document(
        &self,
        m: &WebMessage,
        media: MediaSource,
        mimetype: &str,
        file_name: &str,
        caption: Option<&str>,
    ) -> MessagingResult<()>;

    async fn send_document_reply(
        &self,
        m: &WebMessage,
        media: MediaSource,
        mimetype: &str,
        file_name: &str,
        caption: Option<&str>,
    ) -> MessagingResult<()>;

    async fn send_sticker(&self, m: &WebMessage, media: MediaSource) -> MessagingResult<()>;

    async fn send_sticker_reply(&self, m: &WebMessage, media: MediaSource) -> MessagingResult<()>;

    async fn send_audio(&self, m: &WebMessage, media: MediaSource, ptt: bool) -> MessagingResult<()>;

    async fn send_audio_reply(
        &self,
        m: &WebMessage,
        media: MediaSource,
        ptt: bool,
    ) -> MessagingResult<()>;

    async fn send_gif(&self, m: &WebMessage, media: MediaSource, playback: bool)
        -> MessagingResult<()>;

    async fn send_gif_reply(
        &self,
        m: &WebMessage,
        media: MediaSource,
        playback: bool,
    ) -> MessagingResult<()>;

    /// Replace the text of `sent`, a message we sent in the chat of `m`.
    async fn edit_message(&self, m: &WebMessage, sent: &MessageKey, text: &str)
        -> MessagingResult<()>;

    /// Delete the message `m` quotes, then `m` itself.
    async fn delete_message(&self, m: &WebMessage) -> MessagingResult<()>;

    /// Like [`delete_message`](MessagingCapable::delete_message), but first
    /// checks that we are an admin of the group, failing with
    /// [`MessagingError::NotGroupAdmin`] otherwise.
    async fn delete_message_in_group(&self, m: &WebMessage) -> MessagingResult<()>;
}
