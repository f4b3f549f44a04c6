//! Mock Protocol Client for Testing
//!
//! Records presence updates and sent messages instead of talking to a network.

use super::traits::*;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A message handed to the mock client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub jid: String,
    pub content: OutgoingContent,
    pub options: SendOptions,
}

#[derive(Default)]
struct MockState {
    sent_messages: Vec<SentMessage>,
    presence_updates: Vec<(Presence, String)>,
    groups: HashMap<String, Vec<GroupParticipant>>,
    user_id: Option<String>,
    fail_sends: bool,
}

/// Mock protocol client for testing
#[derive(Clone, Default)]
pub struct MockProtocolClient {
    state: Arc<Mutex<MockState>>,
}

impl MockProtocolClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `send_message` fail while set.
    pub async fn fail_sends(&self, fail: bool) {
        self.state.lock().await.fail_sends = fail;
    }

    pub async fn set_user_id(&self, user_id: impl Into<String>) {
        self.state.lock().await.user_id = Some(user_id.into());
    }

    pub async fn set_group_participants(&self, jid: &str, participants: Vec<GroupParticipant>) {
        self.state
            .lock()
            .await
            .groups
            .insert(jid.to_string(), participants);
    }

    /// Get sent messages for assertions
    pub async fn sent_messages(&self) -> Vec<SentMessage> {
        self.state.lock().await.sent_messages.clone()
    }

    pub async fn presence_updates(&self) -> Vec<(Presence, String)> {
        self.state.lock().await.presence_updates.clone()
    }

    /// Clear all state
    pub async fn clear(&self) {
        *self.state.lock().await = MockState::default();
    }
}

#[async_trait]
impl ProtocolClient for MockProtocolClient {
    async fn send_presence_update(&self, presence: Presence, jid: &str) -> MessagingResult<()> {
        self.state
            .lock()
            .await
            .presence_updates
            .push((presence, jid.to_string()));
        Ok(())
    }

    async fn send_message(
        &self,
        jid: &str,
        content: OutgoingContent,
        options: SendOptions,
    ) -> MessagingResult<()> {
        let mut state = self.state.lock().await;
        if state.fail_sends {
            return Err(MessagingError::Client(format!("send to {} refused", jid)));
        }
        state.sent_messages.push(SentMessage {
            jid: jid.to_string(),
            content,
            options,
        });
        Ok(())
    }

    async fn group_participants(&self, jid: &str) -> MessagingResult<Vec<GroupParticipant>> {
        self.state
            .lock()
            .await
            .groups
            .get(jid)
            .cloned()
            .ok_or_else(|| MessagingError::Client(format!("unknown group {}", jid)))
    }

    async fn user_id(&self) -> Option<String> {
        self.state.lock().await.user_id.clone()
    }
}
