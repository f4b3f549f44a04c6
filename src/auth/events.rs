//! Observability events emitted by the auth state store.

use std::time::Duration;
use tokio::sync::broadcast;

/// Something the store did that observers may care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A write job reached the store.
    Write { id: String, duration: Duration },
    /// A read was answered from the cache.
    CacheHit { id: String },
    /// A read fell through to the store.
    CacheMiss { id: String },
    /// A record was deleted from the store.
    Remove { id: String },
}

impl AuthEvent {
    /// Identifier of the record the event concerns.
    pub fn id(&self) -> &str {
        match self {
            AuthEvent::Write { id, .. }
            | AuthEvent::CacheHit { id }
            | AuthEvent::CacheMiss { id }
            | AuthEvent::Remove { id } => id,
        }
    }
}

/// Fan-out of [`AuthEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<AuthEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; nobody listening is fine.
    pub(crate) fn emit(&self, event: AuthEvent) {
        let _ = self.tx.send(event);
    }
}
