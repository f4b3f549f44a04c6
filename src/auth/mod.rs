//! Persistent authentication state.
//!
//! One credential bundle plus an open-ended set of signal-protocol key
//! records, kept in a [`DocumentCollection`](crate::store::DocumentCollection)
//! behind a read-through TTL cache and a single-flight write queue.
//!
//! ## Components
//!
//! - [`cache`]: bounded TTL cache with a periodic sweep
//! - [`queue`]: FIFO write queue executed one job at a time, with retry
//! - [`creds`]: the typed credential bundle
//! - [`keys`]: key categories and structured key records
//! - [`state`]: the facade handed to the protocol client

pub mod cache;
pub mod creds;
mod document;
pub mod events;
pub mod keys;
pub mod options;
pub mod queue;
pub mod retry;
pub mod state;

pub use cache::{FillTicket, TtlCache};
pub use creds::{AccountSettings, AuthenticationCreds, KeyPair, SignedKeyPair};
pub use events::AuthEvent;
pub use keys::{
    record_id, AppStateSyncKeyData, AppStateSyncKeyFingerprint, KeyCategory, KeyRecord,
    KeyRecordSet,
};
pub use options::AuthStateOptions;
pub use queue::{WriteOp, WriteQueue, WriteTicket};
pub use retry::RetryPolicy;
pub use state::{AuthStateStore, AuthenticationState, KeyStore, SignalKeyStore, CREDS_ID};

use crate::serialization::CodecError;
use crate::store::StoreError;
use thiserror::Error;

/// Result type for auth state operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors surfaced by the auth state store.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Malformed record: {0}")]
    Codec(#[from] CodecError),

    #[error("Write queue is closed")]
    QueueClosed,
}
