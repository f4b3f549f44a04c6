//! Messaging helpers
//!
//! Outbound chat helpers (text, replies, reactions, media) over an injected
//! protocol client handle. No global client state: each [`Messenger`] owns
//! its handle.

pub mod messenger;
pub mod mock;
pub mod traits;

pub use messenger::Messenger;
pub use mock::MockProtocolClient;
pub use traits::*;
