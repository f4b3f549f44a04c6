//! credstore - persisted auth state for signal-protocol clients
//!
//! Keeps one credential bundle and an open-ended set of key records in a
//! document collection, with a read-through TTL cache in front and a
//! single-flight retrying write queue behind.
//!
//! Key principles:
//! - At most one store write in flight, applied in enqueue order
//! - Byte buffers, maps, sets and big integers survive the round trip
//! - Background tasks are owned by the store and stopped by `shutdown()`

pub mod auth;
pub mod messaging;
pub mod serialization;
pub mod store;
