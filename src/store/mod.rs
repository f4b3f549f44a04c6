//! Document collection abstraction.
//!
//! The auth state persists every record as one document keyed by an opaque
//! identifier. Only three operations are needed from the backing store, so
//! the trait stays deliberately narrow:
//!
//! - **find_one**: fetch a document by identifier
//! - **update_one**: `$set` fields on a document, optionally upserting it
//! - **delete_one**: remove a document
//!
//! Implementations:
//! - [`MemoryCollection`]: in-process, with failure injection for tests
//! - [`SqliteCollection`]: durable, one JSON document per row

pub mod memory;
pub mod sqlite;

pub use memory::{MemoryCollection, WriteRecord};
pub use sqlite::SqliteCollection;

use async_trait::async_trait;
use thiserror::Error;

/// A stored document: a JSON object.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Field holding the document identifier.
pub const ID_FIELD: &str = "_id";

/// Result type for collection operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a document collection.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Acknowledgement of an `update_one` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateAck {
    /// Number of existing documents matched (0 or 1).
    pub matched: u64,
    /// Whether a new document was created.
    pub upserted: bool,
}

/// Acknowledgement of a `delete_one` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteAck {
    /// Number of documents removed (0 or 1).
    pub deleted: u64,
}

/// A collection of documents keyed by identifier.
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    /// Fetch the document stored under `id`, if any.
    async fn find_one(&self, id: &str) -> StoreResult<Option<Document>>;

    /// Overwrite the given fields of the document under `id`.
    ///
    /// Fields not named in `set` are preserved. When no document exists and
    /// `upsert` is true, one is created holding `set` plus the identifier.
    async fn update_one(&self, id: &str, set: Document, upsert: bool) -> StoreResult<UpdateAck>;

    /// Remove the document under `id`. Removing a missing document is not an error.
    async fn delete_one(&self, id: &str) -> StoreResult<DeleteAck>;
}

/// Apply `$set` semantics to an existing (or fresh) document.
pub(crate) fn apply_set(existing: Option<Document>, id: &str, set: Document) -> Document {
    let mut document = existing.unwrap_or_default();
    for (field, value) in set {
        if field != ID_FIELD {
            document.insert(field, value);
        }
    }
    document.insert(ID_FIELD.to_string(), serde_json::Value::String(id.to_string()));
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_apply_set_preserves_untouched_fields() {
        let existing = doc(json!({"_id": "creds", "a": 1, "b": 2}));
        let merged = apply_set(Some(existing), "creds", doc(json!({"b": 3, "c": 4})));
        assert_eq!(
            serde_json::Value::Object(merged),
            json!({"_id": "creds", "a": 1, "b": 3, "c": 4})
        );
    }

    #[test]
    fn test_apply_set_cannot_change_identifier() {
        let merged = apply_set(None, "session-1", doc(json!({"_id": "other", "x": true})));
        assert_eq!(merged.get(ID_FIELD), Some(&json!("session-1")));
        assert_eq!(merged.get("x"), Some(&json!(true)));
    }
}
