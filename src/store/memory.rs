//! In-memory document collection for testing.
//!
//! Besides storing documents, it lets tests inject store failures and
//! latency, and records the order and timing of every write so write
//! serialization can be asserted.

use super::{apply_set, DeleteAck, Document, DocumentCollection, StoreError, StoreResult, UpdateAck};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// A completed write as observed by the collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    /// Document identifier.
    pub id: String,
    /// Event sequence number when the write started.
    pub started: u64,
    /// Event sequence number when the write finished.
    pub finished: u64,
}

#[derive(Default)]
struct MemoryState {
    documents: HashMap<String, Document>,
    write_log: Vec<WriteRecord>,
    pending_write_failures: u32,
    fail_reads: bool,
    fail_deletes: bool,
    write_latency: Option<Duration>,
}

/// In-memory document collection.
#[derive(Clone, Default)]
pub struct MemoryCollection {
    state: Arc<Mutex<MemoryState>>,
    sequence: Arc<AtomicU64>,
    reads: Arc<AtomicU64>,
    write_attempts: Arc<AtomicU64>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MemoryCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls to `update_one` fail with a network error.
    pub async fn fail_next_writes(&self, count: u32) {
        self.state.lock().await.pending_write_failures = count;
    }

    /// Make every `find_one` fail while set.
    pub async fn set_fail_reads(&self, fail: bool) {
        self.state.lock().await.fail_reads = fail;
    }

    /// Make every `delete_one` fail while set.
    pub async fn set_fail_deletes(&self, fail: bool) {
        self.state.lock().await.fail_deletes = fail;
    }

    /// Delay every `update_one` by `latency` before it completes.
    pub async fn set_write_latency(&self, latency: Duration) {
        self.state.lock().await.write_latency = Some(latency);
    }

    /// Store a document directly, bypassing failure injection and the write log.
    pub async fn insert_raw(&self, id: &str, document: Document) {
        let document = apply_set(None, id, document);
        self.state
            .lock()
            .await
            .documents
            .insert(id.to_string(), document);
    }

    /// Current document under `id`.
    pub async fn document(&self, id: &str) -> Option<Document> {
        self.state.lock().await.documents.get(id).cloned()
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.state.lock().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Successful writes in completion order.
    pub async fn write_log(&self) -> Vec<WriteRecord> {
        self.state.lock().await.write_log.clone()
    }

    /// Number of `find_one` calls, failed ones included.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `update_one` calls, failed ones included.
    pub fn write_attempts(&self) -> u64 {
        self.write_attempts.load(Ordering::SeqCst)
    }

    /// Highest number of `update_one` calls ever observed in flight at once.
    pub fn max_concurrent_writes(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    async fn find_one(&self, id: &str) -> StoreResult<Option<Document>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().await;
        if state.fail_reads {
            return Err(StoreError::Network(format!("read of {} refused", id)));
        }
        Ok(state.documents.get(id).cloned())
    }

    async fn update_one(&self, id: &str, set: Document, upsert: bool) -> StoreResult<UpdateAck> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        let started = self.next_sequence();
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let result = self.write(id, set, upsert, started).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn delete_one(&self, id: &str) -> StoreResult<DeleteAck> {
        let mut state = self.state.lock().await;
        if state.fail_deletes {
            return Err(StoreError::Network(format!("delete of {} refused", id)));
        }
        let deleted = u64::from(state.documents.remove(id).is_some());
        Ok(DeleteAck { deleted })
    }
}

impl MemoryCollection {
    async fn write(
        &self,
        id: &str,
        set: Document,
        upsert: bool,
        started: u64,
    ) -> StoreResult<UpdateAck> {
        let latency = {
            let mut state = self.state.lock().await;
            if state.pending_write_failures > 0 {
                state.pending_write_failures -= 1;
                return Err(StoreError::Network(format!("write of {} refused", id)));
            }
            state.write_latency
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        let existing = state.documents.remove(id);
        let matched = u64::from(existing.is_some());
        if existing.is_none() && !upsert {
            return Ok(UpdateAck {
                matched: 0,
                upserted: false,
            });
        }

        state
            .documents
            .insert(id.to_string(), apply_set(existing, id, set));
        let finished = self.next_sequence();
        state.write_log.push(WriteRecord {
            id: id.to_string(),
            started,
            finished,
        });

        Ok(UpdateAck {
            matched,
            upserted: matched == 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_upsert_then_find() {
        let collection = MemoryCollection::new();
        let ack = collection
            .update_one("creds", doc(json!({"registered": false})), true)
            .await
            .unwrap();
        assert!(ack.upserted);

        let found = collection.find_one("creds").await.unwrap().unwrap();
        assert_eq!(found.get("registered"), Some(&json!(false)));
        assert_eq!(found.get("_id"), Some(&json!("creds")));
        assert_eq!(collection.write_log().await.len(), 1);
    }

    #[tokio::test]
    async fn test_update_without_upsert_skips_missing() {
        let collection = MemoryCollection::new();
        let ack = collection
            .update_one("missing", doc(json!({"x": 1})), false)
            .await
            .unwrap();
        assert_eq!(ack, UpdateAck::default());
        assert!(collection.is_empty().await);
    }

    #[tokio::test]
    async fn test_injected_write_failures_are_consumed() {
        let collection = MemoryCollection::new();
        collection.fail_next_writes(2).await;

        assert!(collection.update_one("a", Document::new(), true).await.is_err());
        assert!(collection.update_one("a", Document::new(), true).await.is_err());
        assert!(collection.update_one("a", Document::new(), true).await.is_ok());
        assert_eq!(collection.write_attempts(), 3);
        assert_eq!(collection.write_log().await.len(), 1);
    }

    #[tokio::test]
    async fn test_read_and_delete_failures() {
        let collection = MemoryCollection::new();
        collection.insert_raw("a", Document::new()).await;

        collection.set_fail_reads(true).await;
        assert!(matches!(
            collection.find_one("a").await,
            Err(StoreError::Network(_))
        ));

        collection.set_fail_deletes(true).await;
        assert!(collection.delete_one("a").await.is_err());

        collection.set_fail_deletes(false).await;
        assert_eq!(collection.delete_one("a").await.unwrap().deleted, 1);
        assert_eq!(collection.delete_one("a").await.unwrap().deleted, 0);
    }
}
