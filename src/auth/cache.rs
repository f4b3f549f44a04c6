//! Bounded TTL cache for decoded records.
//!
//! ## Policy
//!
//! - **Reads never check age**: `get` returns whatever is cached; expiry is
//!   enforced only by the periodic sweep, so an entry may outlive its TTL by
//!   up to one sweep interval.
//! - **Capacity eviction**: inserting past capacity evicts the entry with the
//!   earliest cache timestamp. Ties (same instant) go to the entry inserted
//!   first. Overwriting a key refreshes both its timestamp and its position.
//! - **Read-through fills never clobber writes**: a fill started before a
//!   write (or removal) of the same id completes is dropped, so a slow store
//!   read cannot replace the value the write path just cached.

use crate::serialization::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    cached_at: Instant,
    seq: u64,
}

/// Handle for one read-through fill, taken before the store read.
///
/// Dropping it without calling [`TtlCache::fill`] abandons the fill.
#[derive(Debug)]
pub struct FillTicket {
    generation: u64,
    pending: Arc<AtomicUsize>,
}

impl Drop for FillTicket {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Record cache with a size bound and time-based expiry.
#[derive(Debug)]
pub struct TtlCache {
    entries: HashMap<String, CacheEntry>,
    capacity: usize,
    ttl: Duration,
    next_seq: u64,
    // Write generations per id, kept only while fills are outstanding.
    generation: u64,
    written: HashMap<String, u64>,
    pending_fills: Arc<AtomicUsize>,
}

impl TtlCache {
    /// Create a cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            ttl,
            next_seq: 0,
            generation: 0,
            written: HashMap::new(),
            pending_fills: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Cached value for `id`, regardless of its age.
    pub fn get(&self, id: &str) -> Option<&Value> {
        self.entries.get(id).map(|entry| &entry.value)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Insert or overwrite `id`, stamped with the current time.
    ///
    /// Returns the identifier evicted to stay within capacity, if any.
    pub fn put(&mut self, id: impl Into<String>, value: Value) -> Option<String> {
        self.put_at(id, value, Instant::now())
    }

    /// Insert or overwrite `id` with an explicit cache timestamp.
    pub fn put_at(&mut self, id: impl Into<String>, value: Value, now: Instant) -> Option<String> {
        let id = id.into();
        self.note_write(&id);
        self.insert(id, value, now)
    }

    /// Start a read-through fill. Take the ticket before reading the store.
    pub fn begin_fill(&self) -> FillTicket {
        self.pending_fills.fetch_add(1, Ordering::AcqRel);
        FillTicket {
            generation: self.generation,
            pending: self.pending_fills.clone(),
        }
    }

    /// Cache a value read from the store, unless `id` was written or removed
    /// after `ticket` was taken. Returns whether the value was cached.
    pub fn fill(&mut self, id: &str, value: Value, ticket: FillTicket) -> bool {
        let stale = self
            .written
            .get(id)
            .is_some_and(|written| *written > ticket.generation);
        drop(ticket);
        if stale {
            return false;
        }
        self.insert(id.to_string(), value, Instant::now());
        true
    }

    fn note_write(&mut self, id: &str) {
        self.generation += 1;
        if self.pending_fills.load(Ordering::Acquire) == 0 {
            self.written.clear();
        } else {
            self.written.insert(id.to_string(), self.generation);
        }
    }

    fn insert(&mut self, id: String, value: Value, now: Instant) -> Option<String> {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            id,
            CacheEntry {
                value,
                cached_at: now,
                seq,
            },
        );

        if self.entries.len() <= self.capacity {
            return None;
        }

        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| (entry.cached_at, entry.seq))
            .map(|(id, _)| id.clone())?;
        self.entries.remove(&oldest);
        Some(oldest)
    }

    /// Drop `id` if cached.
    pub fn remove(&mut self, id: &str) -> Option<Value> {
        self.note_write(id);
        self.entries.remove(id).map(|entry| entry.value)
    }

    /// Drop every entry older than the TTL at `now`. Returns how many were dropped.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.cached_at) <= ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Run `sweep` every TTL until `shutdown` flips or its sender goes away.
pub(crate) fn spawn_sweeper(
    cache: Arc<Mutex<TtlCache>>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ttl = cache.lock().await.ttl();
        let mut ticker = interval_at(Instant::now() + ttl, ttl);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = cache.lock().await.sweep(Instant::now());
                    if removed > 0 {
                        debug!(removed, "swept expired cache entries");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}
