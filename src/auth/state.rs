//! Auth state facade.
//!
//! [`AuthStateStore`] is what the protocol client holds: the live credential
//! bundle, a [`KeyStore`] for key records, and `save_creds` to flush the
//! bundle. Reads go through the TTL cache; writes go through the single-flight
//! queue. Both background tasks (queue processor and cache sweeper) are owned
//! by the store and stopped by [`AuthStateStore::shutdown`].

use crate::auth::cache::{spawn_sweeper, TtlCache};
use crate::auth::creds::AuthenticationCreds;
use crate::auth::document::from_document;
use crate::auth::events::{AuthEvent, EventBus};
use crate::auth::keys::{record_id, KeyCategory, KeyRecord, KeyRecordSet};
use crate::auth::options::AuthStateOptions;
use crate::auth::queue::{WriteOp, WriteProcessor, WriteQueue, WriteTicket};
use crate::auth::retry::RetryPolicy;
use crate::auth::AuthResult;
use crate::serialization::Value;
use crate::store::DocumentCollection;
use async_trait::async_trait;
use futures::future::{join_all, try_join_all};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Identifier of the credential bundle record.
pub const CREDS_ID: &str = "creds";

/// Cache-first record lookups.
struct RecordReader {
    collection: Arc<dyn DocumentCollection>,
    cache: Arc<Mutex<TtlCache>>,
    events: EventBus,
}

impl RecordReader {
    async fn try_read(&self, id: &str) -> AuthResult<Option<Value>> {
        if let Some(value) = self.cache.lock().await.get(id).cloned() {
            self.events.emit(AuthEvent::CacheHit { id: id.to_string() });
            return Ok(Some(value));
        }
        self.events.emit(AuthEvent::CacheMiss { id: id.to_string() });

        let ticket = self.cache.lock().await.begin_fill();
        let started = Instant::now();
        let document = self.collection.find_one(id).await?;
        debug!(
            id,
            found = document.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "read from store"
        );

        Ok(match document {
            Some(document) => {
                let value = from_document(document);
                if !self.cache.lock().await.fill(id, value.clone(), ticket) {
                    debug!(id, "write landed during read, not caching");
                }
                Some(value)
            }
            None => None,
        })
    }
}

struct Lifecycle {
    shutdown: watch::Sender<bool>,
    processor: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

struct AuthInner {
    reader: RecordReader,
    queue: WriteQueue,
    events: EventBus,
    creds: Arc<RwLock<AuthenticationCreds>>,
    options: AuthStateOptions,
    created: bool,
    lifecycle: Mutex<Option<Lifecycle>>,
}

impl Drop for AuthInner {
    fn drop(&mut self) {
        if let Some(lifecycle) = self.lifecycle.get_mut().take() {
            lifecycle.processor.abort();
            lifecycle.sweeper.abort();
        }
    }
}

/// Persistent auth state for one identity.
///
/// Cheap to clone; clones share the cache, queue and credential bundle.
#[derive(Clone)]
pub struct AuthStateStore {
    inner: Arc<AuthInner>,
}

/// The pair handed to a protocol client.
#[derive(Clone)]
pub struct AuthenticationState {
    pub creds: Arc<RwLock<AuthenticationCreds>>,
    pub keys: KeyStore,
}

impl AuthStateStore {
    /// Load (or create) the credential bundle and start the background tasks.
    ///
    /// A missing bundle is generated in memory; call [`save_creds`] to
    /// persist it. An unreachable store or a malformed stored bundle fails
    /// initialization rather than replacing the stored identity.
    ///
    /// [`save_creds`]: AuthStateStore::save_creds
    pub async fn initialize(
        collection: impl DocumentCollection + 'static,
        options: AuthStateOptions,
    ) -> AuthResult<Self> {
        Self::initialize_shared(Arc::new(collection), options).await
    }

    /// Like [`initialize`](AuthStateStore::initialize), for an already shared collection.
    pub async fn initialize_shared(
        collection: Arc<dyn DocumentCollection>,
        options: AuthStateOptions,
    ) -> AuthResult<Self> {
        let options = options.normalized();
        let cache = Arc::new(Mutex::new(TtlCache::new(
            options.cache_size,
            options.cache_ttl,
        )));
        let events = EventBus::new(options.event_capacity);
        let reader = RecordReader {
            collection: collection.clone(),
            cache: cache.clone(),
            events: events.clone(),
        };

        let (creds, created) = match reader.try_read(CREDS_ID).await? {
            Some(value) => (AuthenticationCreds::from_value(&value)?, false),
            None => {
                let creds = AuthenticationCreds::generate();
                info!(
                    registration_id = creds.registration_id,
                    "No stored credentials, generated a new identity"
                );
                (creds, true)
            }
        };

        let queue = WriteQueue::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let processor = WriteProcessor {
            queue: queue.clone(),
            collection,
            cache: cache.clone(),
            events: events.clone(),
            retry: RetryPolicy::new(options.retry_attempts, options.retry_delay),
            tick: options.queue_tick,
        }
        .spawn(shutdown_rx.clone());
        let sweeper = spawn_sweeper(cache, shutdown_rx);

        debug!(
            cache_size = options.cache_size,
            cache_ttl_ms = options.cache_ttl.as_millis() as u64,
            retry_attempts = options.retry_attempts,
            "auth state initialized"
        );

        Ok(Self {
            inner: Arc::new(AuthInner {
                reader,
                queue,
                events,
                creds: Arc::new(RwLock::new(creds)),
                options,
                created,
                lifecycle: Mutex::new(Some(Lifecycle {
                    shutdown: shutdown_tx,
                    processor,
                    sweeper,
                })),
            }),
        })
    }

    /// Read a record, distinguishing "absent" from "store unreachable".
    pub async fn try_read(&self, id: &str) -> AuthResult<Option<Value>> {
        self.inner.reader.try_read(id).await
    }

    /// Read a record. Store errors are logged and reported as absent.
    pub async fn read(&self, id: &str) -> Option<Value> {
        match self.try_read(id).await {
            Ok(value) => value,
            Err(err) => {
                error!(id, error = %err, "Read failed, treating record as absent");
                None
            }
        }
    }

    /// Delete a record from the store and the cache.
    pub async fn try_remove(&self, id: &str) -> AuthResult<()> {
        self.inner.reader.collection.delete_one(id).await?;
        self.inner.reader.cache.lock().await.remove(id);
        self.inner.events.emit(AuthEvent::Remove { id: id.to_string() });
        debug!(id, "removed record");
        Ok(())
    }

    /// Best-effort delete: failures are logged, never returned.
    pub async fn remove(&self, id: &str) {
        if let Err(err) = self.try_remove(id).await {
            error!(id, error = %err, "Remove failed");
        }
    }

    /// Queue a write job. Await the ticket for its outcome.
    pub async fn enqueue(&self, id: impl Into<String>, op: WriteOp) -> WriteTicket {
        self.inner.queue.enqueue(id, op).await
    }

    /// Queue `value` under `id` and wait until it is stored or rejected.
    pub async fn write(&self, id: impl Into<String>, value: Value) -> AuthResult<()> {
        self.enqueue(id, WriteOp::Upsert(value)).await.await
    }

    /// Flush the current credential bundle.
    pub async fn save_creds(&self) -> AuthResult<()> {
        let value = self.inner.creds.read().await.to_value();
        self.write(CREDS_ID, value).await
    }

    /// The live credential bundle.
    pub fn creds(&self) -> Arc<RwLock<AuthenticationCreds>> {
        self.inner.creds.clone()
    }

    /// Key record access.
    pub fn keys(&self) -> KeyStore {
        KeyStore {
            store: self.clone(),
        }
    }

    pub fn state(&self) -> AuthenticationState {
        AuthenticationState {
            creds: self.creds(),
            keys: self.keys(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    /// Whether `initialize` generated the credential bundle.
    pub fn was_created(&self) -> bool {
        self.inner.created
    }

    pub fn options(&self) -> &AuthStateOptions {
        &self.inner.options
    }

    /// Write jobs waiting in the queue.
    pub async fn pending_writes(&self) -> usize {
        self.inner.queue.len().await
    }

    /// Stop accepting writes, finish the queued ones, and stop the background
    /// tasks. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let Some(lifecycle) = self.inner.lifecycle.lock().await.take() else {
            return;
        };

        self.inner.queue.close().await;
        let _ = lifecycle.shutdown.send(true);

        if let Err(err) = lifecycle.processor.await {
            warn!(error = %err, "Write processor ended abnormally");
        }
        if let Err(err) = lifecycle.sweeper.await {
            warn!(error = %err, "Cache sweeper ended abnormally");
        }
        info!("Auth state shut down");
    }
}

/// Key record store as seen by a signal-protocol client.
#[async_trait]
pub trait SignalKeyStore: Send + Sync {
    /// Fetch records of one category. Every requested id is present in the
    /// result; missing records map to `None`.
    async fn get(&self, category: &KeyCategory, ids: &[String]) -> HashMap<String, Option<KeyRecord>>;

    /// Write (or, for `None`, delete) records. Returns once every job has
    /// completed, or with the first failure.
    async fn set(&self, records: KeyRecordSet) -> AuthResult<()>;
}

/// [`SignalKeyStore`] backed by an [`AuthStateStore`].
#[derive(Clone)]
pub struct KeyStore {
    store: AuthStateStore,
}

#[async_trait]
impl SignalKeyStore for KeyStore {
    async fn get(&self, category: &KeyCategory, ids: &[String]) -> HashMap<String, Option<KeyRecord>> {
        let lookups = ids.iter().map(|id| async move {
            let record = self
                .store
                .read(&record_id(category, id))
                .await
                .map(|value| match KeyRecord::from_stored(category, value.clone()) {
                    Ok(record) => record,
                    Err(err) => {
                        warn!(category = %category, id = %id, error = %err, "Keeping unparsed key record");
                        KeyRecord::Generic(value)
                    }
                });
            (id.clone(), record)
        });

        join_all(lookups).await.into_iter().collect()
    }

    async fn set(&self, records: KeyRecordSet) -> AuthResult<()> {
        let mut tickets = Vec::new();
        for (category, entries) in records {
            for (id, value) in entries {
                let op = match value {
                    Some(value) => WriteOp::Upsert(value),
                    None => WriteOp::Delete,
                };
                tickets.push(self.store.enqueue(record_id(&category, &id), op).await);
            }
        }

        try_join_all(tickets).await?;
        Ok(())
    }
}
