//! Serialized write path.
//!
//! Writes are queued in FIFO order and executed one at a time by a background
//! processor that checks the queue on a fixed tick. At most one write is in
//! flight at any moment; each job is retried under the configured policy and
//! its caller is resolved with the outcome once the job leaves the queue.

use crate::auth::cache::TtlCache;
use crate::auth::document::{now_millis, to_document};
use crate::auth::events::{AuthEvent, EventBus};
use crate::auth::retry::{retry_with_delay, RetryPolicy};
use crate::auth::{AuthError, AuthResult};
use crate::serialization::Value;
use crate::store::{DocumentCollection, StoreResult};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error};

/// What a write job does to its record.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Upsert(Value),
    Delete,
}

#[derive(Debug)]
struct WriteJob {
    id: String,
    op: WriteOp,
    done: oneshot::Sender<AuthResult<()>>,
}

/// Completion handle for an enqueued write.
#[derive(Debug)]
pub struct WriteTicket {
    id: String,
    rx: oneshot::Receiver<AuthResult<()>>,
}

impl WriteTicket {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Future for WriteTicket {
    type Output = AuthResult<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(AuthError::QueueClosed)))
    }
}

#[derive(Debug, Default)]
struct QueueShared {
    jobs: Mutex<VecDeque<WriteJob>>,
    writing: AtomicBool,
    closed: AtomicBool,
}

/// FIFO of pending write jobs.
#[derive(Debug, Clone, Default)]
pub struct WriteQueue {
    shared: Arc<QueueShared>,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job. The ticket resolves when the job has been executed.
    ///
    /// Once the queue is closed, the ticket resolves immediately with
    /// [`AuthError::QueueClosed`].
    pub async fn enqueue(&self, id: impl Into<String>, op: WriteOp) -> WriteTicket {
        let id = id.into();
        let (done, rx) = oneshot::channel();
        let mut jobs = self.shared.jobs.lock().await;

        if self.shared.closed.load(Ordering::SeqCst) {
            let _ = done.send(Err(AuthError::QueueClosed));
        } else {
            debug!(id = %id, pending = jobs.len() + 1, "queued write");
            jobs.push_back(WriteJob {
                id: id.clone(),
                op,
                done,
            });
        }

        WriteTicket { id, rx }
    }

    /// Refuse further jobs. Jobs already queued are still executed.
    pub async fn close(&self) {
        let _jobs = self.shared.jobs.lock().await;
        self.shared.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Number of jobs waiting, the in-flight one excluded.
    pub async fn len(&self) -> usize {
        self.shared.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether a job is currently executing.
    pub fn is_writing(&self) -> bool {
        self.shared.writing.load(Ordering::SeqCst)
    }

    async fn pop(&self) -> Option<WriteJob> {
        self.shared.jobs.lock().await.pop_front()
    }
}

/// Clears the writing flag when the in-flight job finishes, however it exits.
struct WritingGuard<'a>(&'a AtomicBool);

impl<'a> WritingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for WritingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Background executor for a [`WriteQueue`].
pub(crate) struct WriteProcessor {
    pub(crate) queue: WriteQueue,
    pub(crate) collection: Arc<dyn DocumentCollection>,
    pub(crate) cache: Arc<Mutex<TtlCache>>,
    pub(crate) events: EventBus,
    pub(crate) retry: RetryPolicy,
    pub(crate) tick: Duration,
}

impl WriteProcessor {
    /// Start the tick loop. On shutdown the loop drains every queued job
    /// before exiting.
    pub(crate) fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.process_next().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            let mut drained = 0usize;
            while self.process_next().await {
                drained += 1;
            }
            debug!(drained, "write processor stopped");
        })
    }

    /// Execute the job at the head of the queue, if any and if no other job
    /// is in flight. Returns whether a job was executed.
    pub(crate) async fn process_next(&self) -> bool {
        let Some(_guard) = WritingGuard::acquire(&self.queue.shared.writing) else {
            return false;
        };
        let Some(job) = self.queue.pop().await else {
            return false;
        };

        let result = self.execute(&job.id, &job.op).await;
        // Caller may have stopped waiting.
        let _ = job.done.send(result);
        true
    }

    async fn execute(&self, id: &str, op: &WriteOp) -> AuthResult<()> {
        let started = Instant::now();

        match retry_with_delay(&self.retry, id, || self.attempt(id, op)).await {
            Ok(()) => {
                let duration = started.elapsed();
                match op {
                    WriteOp::Upsert(value) => {
                        let evicted = self.cache.lock().await.put(id, value.clone());
                        if let Some(evicted) = evicted {
                            debug!(id = %evicted, "evicted cache entry");
                        }
                        debug!(id, elapsed_ms = duration.as_millis() as u64, "write completed");
                        self.events.emit(AuthEvent::Write {
                            id: id.to_string(),
                            duration,
                        });
                    }
                    WriteOp::Delete => {
                        self.cache.lock().await.remove(id);
                        debug!(id, elapsed_ms = duration.as_millis() as u64, "delete completed");
                        self.events.emit(AuthEvent::Remove { id: id.to_string() });
                    }
                }
                Ok(())
            }
            Err(err) => {
                error!(
                    id,
                    attempts = self.retry.attempts.max(1),
                    error = %err,
                    "Write failed after all retries"
                );
                Err(AuthError::Store(err))
            }
        }
    }

    async fn attempt(&self, id: &str, op: &WriteOp) -> StoreResult<()> {
        match op {
            WriteOp::Upsert(value) => {
                self.collection
                    .update_one(id, to_document(value, now_millis()), true)
                    .await?;
            }
            WriteOp::Delete => {
                self.collection.delete_one(id).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCollection;

    fn processor(collection: &MemoryCollection, queue: &WriteQueue, attempts: u32) -> WriteProcessor {
        WriteProcessor {
            queue: queue.clone(),
            collection: Arc::new(collection.clone()),
            cache: Arc::new(Mutex::new(TtlCache::new(10, Duration::from_secs(60)))),
            events: EventBus::new(16),
            retry: RetryPolicy::new(attempts, Duration::from_millis(10)),
            tick: Duration::from_millis(100),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_jobs_run_in_fifo_order() {
        let collection = MemoryCollection::new();
        let queue = WriteQueue::new();
        let processor = processor(&collection, &queue, 1);

        let first = queue.enqueue("a", WriteOp::Upsert(Value::from("1"))).await;
        let second = queue.enqueue("b", WriteOp::Upsert(Value::from("2"))).await;
        assert_eq!(queue.len().await, 2);

        assert!(processor.process_next().await);
        assert!(processor.process_next().await);
        assert!(!processor.process_next().await);

        first.await.unwrap();
        second.await.unwrap();
        let log: Vec<String> = collection.write_log().await.into_iter().map(|w| w.id).collect();
        assert_eq!(log, vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_rejects_ticket() {
        let collection = MemoryCollection::new();
        collection.fail_next_writes(5).await;
        let queue = WriteQueue::new();
        let processor = processor(&collection, &queue, 2);

        let ticket = queue.enqueue("creds", WriteOp::Upsert(Value::from("x"))).await;
        processor.process_next().await;

        assert!(matches!(ticket.await, Err(AuthError::Store(_))));
        assert_eq!(collection.write_attempts(), 2);
        assert!(!queue.is_writing());
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_new_jobs() {
        let queue = WriteQueue::new();
        queue.close().await;
        let ticket = queue.enqueue("a", WriteOp::Delete).await;
        assert!(matches!(ticket.await, Err(AuthError::QueueClosed)));
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_dropped_job_resolves_queue_closed() {
        let queue = WriteQueue::new();
        let ticket = queue.enqueue("a", WriteOp::Delete).await;
        drop(queue.pop().await);
        assert!(matches!(ticket.await, Err(AuthError::QueueClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_processor_drains_on_shutdown() {
        let collection = MemoryCollection::new();
        let queue = WriteQueue::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = processor(&collection, &queue, 1).spawn(shutdown_rx);

        let mut tickets = Vec::new();
        for i in 0..3 {
            tickets.push(queue.enqueue(format!("k{}", i), WriteOp::Upsert(Value::from(i as u32))).await);
        }
        queue.close().await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        for ticket in tickets {
            ticket.await.unwrap();
        }
        assert_eq!(collection.len().await, 3);
    }
}
