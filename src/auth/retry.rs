//! Bounded retry with a constant delay.
//!
//! Write jobs are retried in place: the same operation is attempted again
//! after a fixed pause, up to a total attempt budget. Every error is retried;
//! the store is the only judge of whether a payload is acceptable.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// How many times to attempt an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Zero is treated as one.
    pub attempts: u32,
    /// Pause between consecutive attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

/// Run `operation` until it succeeds or the policy's attempt budget is spent.
///
/// `label` names the record being written in retry logs.
///
/// # Returns
///
/// The first successful result, or the error from the final attempt.
pub async fn retry_with_delay<F, Fut, T, E>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if attempt >= attempts {
                    return Err(err);
                }

                warn!(
                    id = label,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    error = %err,
                    "Retrying write in {}ms",
                    policy.delay.as_millis()
                );

                sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_immediately() {
        let result = retry_with_delay(&policy(3), "creds", || async {
            Ok::<_, StoreError>(42)
        })
        .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_failures() {
        let attempt = Arc::new(AtomicU32::new(0));
        let attempt_clone = attempt.clone();

        let result = retry_with_delay(&policy(3), "creds", move || {
            let attempt = attempt_clone.clone();
            async move {
                let count = attempt.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Err(StoreError::Network("transient".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempt.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts_attempt_budget() {
        let attempt = Arc::new(AtomicU32::new(0));
        let attempt_clone = attempt.clone();
        let started = Instant::now();

        let result = retry_with_delay(&policy(3), "session-1", move || {
            let attempt = attempt_clone.clone();
            async move {
                let n = attempt.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(StoreError::Timeout(u64::from(n)))
            }
        })
        .await;

        // Error from the last attempt is surfaced.
        assert!(matches!(result, Err(StoreError::Timeout(2))));
        assert_eq!(attempt.load(Ordering::SeqCst), 3);
        // Two constant pauses between three attempts.
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_tries_once() {
        let attempt = Arc::new(AtomicU32::new(0));
        let attempt_clone = attempt.clone();

        let result = retry_with_delay(&policy(0), "creds", move || {
            let attempt = attempt_clone.clone();
            async move {
                attempt.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(StoreError::Backend("down".to_string()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempt.load(Ordering::SeqCst), 1);
    }
}
