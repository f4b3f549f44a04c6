//! Tuning knobs for the auth state store.
//!
//! Log output is not configured here: the store logs through `tracing`, and
//! whoever installs the subscriber decides where warnings, errors and debug
//! timings go.

use std::time::Duration;

pub const DEFAULT_CACHE_SIZE: usize = 100;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(300_000);
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1_000);
pub const DEFAULT_QUEUE_TICK: Duration = Duration::from_millis(100);
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Options for [`AuthStateStore`](super::AuthStateStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthStateOptions {
    /// Maximum number of cached records.
    pub cache_size: usize,
    /// Cache entry lifetime; also the sweep interval.
    pub cache_ttl: Duration,
    /// Total attempts per write job, the first one included.
    pub retry_attempts: u32,
    /// Constant pause between attempts.
    pub retry_delay: Duration,
    /// How often the write queue looks for the next job.
    pub queue_tick: Duration,
    /// Buffered events per subscriber before the slowest one starts lagging.
    pub event_capacity: usize,
}

impl Default for AuthStateOptions {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_SIZE,
            cache_ttl: DEFAULT_CACHE_TTL,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            queue_tick: DEFAULT_QUEUE_TICK,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl AuthStateOptions {
    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    pub fn with_retry_attempts(mut self, retry_attempts: u32) -> Self {
        self.retry_attempts = retry_attempts;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_queue_tick(mut self, queue_tick: Duration) -> Self {
        self.queue_tick = queue_tick;
        self
    }

    /// Replace zero values with their defaults.
    ///
    /// Zero sizes, attempts and intervals are treated as "unset", so a
    /// config that omits or zeroes a knob still yields a working store.
    /// A zero `retry_delay` is kept: retrying immediately is legitimate.
    pub fn normalized(self) -> Self {
        fn or_default<T: PartialEq + Default>(value: T, default: T) -> T {
            if value == T::default() {
                default
            } else {
                value
            }
        }

        Self {
            cache_size: or_default(self.cache_size, DEFAULT_CACHE_SIZE),
            cache_ttl: or_default(self.cache_ttl, DEFAULT_CACHE_TTL),
            retry_attempts: or_default(self.retry_attempts, DEFAULT_RETRY_ATTEMPTS),
            retry_delay: self.retry_delay,
            queue_tick: or_default(self.queue_tick, DEFAULT_QUEUE_TICK),
            event_capacity: or_default(self.event_capacity, DEFAULT_EVENT_CAPACITY),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = AuthStateOptions::default();
        assert_eq!(options.cache_size, 100);
        assert_eq!(options.cache_ttl, Duration::from_secs(300));
        assert_eq!(options.retry_attempts, 3);
        assert_eq!(options.retry_delay, Duration::from_secs(1));
        assert_eq!(options.queue_tick, Duration::from_millis(100));
    }

    #[test]
    fn test_normalized_replaces_zeroes() {
        let options = AuthStateOptions::default()
            .with_cache_size(0)
            .with_cache_ttl(Duration::ZERO)
            .with_retry_attempts(0)
            .with_retry_delay(Duration::ZERO)
            .with_queue_tick(Duration::ZERO)
            .normalized();

        assert_eq!(options.cache_size, DEFAULT_CACHE_SIZE);
        assert_eq!(options.cache_ttl, DEFAULT_CACHE_TTL);
        assert_eq!(options.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
        assert_eq!(options.retry_delay, Duration::ZERO);
        assert_eq!(options.queue_tick, DEFAULT_QUEUE_TICK);
    }

    #[test]
    fn test_normalized_keeps_explicit_values() {
        let options = AuthStateOptions::default()
            .with_cache_size(5)
            .with_retry_attempts(7)
            .normalized();
        assert_eq!(options.cache_size, 5);
        assert_eq!(options.retry_attempts, 7);
    }
}
