//! Counter stores.
//!
//! A [`CounterStore`] is the minimal key-value surface the limiter needs:
//! an atomic `INCR` and an `EXPIRE` that leaves an existing expiry alone.
//! Counters live outside the process so every instance of a service
//! enforces the same limit.

use bulwark_retry::FailureDetails;
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Failure talking to a counter store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    /// The store did not answer in time.
    #[error("counter store timed out")]
    Timeout,

    /// The store rejected the command.
    #[error("counter store command failed: {0}")]
    Command(String),
}

impl FailureDetails for StoreError {
    fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout)
    }

    fn is_connection(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Atomic counters with expiry.
pub trait CounterStore: Send + Sync + 'static {
    /// Increments `key`, creating it at `0` first if absent, and returns the new value.
    fn incr<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<u64, StoreError>>;

    /// Sets `key` to expire after `ttl`. Returns `false` when the key does not exist.
    fn expire<'a>(&'a self, key: &'a str, ttl: Duration) -> BoxFuture<'a, Result<bool, StoreError>>;

    /// Sets `key` to expire after `ttl` only if it has no expiry yet.
    ///
    /// Returns `true` when the expiry was set, `false` when the key is
    /// missing or already expires.
    fn expire_if_unset<'a>(
        &'a self,
        key: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<bool, StoreError>>;
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u64,
    expires_at: Option<Instant>,
}

impl Counter {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Process-local store for tests and single-instance deployments.
///
/// Expired counters are dropped lazily on access, or in bulk with
/// [`purge_expired`](Self::purge_expired). Time comes from `tokio::time`, so
/// a paused test runtime controls expiry.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    counters: DashMap<String, Counter>,
}

impl InMemoryCounterStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `key`, or `None` when absent or expired.
    pub fn get(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        self.counters
            .get(key)
            .filter(|counter| counter.is_live(now))
            .map(|counter| counter.count)
    }

    /// Time left before `key` expires. `None` when absent or without expiry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.counters
            .get(key)
            .and_then(|counter| counter.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Removes expired counters.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.counters.retain(|_, counter| counter.is_live(now));
    }

    /// Number of stored counters, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// True when no counters are stored.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

impl CounterStore for InMemoryCounterStore {
    fn incr<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<u64, StoreError>> {
        Box::pin(async move {
            let now = Instant::now();
            let mut counter = self.counters.entry(key.to_string()).or_insert(Counter {
                count: 0,
                expires_at: None,
            });
            if !counter.is_live(now) {
                *counter = Counter {
                    count: 0,
                    expires_at: None,
                };
            }
            counter.count += 1;
            Ok(counter.count)
        })
    }

    fn expire<'a>(&'a self, key: &'a str, ttl: Duration) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move {
            let now = Instant::now();
            match self.counters.get_mut(key) {
                Some(mut counter) if counter.is_live(now) => {
                    counter.expires_at = Some(now + ttl);
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    fn expire_if_unset<'a>(
        &'a self,
        key: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move {
            let now = Instant::now();
            match self.counters.get_mut(key) {
                Some(mut counter) if counter.is_live(now) && counter.expires_at.is_none() => {
                    counter.expires_at = Some(now + ttl);
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }
}
