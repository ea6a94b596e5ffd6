//! Rate limiting through the public API.
//!
//! - limits.rs: counting, rejection and window expiry
//! - fail_open.rs: store outages never block requests
//! - middleware.rs: actor resolution from requests

mod fail_open;
mod middleware;

use bulwark_ratelimiter::{CounterStore, InMemoryCounterStore, StoreError};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Store whose every command fails as if the server were down.
#[derive(Debug, Default)]
pub(crate) struct DownStore {
    pub(crate) incr_calls: AtomicUsize,
}

impl DownStore {
    pub(crate) fn incr_calls(&self) -> usize {
        self.incr_calls.load(Ordering::SeqCst)
    }
}

impl CounterStore for DownStore {
    fn incr<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Result<u64, StoreError>> {
        self.incr_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Err(StoreError::Unavailable("connection refused".into())) })
    }

    fn expire<'a>(
        &'a self,
        _key: &'a str,
        _ttl: Duration,
    ) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async { Err(StoreError::Unavailable("connection refused".into())) })
    }

    fn expire_if_unset<'a>(
        &'a self,
        _key: &'a str,
        _ttl: Duration,
    ) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async { Err(StoreError::Unavailable("connection refused".into())) })
    }
}

/// Store that counts normally but cannot set expiries while `expiry_down`.
#[derive(Debug, Default)]
pub(crate) struct ExpiryOutageStore {
    pub(crate) counters: InMemoryCounterStore,
    pub(crate) incr_calls: AtomicUsize,
    pub(crate) expiry_down: AtomicBool,
}

impl ExpiryOutageStore {
    pub(crate) fn incr_calls(&self) -> usize {
        self.incr_calls.load(Ordering::SeqCst)
    }

    fn expiry_is_down(&self) -> bool {
        self.expiry_down.load(Ordering::SeqCst)
    }
}

impl CounterStore for ExpiryOutageStore {
    fn incr<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<u64, StoreError>> {
        self.incr_calls.fetch_add(1, Ordering::SeqCst);
        self.counters.incr(key)
    }

    fn expire<'a>(
        &'a self,
        key: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<bool, StoreError>> {
        if self.expiry_is_down() {
            return Box::pin(async { Err(StoreError::Timeout) });
        }
        self.counters.expire(key, ttl)
    }

    fn expire_if_unset<'a>(
        &'a self,
        key: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<bool, StoreError>> {
        if self.expiry_is_down() {
            return Box::pin(async { Err(StoreError::Timeout) });
        }
        self.counters.expire_if_unset(key, ttl)
    }
}
