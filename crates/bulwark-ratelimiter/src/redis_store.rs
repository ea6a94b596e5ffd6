//! Redis-backed counters.
//!
//! Counters are plain Redis integers manipulated with `INCR` and `EXPIRE`,
//! so every instance sharing the Redis database enforces the same limits.
//! [`CounterStore::expire_if_unset`] uses `EXPIRE ... NX`, which needs
//! Redis 7.0 or later.
//! The connection is a [`ConnectionManager`], which reconnects on its own
//! after a dropped connection.
//!
//! ```rust,no_run
//! use bulwark_ratelimiter::{RateLimiter, RedisCounterStore};
//!
//! # async fn example() -> Result<(), redis::RedisError> {
//! let store = RedisCounterStore::connect("redis://127.0.0.1/").await?;
//! let limiter = RateLimiter::builder(store).build();
//! # Ok(())
//! # }
//! ```

use crate::store::{CounterStore, StoreError};
use futures::future::BoxFuture;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use std::fmt;
use std::time::Duration;

/// Counter store backed by Redis.
#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
    key_prefix: String,
}

impl fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl RedisCounterStore {
    /// Connects to `url` with no key prefix.
    ///
    /// # Errors
    /// Returns the Redis error when the URL is invalid or the first
    /// connection fails.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self::new(connection))
    }

    /// Uses an existing connection.
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            connection,
            key_prefix: String::new(),
        }
    }

    /// Prepends `prefix` to every key, e.g. `"myapp:"`.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

impl CounterStore for RedisCounterStore {
    fn incr<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<u64, StoreError>> {
        Box::pin(async move {
            let mut conn = self.connection.clone();
            let count: u64 = conn.incr(self.key(key), 1u64).await.map_err(store_error)?;
            Ok(count)
        })
    }

    fn expire<'a>(&'a self, key: &'a str, ttl: Duration) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move {
            let mut conn = self.connection.clone();
            let applied: bool = conn
                .expire(self.key(key), whole_seconds(ttl))
                .await
                .map_err(store_error)?;
            Ok(applied)
        })
    }

    fn expire_if_unset<'a>(
        &'a self,
        key: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move {
            let mut conn = self.connection.clone();
            let applied: bool = redis::cmd("EXPIRE")
                .arg(self.key(key))
                .arg(whole_seconds(ttl))
                .arg("NX")
                .query_async(&mut conn)
                .await
                .map_err(store_error)?;
            Ok(applied)
        })
    }
}

// EXPIRE takes whole seconds; never round a sub-second window to 0.
fn whole_seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX)
}

fn store_error(err: RedisError) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout
    } else if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
        StoreError::Unavailable(err.to_string())
    } else {
        StoreError::Command(err.to_string())
    }
}
