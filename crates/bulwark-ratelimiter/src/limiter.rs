use crate::error::RateLimitExceeded;
use crate::events::RateLimiterEvent;
use crate::key::rate_limit_key;
use crate::policy::RateLimitPolicy;
use crate::store::{CounterStore, StoreError};
use bulwark_circuitbreaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerRegistry,
};
use bulwark_core::{EventListeners, FnListener};
use bulwark_retry::{with_retry, ResourceKind, RetryConfig, RetryError, RetryOptions};
#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter};
use std::fmt;
use std::sync::Arc;
#[cfg(feature = "metrics")]
use std::sync::Once;
use std::time::Duration;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Name of the breaker guarding the counter store.
pub const STORE_BREAKER_NAME: &str = "rate-limit-store";

/// Outcome of a check that did not reject the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Counted and within the limit.
    Permitted {
        /// Counter value after this request.
        current_count: u64,
        /// Requests left in the current window.
        remaining: u64,
    },
    /// The store failed; the request went through without a verdict. It may
    /// have been counted if only the expiry step failed.
    FailedOpen,
}

impl RateLimitDecision {
    /// True when the store could not be consulted.
    pub fn is_failed_open(&self) -> bool {
        matches!(self, RateLimitDecision::FailedOpen)
    }
}

type StoreFailure = CircuitBreakerError<RetryError<StoreError>>;

struct Shared {
    name: String,
    store: Arc<dyn CounterStore>,
    breaker: CircuitBreaker,
    retry: RetryConfig<StoreError>,
    event_listeners: EventListeners<RateLimiterEvent>,
}

/// Counter-based limiter over a shared [`CounterStore`].
///
/// Each check increments the counter for its key once, then gives the key
/// the policy window as its expiry unless it already has one. Both steps
/// run inside the `rate-limit-store` circuit breaker with the
/// external-service retry preset, retried separately so a retry never
/// counts the request twice. When either step fails (store down, breaker
/// open) the check logs a warning and lets the request through; a key left
/// without an expiry gets one from the next request that reaches the store.
///
/// Clones share the store, breaker and listeners.
///
/// ```rust
/// use bulwark_ratelimiter::{InMemoryCounterStore, RateLimitPolicy, RateLimiter};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let limiter = RateLimiter::builder(InMemoryCounterStore::new()).build();
/// let policy = RateLimitPolicy::per_seconds(2, 60);
///
/// assert!(limiter.check_action("user_42", "vote", &policy).await.is_ok());
/// assert!(limiter.check_action("user_42", "vote", &policy).await.is_ok());
///
/// let rejected = limiter.check_action("user_42", "vote", &policy).await.unwrap_err();
/// assert_eq!(rejected.current_count, 3);
/// assert_eq!(rejected.limit, 2);
/// # }
/// ```
#[derive(Clone)]
pub struct RateLimiter {
    shared: Arc<Shared>,
}

impl RateLimiter {
    /// Starts building a limiter over `store`.
    pub fn builder<S: CounterStore>(store: S) -> RateLimiterBuilder {
        RateLimiterBuilder::new(Arc::new(store))
    }

    /// Like [`builder`](Self::builder), for a store that is already shared.
    pub fn builder_shared(store: Arc<dyn CounterStore>) -> RateLimiterBuilder {
        RateLimiterBuilder::new(store)
    }

    /// The limiter's name, used in logs, events and metrics.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The breaker guarding the store.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.shared.breaker
    }

    /// Counts a request by `actor` for `action`.
    pub async fn check_action(
        &self,
        actor: &str,
        action: &str,
        policy: &RateLimitPolicy,
    ) -> Result<RateLimitDecision, RateLimitExceeded> {
        self.check(&rate_limit_key(actor, action), policy).await
    }

    /// Counts a request against `key`.
    ///
    /// Rejects when the counter exceeds `policy.requests`. A failing store
    /// yields [`RateLimitDecision::FailedOpen`], never an error.
    pub async fn check(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
    ) -> Result<RateLimitDecision, RateLimitExceeded> {
        match self.count(key, policy.window).await {
            Ok(current_count) if current_count > policy.requests => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    ratelimiter = %self.shared.name,
                    key,
                    current_count,
                    limit = policy.requests,
                    "rate limit exceeded"
                );
                self.record("rejected");
                self.shared.event_listeners.emit(&RateLimiterEvent::Rejected {
                    pattern_name: self.shared.name.clone(),
                    timestamp: std::time::Instant::now(),
                    key: key.to_string(),
                    current_count,
                    limit: policy.requests,
                });

                Err(RateLimitExceeded {
                    key: key.to_string(),
                    current_count,
                    limit: policy.requests,
                    window: policy.window,
                })
            }
            Ok(current_count) => {
                self.record("permitted");
                self.shared.event_listeners.emit(&RateLimiterEvent::Permitted {
                    pattern_name: self.shared.name.clone(),
                    timestamp: std::time::Instant::now(),
                    key: key.to_string(),
                    current_count,
                    limit: policy.requests,
                });

                Ok(RateLimitDecision::Permitted {
                    current_count,
                    remaining: policy.requests - current_count,
                })
            }
            Err(error) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    ratelimiter = %self.shared.name,
                    key,
                    error = %error,
                    "rate limit store unavailable; failing open"
                );
                self.record("failed_open");
                self.shared.event_listeners.emit(&RateLimiterEvent::FailedOpen {
                    pattern_name: self.shared.name.clone(),
                    timestamp: std::time::Instant::now(),
                    key: key.to_string(),
                    error: error.to_string(),
                });

                Ok(RateLimitDecision::FailedOpen)
            }
        }
    }

    async fn count(&self, key: &str, window: Duration) -> Result<u64, StoreFailure> {
        let store: &dyn CounterStore = &*self.shared.store;
        let retry = &self.shared.retry;

        let count = self
            .shared
            .breaker
            .call(|| async move {
                with_retry(move || store.incr(key), retry)
                    .await
                    .map(|outcome| outcome.result)
            })
            .await?;

        // A counter without an expiry gets one on its next hit.
        self.shared
            .breaker
            .call(|| async move {
                with_retry(move || store.expire_if_unset(key, window), retry)
                    .await
                    .map(|outcome| outcome.result)
            })
            .await?;

        Ok(count)
    }

    fn record(&self, _result: &'static str) {
        #[cfg(feature = "metrics")]
        counter!("ratelimiter_calls_total", "ratelimiter" => self.shared.name.clone(), "result" => _result)
            .increment(1);
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.shared.name)
            .field("breaker", &self.shared.breaker)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RateLimiter`].
///
/// Without [`registry`](Self::registry) or [`breaker`](Self::breaker) the
/// limiter gets its own `rate-limit-store` breaker with the database
/// profile.
pub struct RateLimiterBuilder {
    store: Arc<dyn CounterStore>,
    name: String,
    breaker: Option<CircuitBreaker>,
    retry_options: RetryOptions,
    event_listeners: EventListeners<RateLimiterEvent>,
}

impl RateLimiterBuilder {
    fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            name: "rate-limiter".to_string(),
            breaker: None,
            retry_options: RetryOptions::new(),
            event_listeners: EventListeners::new(),
        }
    }

    /// Name used in logs, events and metrics. Default: `rate-limiter`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Takes the store breaker from `registry`, so it shows up in the
    /// registry's health report.
    pub fn registry(mut self, registry: &CircuitBreakerRegistry) -> Self {
        self.breaker = Some(registry.database_breaker(STORE_BREAKER_NAME));
        self
    }

    /// Guards the store with `breaker`.
    pub fn breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Overrides the retry preset used for store calls.
    pub fn retry_options(mut self, options: RetryOptions) -> Self {
        self.retry_options = options;
        self
    }

    /// Called for each permitted request with `(key, current_count)`.
    pub fn on_permitted<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, u64) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &RateLimiterEvent| {
                if let RateLimiterEvent::Permitted {
                    key, current_count, ..
                } = event
                {
                    f(key, *current_count);
                }
            }));
        self
    }

    /// Called for each rejected request with `(key, current_count)`.
    pub fn on_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, u64) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &RateLimiterEvent| {
                if let RateLimiterEvent::Rejected {
                    key, current_count, ..
                } = event
                {
                    f(key, *current_count);
                }
            }));
        self
    }

    /// Called when a request is let through because the store failed,
    /// with `(key, error)`.
    pub fn on_failed_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &RateLimiterEvent| {
                if let RateLimiterEvent::FailedOpen { key, error, .. } = event {
                    f(key, error);
                }
            }));
        self
    }

    /// Creates the limiter.
    pub fn build(self) -> RateLimiter {
        #[cfg(feature = "metrics")]
        METRICS_INIT.call_once(|| {
            describe_counter!(
                "ratelimiter_calls_total",
                "Rate limit checks by result (permitted, rejected, failed_open)"
            );
        });

        let mut retry_options = self.retry_options;
        if retry_options.operation_name.is_none() {
            retry_options.operation_name = Some(format!("{}-increment", self.name));
        }

        let breaker = self.breaker.unwrap_or_else(|| {
            CircuitBreaker::new(STORE_BREAKER_NAME, CircuitBreakerConfig::database())
        });

        RateLimiter {
            shared: Arc::new(Shared {
                name: self.name,
                store: self.store,
                breaker,
                retry: RetryConfig::service(ResourceKind::Cache, &retry_options),
                event_listeners: self.event_listeners,
            }),
        }
    }
}
