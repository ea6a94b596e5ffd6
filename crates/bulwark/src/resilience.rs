use crate::attempt::{bounded, AttemptError};
use crate::settings::{overlay, ResilienceSettings};
use bulwark_circuitbreaker::{CircuitBreakerError, CircuitBreakerRegistry, RegistryStats};
use bulwark_core::ResilienceError;
use bulwark_retry::{
    with_database_retry, with_service_retry, FailureDetails, ResourceKind, RetryError,
    RetryOptions,
};
use std::future::Future;
use std::sync::Arc;

#[cfg(feature = "ratelimiter")]
use bulwark_ratelimiter::{
    create_rate_limit_middleware, CounterStore, KeyGenerator, RateLimitLayer, RateLimiter,
};

/// Shared resilience context for a process.
///
/// Owns the breaker registry and the loaded settings. Build one at startup
/// and hand clones to whatever needs guarded calls; clones share breakers.
///
/// ```rust
/// use bulwark::{Resilience, ResilienceSettings};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let resilience = Resilience::new(ResilienceSettings::default());
///
/// let rows = resilience
///     .database("list-collections", || async {
///         Ok::<_, std::io::Error>(vec!["vintage", "sports"])
///     })
///     .await
///     .unwrap();
/// assert_eq!(rows.len(), 2);
/// assert_eq!(resilience.stats().breakers_count, 1);
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Resilience {
    registry: Arc<CircuitBreakerRegistry>,
    settings: Arc<ResilienceSettings>,
}

impl Resilience {
    /// Creates a registry configured from `settings`.
    pub fn new(settings: ResilienceSettings) -> Self {
        let registry = CircuitBreakerRegistry::with_config(settings.registry_config());
        Self::with_registry(Arc::new(registry), settings)
    }

    /// Uses an existing registry.
    pub fn with_registry(
        registry: Arc<CircuitBreakerRegistry>,
        settings: ResilienceSettings,
    ) -> Self {
        Self {
            registry,
            settings: Arc::new(settings),
        }
    }

    /// The breaker registry.
    pub fn registry(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }

    /// The loaded settings.
    pub fn settings(&self) -> &ResilienceSettings {
        &self.settings
    }

    /// Aggregate breaker health, for a health endpoint.
    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    /// Runs a database operation through the database breaker `name` and
    /// the database retry preset.
    ///
    /// The breaker counts the whole retry loop as one call. Its call timeout
    /// bounds each attempt; a timed-out attempt is retried, and if the last
    /// one times out the result is [`ResilienceError::Timeout`].
    pub async fn database<F, Fut, T, E>(
        &self,
        name: &str,
        operation: F,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: FailureDetails + 'static,
    {
        self.database_with(name, RetryOptions::new(), operation).await
    }

    /// Like [`database`](Self::database), with per-call retry overrides
    /// (a cancellation token, a different attempt cap).
    pub async fn database_with<F, Fut, T, E>(
        &self,
        name: &str,
        options: RetryOptions,
        operation: F,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: FailureDetails + 'static,
    {
        let options = named(overlay(&self.settings.retry.database, options), name);
        let breaker = self.registry.database_breaker(name);
        let limit = breaker.config().call_timeout;

        breaker
            .call_unbounded(|| async move {
                let mut operation = operation;
                with_database_retry(move || bounded(operation(), limit), options)
                    .await
                    .map(|outcome| outcome.result)
            })
            .await
            .map_err(|err| flatten(err, name))
    }

    /// Runs a third-party call through the external-service breaker `name`
    /// and the service retry preset for `kind`.
    pub async fn external_service<F, Fut, T, E>(
        &self,
        name: &str,
        kind: ResourceKind,
        operation: F,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: FailureDetails + 'static,
    {
        self.external_service_with(name, kind, RetryOptions::new(), operation)
            .await
    }

    /// Like [`external_service`](Self::external_service), with per-call
    /// retry overrides.
    pub async fn external_service_with<F, Fut, T, E>(
        &self,
        name: &str,
        kind: ResourceKind,
        options: RetryOptions,
        operation: F,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: FailureDetails + 'static,
    {
        let options = named(overlay(&self.settings.retry.service, options), name);
        let breaker = self.registry.external_service_breaker(name);
        let limit = breaker.config().call_timeout;

        breaker
            .call_unbounded(|| async move {
                let mut operation = operation;
                with_service_retry(move || bounded(operation(), limit), kind, options)
                    .await
                    .map(|outcome| outcome.result)
            })
            .await
            .map_err(|err| flatten(err, name))
    }

    /// A rate limiter over `store` whose store breaker is registered here.
    #[cfg(feature = "ratelimiter")]
    pub fn rate_limiter<S: CounterStore>(&self, store: S) -> RateLimiter {
        RateLimiter::builder(store).registry(&self.registry).build()
    }

    /// Middleware for `action` using the policy from the settings, or
    /// `None` when the action has no configured limit.
    #[cfg(feature = "ratelimiter")]
    pub fn rate_limit_layer(
        &self,
        limiter: &RateLimiter,
        action: &str,
        key_generator: Option<KeyGenerator>,
    ) -> Option<RateLimitLayer> {
        let policy = self.settings.rate_limit(action)?;
        Some(create_rate_limit_middleware(
            limiter.clone(),
            policy.requests,
            policy.window.as_secs(),
            key_generator,
        ))
    }
}

fn named(mut options: RetryOptions, name: &str) -> RetryOptions {
    if options.operation_name.is_none() {
        options.operation_name = Some(name.to_string());
    }
    options
}

fn flatten<E>(
    err: CircuitBreakerError<RetryError<AttemptError<E>>>,
    breaker: &str,
) -> ResilienceError<E> {
    let retry = match err {
        CircuitBreakerError::Inner(retry) => retry,
        CircuitBreakerError::Open { name, retry_in } => {
            return ResilienceError::CircuitOpen { name, retry_in }
        }
        CircuitBreakerError::Timeout { name, timeout } => {
            return ResilienceError::Timeout {
                name,
                after: timeout,
            }
        }
    };

    match retry {
        RetryError::Exhausted {
            operation,
            attempts,
            elapsed,
            source: AttemptError::Failed(source),
        } => ResilienceError::RetriesExhausted {
            operation,
            attempts,
            elapsed,
            source,
        },
        RetryError::NonRetryable {
            source: AttemptError::Failed(source),
            ..
        } => ResilienceError::Application(source),
        RetryError::Exhausted {
            source: AttemptError::TimedOut(after),
            ..
        }
        | RetryError::NonRetryable {
            source: AttemptError::TimedOut(after),
            ..
        } => ResilienceError::Timeout {
            name: breaker.to_string(),
            after,
        },
        RetryError::Cancelled {
            operation,
            attempts,
            ..
        } => ResilienceError::Cancelled {
            operation,
            attempts,
        },
        RetryError::InvalidConfig { operation, reason } => {
            ResilienceError::Misconfigured(format!("{operation}: {reason}"))
        }
    }
}
