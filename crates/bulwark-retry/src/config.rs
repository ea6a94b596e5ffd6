use crate::backoff::{
    ExponentialBackoff, ExponentialRandomBackoff, FixedInterval, IntervalFunction,
};
use crate::classify::{FailureDetails, ResourceKind};
use crate::events::RetryEvent;
use crate::layer::RetryLayer;
use crate::policy::{RetryPolicy, RetryPredicate};
use bulwark_core::{EventListeners, FnListener};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Everything a retry loop needs: policy, listeners, name and cancellation.
pub struct RetryConfig<E> {
    pub(crate) policy: RetryPolicy<E>,
    pub(crate) event_listeners: EventListeners<RetryEvent>,
    pub(crate) name: String,
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) warn_on_retry: bool,
}

impl<E> RetryConfig<E> {
    /// Starts a builder with the defaults documented on [`RetryConfigBuilder::new`].
    pub fn builder() -> RetryConfigBuilder<E> {
        RetryConfigBuilder::new()
    }

    /// Operation name used in logs, events and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The attempt cap, backoff and predicate.
    pub fn policy(&self) -> &RetryPolicy<E> {
        &self.policy
    }

    /// Wraps this configuration in a Tower layer.
    pub fn layer(self) -> RetryLayer<E> {
        RetryLayer::new(self)
    }
}

impl<E> RetryConfig<E>
where
    E: FailureDetails + 'static,
{
    /// Preset for database queries: 3 attempts, 200ms doubling to at most
    /// 2s, database error classification. `options` overrides any field.
    pub fn database(options: &RetryOptions) -> Self {
        Self::preset(
            ResourceKind::Database,
            PresetDefaults {
                max_attempts: 3,
                backoff: Duration::from_millis(200),
                max_backoff: Duration::from_secs(2),
                name: "database-operation".to_string(),
                warn_on_retry: false,
            },
            options,
        )
    }

    /// Preset for third-party calls: 2 attempts, 1s doubling to at most 10s,
    /// classification for `kind`, and a warning logged on every retry.
    pub fn service(kind: ResourceKind, options: &RetryOptions) -> Self {
        Self::preset(
            kind,
            PresetDefaults {
                max_attempts: 2,
                backoff: Duration::from_secs(1),
                max_backoff: Duration::from_secs(10),
                name: format!("{}-call", kind.as_str()),
                warn_on_retry: true,
            },
            options,
        )
    }

    fn preset(kind: ResourceKind, defaults: PresetDefaults, options: &RetryOptions) -> Self {
        let mut builder = RetryConfigBuilder::new()
            .max_attempts(options.max_attempts.unwrap_or(defaults.max_attempts))
            .exponential_backoff(options.backoff.unwrap_or(defaults.backoff))
            .max_backoff(options.max_backoff.unwrap_or(defaults.max_backoff))
            .jitter(options.jitter.unwrap_or(false))
            .resource_kind(kind)
            .warn_on_retry(defaults.warn_on_retry)
            .name(
                options
                    .operation_name
                    .clone()
                    .unwrap_or(defaults.name),
            );

        if let Some(token) = &options.cancellation {
            builder = builder.cancellation(token.clone());
        }
        builder.build()
    }
}

struct PresetDefaults {
    max_attempts: usize,
    backoff: Duration,
    max_backoff: Duration,
    name: String,
    warn_on_retry: bool,
}

/// Overrides applied on top of a preset.
///
/// Unset fields keep the preset's value. Durations are read as integer
/// milliseconds when deserialized.
///
/// ```rust
/// use bulwark_retry::RetryOptions;
/// use std::time::Duration;
///
/// let options = RetryOptions::new()
///     .max_attempts(5)
///     .backoff(Duration::from_millis(50))
///     .operation_name("get-featured-collections");
/// assert_eq!(options.max_attempts, Some(5));
/// ```
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RetryOptions {
    /// Total attempts, the first one included.
    pub max_attempts: Option<usize>,
    /// Delay before the second attempt; later delays double.
    #[cfg_attr(feature = "serde", serde(rename = "backoff_ms", with = "opt_millis"))]
    pub backoff: Option<Duration>,
    /// Upper bound on a single delay.
    #[cfg_attr(
        feature = "serde",
        serde(rename = "max_backoff_ms", with = "opt_millis")
    )]
    pub max_backoff: Option<Duration>,
    /// Draw each delay uniformly from `[0, delay]`.
    pub jitter: Option<bool>,
    /// Name used in logs, events and errors.
    pub operation_name: Option<String>,
    /// Stops the loop when cancelled.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub cancellation: Option<CancellationToken>,
}

impl RetryOptions {
    /// No overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the attempt cap.
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Overrides the base delay.
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Overrides the delay cap.
    pub fn max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = Some(max_backoff);
        self
    }

    /// Turns jitter on or off.
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Sets the operation name.
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Aborts the loop when `token` is cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

#[cfg(feature = "serde")]
mod opt_millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

/// Builder for [`RetryConfig`].
pub struct RetryConfigBuilder<E> {
    max_attempts: usize,
    interval_fn: Option<Arc<dyn IntervalFunction>>,
    base_backoff: Duration,
    max_backoff: Option<Duration>,
    jitter: bool,
    retry_predicate: Option<RetryPredicate<E>>,
    event_listeners: EventListeners<RetryEvent>,
    name: String,
    cancellation: Option<CancellationToken>,
    warn_on_retry: bool,
}

impl<E> Default for RetryConfigBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> RetryConfigBuilder<E> {
    /// Creates a builder.
    ///
    /// Defaults:
    /// - max_attempts: 3
    /// - backoff: 100ms doubling, capped at 5s, no jitter
    /// - every error retried
    /// - name: `"<unnamed>"`
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            interval_fn: None,
            base_backoff: Duration::from_millis(100),
            max_backoff: Some(Duration::from_secs(5)),
            jitter: false,
            retry_predicate: None,
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
            cancellation: None,
            warn_on_retry: false,
        }
    }

    /// Total attempts, the first one included. `0` is rejected when the loop runs.
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Waits `duration` before every retry.
    pub fn fixed_backoff(mut self, duration: Duration) -> Self {
        self.interval_fn = Some(Arc::new(FixedInterval::new(duration)));
        self
    }

    /// Doubles from `initial` before each retry, honoring
    /// [`max_backoff`](Self::max_backoff) and [`jitter`](Self::jitter).
    pub fn exponential_backoff(mut self, initial: Duration) -> Self {
        self.interval_fn = None;
        self.base_backoff = initial;
        self
    }

    /// Caps exponential delays.
    pub fn max_backoff(mut self, max: Duration) -> Self {
        self.max_backoff = Some(max);
        self
    }

    /// Lets exponential delays grow without bound.
    pub fn unbounded_backoff(mut self) -> Self {
        self.max_backoff = None;
        self
    }

    /// Full jitter on exponential delays.
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Uses a custom interval function, ignoring the exponential settings.
    pub fn backoff<I>(mut self, interval_fn: I) -> Self
    where
        I: IntervalFunction + 'static,
    {
        self.interval_fn = Some(Arc::new(interval_fn));
        self
    }

    /// Only retries errors for which `predicate` returns `true`.
    pub fn retry_on<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retry_predicate = Some(Arc::new(predicate));
        self
    }

    /// Name used in logs, events and errors.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Stops retrying, and aborts the in-flight attempt, when `token` is cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Logs each retry at `WARN` instead of `DEBUG`.
    pub fn warn_on_retry(mut self, warn: bool) -> Self {
        self.warn_on_retry = warn;
        self
    }

    /// Called before each backoff with the failed attempt number and the delay.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Retry { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    /// Called on success with the number of attempts made.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Success { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Called when attempts run out.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Error { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Called when an error is returned without retrying.
    pub fn on_ignored_error<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, RetryEvent::IgnoredError { .. }) {
                f();
            }
        }));
        self
    }

    /// Called when the loop stops because of cancellation.
    pub fn on_cancelled<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Cancelled { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> RetryConfig<E> {
        let interval_fn = self.interval_fn.unwrap_or_else(|| {
            exponential(self.base_backoff, self.max_backoff, self.jitter)
        });

        let mut policy = RetryPolicy::new(self.max_attempts, interval_fn);
        policy.retry_predicate = self.retry_predicate;

        RetryConfig {
            policy,
            event_listeners: self.event_listeners,
            name: self.name,
            cancellation: self.cancellation,
            warn_on_retry: self.warn_on_retry,
        }
    }

    /// Builds the configuration and wraps it in a Tower layer.
    pub fn build_layer(self) -> RetryLayer<E> {
        RetryLayer::new(self.build())
    }
}

impl<E> RetryConfigBuilder<E>
where
    E: FailureDetails + 'static,
{
    /// Retries only what `kind`'s classifier considers transient.
    pub fn resource_kind(self, kind: ResourceKind) -> Self {
        self.retry_on(move |error: &E| kind.is_retryable(error))
    }
}

fn exponential(
    base: Duration,
    max: Option<Duration>,
    jitter: bool,
) -> Arc<dyn IntervalFunction> {
    match (jitter, max) {
        (false, Some(max)) => Arc::new(ExponentialBackoff::new(base).max_interval(max)),
        (false, None) => Arc::new(ExponentialBackoff::new(base)),
        (true, Some(max)) => Arc::new(ExponentialRandomBackoff::new(base).max_interval(max)),
        (true, None) => Arc::new(ExponentialRandomBackoff::new(base)),
    }
}
