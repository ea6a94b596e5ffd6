use crate::events::CircuitBreakerEvent;
use crate::{CircuitBreaker, CircuitState};
use bulwark_core::{EventListeners, FnListener};
use std::time::Duration;

/// Thresholds and timings for one breaker.
///
/// This is plain data so it can be loaded from configuration files and
/// shared between breakers of the same category. Listeners and the breaker
/// name live on [`CircuitBreakerBuilder`]. Serialized durations are integer
/// milliseconds (`reset_timeout_ms`, `call_timeout_ms`).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in CLOSED that open the breaker.
    pub failure_threshold: u32,
    /// How long an OPEN breaker waits after its last failure before admitting a trial.
    #[cfg_attr(feature = "serde", serde(rename = "reset_timeout_ms", with = "millis"))]
    pub reset_timeout: Duration,
    /// Successful trials in HALF_OPEN needed to close the breaker.
    pub half_open_success_threshold: u32,
    /// Trial calls allowed to run concurrently while HALF_OPEN.
    pub half_open_max_trials: u32,
    /// Per-call timeout. An elapsed call counts as a failure.
    #[cfg_attr(
        feature = "serde",
        serde(rename = "call_timeout_ms", with = "opt_millis")
    )]
    pub call_timeout: Option<Duration>,
}

#[cfg(feature = "serde")]
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(feature = "serde")]
mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => super::millis::serialize(d, s),
            None => s.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

impl Default for CircuitBreakerConfig {
    /// `5` failures, `60s` reset, `3` successes, one trial at a time, `30s` call timeout.
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            half_open_success_threshold: 3,
            half_open_max_trials: 1,
            call_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl CircuitBreakerConfig {
    /// Profile for database queries.
    ///
    /// Tolerates several transient blips before opening and recovers quickly.
    pub fn database() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_success_threshold: 2,
            half_open_max_trials: 1,
            call_timeout: Some(Duration::from_secs(10)),
        }
    }

    /// Profile for third-party APIs (queues, email, pub/sub, image CDN).
    pub fn external_service() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            half_open_success_threshold: 3,
            half_open_max_trials: 1,
            call_timeout: Some(Duration::from_secs(30)),
        }
    }

    /// Profile for low-latency calls such as cache or counter commands.
    ///
    /// Opens quickly so a slow dependency does not compound request latency.
    pub fn fast() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(15),
            half_open_success_threshold: 2,
            half_open_max_trials: 1,
            call_timeout: Some(Duration::from_secs(5)),
        }
    }

    /// Profile for large uploads with long transfer times.
    pub fn upload() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(120),
            half_open_success_threshold: 2,
            half_open_max_trials: 1,
            call_timeout: Some(Duration::from_secs(60)),
        }
    }

    /// Clamps counts that would make the state machine meaningless to `1`.
    pub(crate) fn normalized(mut self) -> Self {
        self.failure_threshold = self.failure_threshold.max(1);
        self.half_open_success_threshold = self.half_open_success_threshold.max(1);
        self.half_open_max_trials = self.half_open_max_trials.max(1);
        self
    }
}

/// Builds a [`CircuitBreaker`].
///
/// ```rust
/// use bulwark_circuitbreaker::{CircuitBreaker, CircuitState};
/// use std::time::Duration;
///
/// let breaker = CircuitBreaker::builder("collections-db")
///     .failure_threshold(3)
///     .reset_timeout(Duration::from_secs(30))
///     .on_state_transition(|from, to| {
///         if to == CircuitState::Open {
///             eprintln!("collections-db opened (was {from})");
///         }
///     })
///     .build();
///
/// assert_eq!(breaker.state(), CircuitState::Closed);
/// ```
pub struct CircuitBreakerBuilder {
    name: String,
    config: CircuitBreakerConfig,
    event_listeners: EventListeners<CircuitBreakerEvent>,
}

impl CircuitBreakerBuilder {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: CircuitBreakerConfig::default(),
            event_listeners: EventListeners::new(),
        }
    }

    /// Replaces all thresholds with `config`.
    pub fn config(mut self, config: CircuitBreakerConfig) -> Self {
        self.config = config;
        self
    }

    /// Consecutive failures that open the breaker. Default: 5.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Wait after the last failure before a trial is admitted. Default: 60s.
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.config.reset_timeout = timeout;
        self
    }

    /// Successful trials needed to close again. Default: 3.
    pub fn half_open_success_threshold(mut self, threshold: u32) -> Self {
        self.config.half_open_success_threshold = threshold;
        self
    }

    /// Concurrent trials allowed while HALF_OPEN. Default: 1.
    pub fn half_open_max_trials(mut self, trials: u32) -> Self {
        self.config.half_open_max_trials = trials;
        self
    }

    /// Per-call timeout. Default: 30s.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = Some(timeout);
        self
    }

    /// Lets calls run as long as they need.
    pub fn no_call_timeout(mut self) -> Self {
        self.config.call_timeout = None;
        self
    }

    /// Called on every state change with `(from, to)`.
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::StateTransition {
                    from_state,
                    to_state,
                    ..
                } = event
                {
                    f(*from_state, *to_state);
                }
            }));
        self
    }

    /// Called when a call is rejected, with the time until a trial is admitted.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<Duration>) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::CallRejected { retry_in, .. } = event {
                    f(*retry_in);
                }
            }));
        self
    }

    /// Called after each successful call with its duration.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::SuccessRecorded { elapsed, .. } = event {
                    f(*elapsed);
                }
            }));
        self
    }

    /// Called after each failed call with its duration.
    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::FailureRecorded { elapsed, .. } = event {
                    f(*elapsed);
                }
            }));
        self
    }

    /// Called whenever [`CircuitBreaker::reset`] runs.
    pub fn on_reset<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::Reset { .. } = event {
                    f();
                }
            }));
        self
    }

    /// Adds every listener in `listeners`.
    pub fn listeners(mut self, listeners: &EventListeners<CircuitBreakerEvent>) -> Self {
        self.event_listeners.extend(listeners);
        self
    }

    /// Creates the breaker.
    pub fn build(self) -> CircuitBreaker {
        CircuitBreaker::from_parts(self.name, self.config.normalized(), self.event_listeners)
    }
}
