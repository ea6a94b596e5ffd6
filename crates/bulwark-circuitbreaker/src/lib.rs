//! Consecutive-failure circuit breakers.
//!
//! A [`CircuitBreaker`] guards one named resource (a database, a queue, an
//! image CDN). It counts consecutive failures and, once they reach the
//! configured threshold, stops invoking the resource at all until a reset
//! timeout has passed since the last failure.
//!
//! ## States
//! - **CLOSED**: calls run; each failure increments the consecutive-failure count,
//!   each success resets it
//! - **OPEN**: calls are rejected with [`CircuitBreakerError::Open`] without being invoked
//! - **HALF_OPEN**: a limited number of trial calls probe for recovery; enough
//!   successes close the breaker, any failure reopens it
//!
//! ## Usage
//!
//! ```rust
//! use bulwark_circuitbreaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let breaker = CircuitBreaker::new(
//!     "db",
//!     CircuitBreakerConfig {
//!         failure_threshold: 2,
//!         ..Default::default()
//!     },
//! );
//!
//! for _ in 0..2 {
//!     let _ = breaker
//!         .execute(|| async { Err::<(), _>("connection refused") })
//!         .await;
//! }
//! assert_eq!(breaker.state(), CircuitState::Open);
//!
//! let err = breaker
//!     .execute(|| async { Ok::<_, &str>("never runs") })
//!     .await
//!     .unwrap_err();
//! assert_eq!(err.to_string(), "Circuit breaker db is OPEN");
//! # }
//! ```
//!
//! Breakers are cheap handles: clones share state. Use a
//! [`CircuitBreakerRegistry`] so every caller asking for "the breaker for
//! resource X" gets the same handle.
//!
//! ## Tower
//!
//! [`CircuitBreakerLayer`] wraps any Tower service with an existing breaker.
//!
//! ## Feature Flags
//! - `tracing`: log state transitions and rejections (default)
//! - `metrics`: `circuitbreaker_calls_total`, `circuitbreaker_transitions_total`,
//!   `circuitbreaker_state`
//! - `serde`: (de)serialize [`CircuitBreakerConfig`] and [`RegistryConfig`], serialize
//!   [`CircuitHealth`] and [`RegistryStats`]

mod circuit;
pub mod classifier;
mod config;
mod error;
mod events;
mod health;
mod layer;
mod registry;

pub use circuit::{CircuitMetrics, CircuitState};
pub use classifier::{DefaultClassifier, FailureClassifier, FnClassifier};
pub use config::{CircuitBreakerBuilder, CircuitBreakerConfig};
pub use error::CircuitBreakerError;
pub use events::CircuitBreakerEvent;
pub use health::CircuitHealth;
pub use layer::{CircuitBreakerLayer, CircuitBreakerService};
pub use registry::{
    BreakerCategory, CircuitBreakerRegistry, HealthSummary, RegistryConfig, RegistryStats,
};

use crate::circuit::{Acquire, Admission, Circuit, Transition};
use crate::classifier::{verdict, Verdict};
use bulwark_core::EventListeners;
#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_gauge, gauge};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
#[cfg(feature = "metrics")]
use std::sync::Once;
use std::time::Duration;
use tokio::time::Instant;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Result of a call that the breaker let through.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution<T> {
    /// Value produced by the operation.
    pub result: T,
    /// The operation was invoked. Always `true` on the success path.
    pub was_executed: bool,
    /// The breaker rejected the call. Always `false` on the success path;
    /// rejections surface as [`CircuitBreakerError::Open`].
    pub was_rejected: bool,
    /// Time spent inside the operation.
    pub elapsed: Duration,
}

struct Shared {
    name: String,
    config: CircuitBreakerConfig,
    circuit: Mutex<Circuit>,
    state: Arc<AtomicU8>,
    event_listeners: EventListeners<CircuitBreakerEvent>,
}

/// A named circuit breaker. Clones share state.
#[derive(Clone)]
pub struct CircuitBreaker {
    shared: Arc<Shared>,
}

impl CircuitBreaker {
    /// Starts building a breaker called `name` with default thresholds.
    pub fn builder(name: impl Into<String>) -> CircuitBreakerBuilder {
        CircuitBreakerBuilder::new(name)
    }

    /// Creates a breaker with `config` and no listeners.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::builder(name).config(config).build()
    }

    pub(crate) fn from_parts(
        name: String,
        config: CircuitBreakerConfig,
        event_listeners: EventListeners<CircuitBreakerEvent>,
    ) -> Self {
        #[cfg(feature = "metrics")]
        METRICS_INIT.call_once(|| {
            describe_counter!(
                "circuitbreaker_calls_total",
                "Calls through a circuit breaker by outcome"
            );
            describe_counter!(
                "circuitbreaker_transitions_total",
                "Circuit breaker state transitions"
            );
            describe_gauge!(
                "circuitbreaker_state",
                "Current state (0 = closed, 1 = open, 2 = half-open)"
            );
        });

        #[cfg(feature = "metrics")]
        gauge!("circuitbreaker_state", "circuitbreaker" => name.clone())
            .set(CircuitState::Closed as u8 as f64);

        let state = Arc::new(AtomicU8::new(CircuitState::Closed as u8));
        Self {
            shared: Arc::new(Shared {
                name,
                config,
                circuit: Mutex::new(Circuit::new(Arc::clone(&state))),
                state,
                event_listeners,
            }),
        }
    }

    /// The breaker's name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The breaker's thresholds.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.shared.config
    }

    /// Current state, read without locking.
    ///
    /// An OPEN breaker whose reset timeout has passed still reports OPEN until
    /// the next call moves it to HALF_OPEN.
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Shorthand for `state() == CircuitState::Open`.
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Snapshot of counters and timings.
    pub fn metrics(&self) -> CircuitMetrics {
        self.shared
            .circuit
            .lock()
            .metrics(&self.shared.config, Instant::now())
    }

    /// Health summary for dashboards.
    pub fn health(&self) -> CircuitHealth {
        CircuitHealth::from_metrics(&self.shared.name, &self.metrics())
    }

    /// Forces the breaker to CLOSED and zeroes its failure and success counts.
    ///
    /// Calls already in flight finish without affecting the new window.
    pub fn reset(&self) {
        let transition = self.shared.circuit.lock().reset(Instant::now());
        if let Some(transition) = transition {
            self.announce(transition);
        }
        self.shared
            .event_listeners
            .emit(&CircuitBreakerEvent::Reset {
                pattern_name: self.shared.name.clone(),
                timestamp: std::time::Instant::now(),
            });
    }

    /// True when both handles refer to the same breaker.
    pub fn ptr_eq(a: &CircuitBreaker, b: &CircuitBreaker) -> bool {
        Arc::ptr_eq(&a.shared, &b.shared)
    }

    /// Runs `operation` if the breaker admits it.
    ///
    /// Every `Err` counts as a failure. Returns [`CircuitBreakerError::Open`]
    /// without invoking `operation` when the breaker is OPEN (or HALF_OPEN with
    /// every trial slot taken), and [`CircuitBreakerError::Timeout`] when the
    /// configured call timeout elapses.
    pub async fn execute<F, Fut, T, E>(
        &self,
        operation: F,
    ) -> Result<Execution<T>, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_classified(operation, &DefaultClassifier).await
    }

    /// Like [`execute`](Self::execute), with a custom [`FailureClassifier`].
    ///
    /// Errors the classifier exempts are returned to the caller but leave the
    /// breaker's counts untouched.
    pub async fn execute_classified<F, Fut, T, E, C>(
        &self,
        operation: F,
        classifier: &C,
    ) -> Result<Execution<T>, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FailureClassifier<T, E> + ?Sized,
    {
        self.run(operation, classifier, self.shared.config.call_timeout)
            .await
    }

    /// Like [`call`](Self::call), without the configured call timeout.
    ///
    /// For operations that bound their own steps, such as a retry loop
    /// timing out each attempt. The breaker still counts the outcome once.
    pub async fn call_unbounded<F, Fut, T, E>(
        &self,
        operation: F,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(operation, &DefaultClassifier, None)
            .await
            .map(|execution| execution.result)
    }

    async fn run<F, Fut, T, E, C>(
        &self,
        operation: F,
        classifier: &C,
        call_timeout: Option<Duration>,
    ) -> Result<Execution<T>, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FailureClassifier<T, E> + ?Sized,
    {
        let admission = self.acquire()?;
        let guard = CallGuard {
            breaker: self,
            admission,
            finished: false,
        };

        let started = Instant::now();
        let outcome = match call_timeout {
            Some(limit) => tokio::time::timeout(limit, operation()).await.ok(),
            None => Some(operation().await),
        };
        let elapsed = started.elapsed();

        match outcome {
            Some(result) => {
                guard.finish(verdict(classifier, &result), elapsed);
                result
                    .map(|result| Execution {
                        result,
                        was_executed: true,
                        was_rejected: false,
                        elapsed,
                    })
                    .map_err(CircuitBreakerError::Inner)
            }
            None => {
                guard.finish(Verdict::Failure, elapsed);
                Err(CircuitBreakerError::Timeout {
                    name: self.shared.name.clone(),
                    timeout: call_timeout.unwrap_or_default(),
                })
            }
        }
    }

    /// Like [`execute`](Self::execute), returning only the value.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute(operation).await.map(|execution| execution.result)
    }

    fn acquire<E>(&self) -> Result<Admission, CircuitBreakerError<E>> {
        let acquired = self
            .shared
            .circuit
            .lock()
            .try_acquire(&self.shared.config, Instant::now());

        match acquired {
            Acquire::Permitted {
                admission,
                transition,
            } => {
                if let Some(transition) = transition {
                    self.announce(transition);
                }
                self.shared
                    .event_listeners
                    .emit(&CircuitBreakerEvent::CallPermitted {
                        pattern_name: self.shared.name.clone(),
                        timestamp: std::time::Instant::now(),
                        state: admission.state,
                    });
                Ok(admission)
            }
            Acquire::Rejected { retry_in } => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    breaker = %self.shared.name,
                    retry_in_ms = retry_in.map(|d| d.as_millis() as u64),
                    "circuit breaker rejected call"
                );

                #[cfg(feature = "metrics")]
                counter!("circuitbreaker_calls_total", "circuitbreaker" => self.shared.name.clone(), "outcome" => "rejected")
                    .increment(1);

                self.shared
                    .event_listeners
                    .emit(&CircuitBreakerEvent::CallRejected {
                        pattern_name: self.shared.name.clone(),
                        timestamp: std::time::Instant::now(),
                        retry_in,
                    });

                Err(CircuitBreakerError::Open {
                    name: self.shared.name.clone(),
                    retry_in,
                })
            }
        }
    }

    fn complete(&self, admission: Admission, verdict: Verdict, elapsed: Duration) {
        let now = Instant::now();
        let transition = {
            let mut circuit = self.shared.circuit.lock();
            match verdict {
                Verdict::Success => circuit.record_success(admission, &self.shared.config, now),
                Verdict::Failure => circuit.record_failure(admission, &self.shared.config, now),
                Verdict::Ignored => {
                    circuit.release(admission);
                    None
                }
            }
        };

        #[cfg(feature = "metrics")]
        {
            let outcome = match verdict {
                Verdict::Success => "success",
                Verdict::Failure => "failure",
                Verdict::Ignored => "ignored",
            };
            counter!("circuitbreaker_calls_total", "circuitbreaker" => self.shared.name.clone(), "outcome" => outcome)
                .increment(1);
        }

        let state = self.state();
        match verdict {
            Verdict::Success => self
                .shared
                .event_listeners
                .emit(&CircuitBreakerEvent::SuccessRecorded {
                    pattern_name: self.shared.name.clone(),
                    timestamp: std::time::Instant::now(),
                    state,
                    elapsed,
                }),
            Verdict::Failure => self
                .shared
                .event_listeners
                .emit(&CircuitBreakerEvent::FailureRecorded {
                    pattern_name: self.shared.name.clone(),
                    timestamp: std::time::Instant::now(),
                    state,
                    elapsed,
                }),
            Verdict::Ignored => {}
        }

        if let Some(transition) = transition {
            self.announce(transition);
        }
    }

    fn release(&self, admission: Admission) {
        self.shared.circuit.lock().release(admission);
    }

    fn announce(&self, transition: Transition) {
        #[cfg(feature = "tracing")]
        tracing::info!(
            breaker = %self.shared.name,
            from = %transition.from,
            to = %transition.to,
            "circuit breaker state changed"
        );

        #[cfg(feature = "metrics")]
        {
            counter!(
                "circuitbreaker_transitions_total",
                "circuitbreaker" => self.shared.name.clone(),
                "from" => transition.from.as_str(),
                "to" => transition.to.as_str()
            )
            .increment(1);
            gauge!("circuitbreaker_state", "circuitbreaker" => self.shared.name.clone())
                .set(transition.to as u8 as f64);
        }

        self.shared
            .event_listeners
            .emit(&CircuitBreakerEvent::StateTransition {
                pattern_name: self.shared.name.clone(),
                timestamp: std::time::Instant::now(),
                from_state: transition.from,
                to_state: transition.to,
            });
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .field("config", &self.shared.config)
            .finish()
    }
}

/// Releases a trial slot if the call is dropped before it finishes.
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    finished: bool,
}

impl CallGuard<'_> {
    fn finish(mut self, verdict: Verdict, elapsed: Duration) {
        self.finished = true;
        self.breaker.complete(self.admission, verdict, elapsed);
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.breaker.release(self.admission);
        }
    }
}
