use crate::config::CircuitBreakerConfig;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
#[repr(u8)]
pub enum CircuitState {
    /// Calls flow normally.
    Closed = 0,
    /// Calls are rejected without being attempted.
    Open = 1,
    /// A limited number of trial calls probe for recovery.
    HalfOpen = 2,
}

impl CircuitState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    /// Upper-case label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time snapshot of a breaker's counters.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitMetrics {
    /// Current state.
    pub state: CircuitState,
    /// Consecutive failures in the current CLOSED window.
    pub failure_count: u32,
    /// Successful trials in the current HALF_OPEN window.
    pub success_count: u32,
    /// Trial calls currently running.
    pub trials_in_flight: u32,
    /// Every `execute` call, rejected ones included.
    pub total_calls: u64,
    /// Calls that completed successfully.
    pub successful_calls: u64,
    /// Calls recorded as failures.
    pub failed_calls: u64,
    /// Calls rejected while OPEN or while HALF_OPEN had no free trial slot.
    pub rejected_calls: u64,
    /// `failed_calls / total_calls` as a rounded percentage.
    pub failure_rate: u8,
    /// Time since the most recent recorded failure.
    pub time_since_last_failure: Option<Duration>,
    /// Time since the last state transition.
    pub time_since_state_change: Duration,
    /// Time until an OPEN breaker admits a trial call.
    pub next_retry_in: Option<Duration>,
}

/// A state change produced by the circuit, reported after the lock is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Transition {
    pub(crate) from: CircuitState,
    pub(crate) to: CircuitState,
}

/// Permission to run one call.
///
/// Outcomes are only applied to the state machine when they belong to the
/// epoch they were admitted in; anything older only updates lifetime totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Admission {
    pub(crate) epoch: u64,
    pub(crate) trial: bool,
    pub(crate) state: CircuitState,
}

/// Outcome of asking the circuit for permission.
#[derive(Debug)]
pub(crate) enum Acquire {
    Permitted {
        admission: Admission,
        transition: Option<Transition>,
    },
    Rejected {
        retry_in: Option<Duration>,
    },
}

pub(crate) struct Circuit {
    state: CircuitState,
    state_atomic: Arc<AtomicU8>,
    epoch: u64,
    failure_count: u32,
    success_count: u32,
    trials_in_flight: u32,
    last_failure_at: Option<Instant>,
    last_state_change: Instant,
    total_calls: u64,
    successful_calls: u64,
    failed_calls: u64,
    rejected_calls: u64,
}

impl Circuit {
    pub(crate) fn new(state_atomic: Arc<AtomicU8>) -> Self {
        state_atomic.store(CircuitState::Closed as u8, Ordering::Release);
        Self {
            state: CircuitState::Closed,
            state_atomic,
            epoch: 0,
            failure_count: 0,
            success_count: 0,
            trials_in_flight: 0,
            last_failure_at: None,
            last_state_change: Instant::now(),
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            rejected_calls: 0,
        }
    }

    pub(crate) fn state(&self) -> CircuitState {
        self.state
    }

    pub(crate) fn try_acquire(&mut self, config: &CircuitBreakerConfig, now: Instant) -> Acquire {
        self.total_calls += 1;

        let mut transition = None;
        if self.state == CircuitState::Open {
            if self.reset_timeout_elapsed(config, now) {
                transition = self.transition_to(CircuitState::HalfOpen, now);
            } else {
                self.rejected_calls += 1;
                return Acquire::Rejected {
                    retry_in: self.retry_in(config, now),
                };
            }
        }

        match self.state {
            CircuitState::Closed => Acquire::Permitted {
                admission: self.admission(false),
                transition,
            },
            CircuitState::HalfOpen if self.trials_in_flight < config.half_open_max_trials => {
                self.trials_in_flight += 1;
                Acquire::Permitted {
                    admission: self.admission(true),
                    transition,
                }
            }
            // HALF_OPEN with every trial slot taken: rejected as OPEN, no retry hint.
            _ => {
                self.rejected_calls += 1;
                Acquire::Rejected { retry_in: None }
            }
        }
    }

    pub(crate) fn record_success(
        &mut self,
        admission: Admission,
        config: &CircuitBreakerConfig,
        now: Instant,
    ) -> Option<Transition> {
        self.successful_calls += 1;
        if admission.epoch != self.epoch {
            return None;
        }

        match self.state {
            CircuitState::Closed => {
                self.failure_count = 0;
                None
            }
            CircuitState::HalfOpen => {
                self.trials_in_flight = self.trials_in_flight.saturating_sub(1);
                self.success_count += 1;
                if self.success_count >= config.half_open_success_threshold {
                    self.transition_to(CircuitState::Closed, now)
                } else {
                    None
                }
            }
            CircuitState::Open => None,
        }
    }

    pub(crate) fn record_failure(
        &mut self,
        admission: Admission,
        config: &CircuitBreakerConfig,
        now: Instant,
    ) -> Option<Transition> {
        self.failed_calls += 1;
        if admission.epoch != self.epoch {
            return None;
        }

        match self.state {
            CircuitState::Closed => {
                self.failure_count += 1;
                self.last_failure_at = Some(now);
                if self.failure_count >= config.failure_threshold {
                    self.transition_to(CircuitState::Open, now)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                self.last_failure_at = Some(now);
                self.transition_to(CircuitState::Open, now)
            }
            CircuitState::Open => None,
        }
    }

    /// Frees a trial slot whose call ended without a recorded outcome.
    pub(crate) fn release(&mut self, admission: Admission) {
        if admission.trial && admission.epoch == self.epoch {
            self.trials_in_flight = self.trials_in_flight.saturating_sub(1);
        }
    }

    pub(crate) fn reset(&mut self, now: Instant) -> Option<Transition> {
        let transition = self.transition_to(CircuitState::Closed, now);
        if transition.is_none() {
            self.epoch += 1;
            self.clear_window();
        }
        self.last_failure_at = None;
        transition
    }

    pub(crate) fn metrics(&self, config: &CircuitBreakerConfig, now: Instant) -> CircuitMetrics {
        let failure_rate = if self.total_calls == 0 {
            0
        } else {
            ((self.failed_calls as f64 / self.total_calls as f64) * 100.0).round() as u8
        };

        CircuitMetrics {
            state: self.state,
            failure_count: self.failure_count,
            success_count: self.success_count,
            trials_in_flight: self.trials_in_flight,
            total_calls: self.total_calls,
            successful_calls: self.successful_calls,
            failed_calls: self.failed_calls,
            rejected_calls: self.rejected_calls,
            failure_rate,
            time_since_last_failure: self.last_failure_at.map(|at| now.duration_since(at)),
            time_since_state_change: now.duration_since(self.last_state_change),
            next_retry_in: self.retry_in(config, now),
        }
    }

    fn admission(&self, trial: bool) -> Admission {
        Admission {
            epoch: self.epoch,
            trial,
            state: self.state,
        }
    }

    fn reset_timeout_elapsed(&self, config: &CircuitBreakerConfig, now: Instant) -> bool {
        match self.last_failure_at {
            Some(at) => now.duration_since(at) >= config.reset_timeout,
            None => true,
        }
    }

    fn retry_in(&self, config: &CircuitBreakerConfig, now: Instant) -> Option<Duration> {
        if self.state != CircuitState::Open {
            return None;
        }
        let at = self.last_failure_at?;
        Some(config.reset_timeout.saturating_sub(now.duration_since(at)))
    }

    fn transition_to(&mut self, state: CircuitState, now: Instant) -> Option<Transition> {
        if self.state == state {
            return None;
        }

        let from = self.state;
        self.state = state;
        self.state_atomic.store(state as u8, Ordering::Release);
        self.last_state_change = now;
        self.epoch += 1;
        self.clear_window();

        Some(Transition { from, to: state })
    }

    fn clear_window(&mut self) {
        self.failure_count = 0;
        self.success_count = 0;
        self.trials_in_flight = 0;
    }
}
