//! Health reports for dashboards and health endpoints.

use crate::circuit::{CircuitMetrics, CircuitState};
use std::time::Duration;

/// Failure rate below which a HALF_OPEN breaker still reports healthy.
const HALF_OPEN_HEALTHY_BELOW: u8 = 50;

/// Summary of one breaker's health.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CircuitHealth {
    /// Breaker name.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// `true` when CLOSED, or HALF_OPEN with a failure rate under 50%.
    pub is_healthy: bool,
    /// Lifetime failure rate as a percentage.
    pub failure_rate: u8,
    /// Lifetime call count, rejected calls included.
    pub total_calls: u64,
    /// Time until an OPEN breaker admits a trial call.
    pub next_retry_in: Option<Duration>,
    /// Human-readable status line.
    pub message: String,
}

impl CircuitHealth {
    pub(crate) fn from_metrics(name: &str, metrics: &CircuitMetrics) -> Self {
        let is_healthy = match metrics.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => metrics.failure_rate < HALF_OPEN_HEALTHY_BELOW,
            CircuitState::Open => false,
        };

        let message = match metrics.state {
            CircuitState::Closed => {
                format!("Circuit healthy - {}% failure rate", metrics.failure_rate)
            }
            CircuitState::HalfOpen => format!(
                "Circuit testing recovery - {}% failure rate",
                metrics.failure_rate
            ),
            CircuitState::Open => {
                let secs = metrics
                    .next_retry_in
                    .map(|d| (d.as_millis() as f64 / 1000.0).round() as u64)
                    .unwrap_or(0);
                format!("Circuit OPEN - failing fast. Next retry in {}s", secs)
            }
        };

        Self {
            name: name.to_string(),
            state: metrics.state,
            is_healthy,
            failure_rate: metrics.failure_rate,
            total_calls: metrics.total_calls,
            next_retry_in: metrics.next_retry_in,
            message,
        }
    }

    /// `200` when healthy, `503` otherwise.
    pub fn http_status(&self) -> u16 {
        if self.is_healthy {
            200
        } else {
            503
        }
    }
}
