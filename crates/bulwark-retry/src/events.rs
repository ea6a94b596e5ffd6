use bulwark_core::ResilienceEvent;
use std::time::{Duration, Instant};

/// Events emitted by a retry loop.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// An attempt failed and another is scheduled after `delay`.
    Retry {
        pattern_name: String,
        timestamp: Instant,
        /// Attempt that just failed (1-based).
        attempt: usize,
        delay: Duration,
    },
    /// An attempt succeeded.
    Success {
        pattern_name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// Every attempt failed.
    Error {
        pattern_name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// An attempt failed with an error the policy does not retry.
    IgnoredError {
        pattern_name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// The cancellation token fired.
    Cancelled {
        pattern_name: String,
        timestamp: Instant,
        attempts: usize,
    },
}

impl ResilienceEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retry { .. } => "retry",
            RetryEvent::Success { .. } => "success",
            RetryEvent::Error { .. } => "error",
            RetryEvent::IgnoredError { .. } => "ignored_error",
            RetryEvent::Cancelled { .. } => "cancelled",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Retry { timestamp, .. }
            | RetryEvent::Success { timestamp, .. }
            | RetryEvent::Error { timestamp, .. }
            | RetryEvent::IgnoredError { timestamp, .. }
            | RetryEvent::Cancelled { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            RetryEvent::Retry { pattern_name, .. }
            | RetryEvent::Success { pattern_name, .. }
            | RetryEvent::Error { pattern_name, .. }
            | RetryEvent::IgnoredError { pattern_name, .. }
            | RetryEvent::Cancelled { pattern_name, .. } => pattern_name,
        }
    }
}
