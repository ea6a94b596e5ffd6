use bulwark_core::ResilienceEvent;
use std::time::Instant;

/// Events emitted by a rate limiter.
#[derive(Debug, Clone)]
pub enum RateLimiterEvent {
    /// The request was within its limit.
    Permitted {
        pattern_name: String,
        timestamp: Instant,
        key: String,
        current_count: u64,
        limit: u64,
    },
    /// The request exceeded its limit.
    Rejected {
        pattern_name: String,
        timestamp: Instant,
        key: String,
        current_count: u64,
        limit: u64,
    },
    /// The counter store failed and the request was let through unchecked.
    FailedOpen {
        pattern_name: String,
        timestamp: Instant,
        key: String,
        error: String,
    },
}

impl ResilienceEvent for RateLimiterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RateLimiterEvent::Permitted { .. } => "permitted",
            RateLimiterEvent::Rejected { .. } => "rejected",
            RateLimiterEvent::FailedOpen { .. } => "failed_open",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RateLimiterEvent::Permitted { timestamp, .. }
            | RateLimiterEvent::Rejected { timestamp, .. }
            | RateLimiterEvent::FailedOpen { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            RateLimiterEvent::Permitted { pattern_name, .. }
            | RateLimiterEvent::Rejected { pattern_name, .. }
            | RateLimiterEvent::FailedOpen { pattern_name, .. } => pattern_name,
        }
    }
}
