use bulwark_core::ResilienceError;
use std::time::Duration;
use thiserror::Error;

/// The counter for `key` passed its limit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rate limit exceeded for {key}: {current_count}/{limit} per {}s", .window.as_secs())]
pub struct RateLimitExceeded {
    /// Counter key.
    pub key: String,
    /// Counter value after this request.
    pub current_count: u64,
    /// Requests allowed per window.
    pub limit: u64,
    /// Window length.
    pub window: Duration,
}

/// Error returned by the rate-limit middleware.
#[derive(Debug, Error)]
pub enum RateLimitServiceError<E> {
    /// The request was rejected before reaching the inner service.
    #[error(transparent)]
    Limited(RateLimitExceeded),

    /// The inner service failed.
    #[error(transparent)]
    Inner(E),
}

impl<E> RateLimitServiceError<E> {
    /// True when the request was throttled.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RateLimitServiceError::Limited(_))
    }

    /// Rejection details, when throttled.
    pub fn rejection(&self) -> Option<&RateLimitExceeded> {
        match self {
            RateLimitServiceError::Limited(rejection) => Some(rejection),
            RateLimitServiceError::Inner(_) => None,
        }
    }

    /// Extracts the inner service's error.
    pub fn into_inner(self) -> Option<E> {
        match self {
            RateLimitServiceError::Inner(e) => Some(e),
            RateLimitServiceError::Limited(_) => None,
        }
    }
}

impl<E> From<RateLimitExceeded> for ResilienceError<E> {
    fn from(err: RateLimitExceeded) -> Self {
        ResilienceError::RateLimited {
            current_count: err.current_count,
            limit: err.limit,
            window: err.window,
        }
    }
}

impl<E> From<RateLimitServiceError<E>> for ResilienceError<E> {
    fn from(err: RateLimitServiceError<E>) -> Self {
        match err {
            RateLimitServiceError::Limited(rejection) => rejection.into(),
            RateLimitServiceError::Inner(e) => ResilienceError::Application(e),
        }
    }
}
