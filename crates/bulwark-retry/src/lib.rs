//! Retry with exponential backoff.
//!
//! [`with_retry`] runs an async operation up to `max_attempts` times. The
//! delay before attempt `k` (k >= 2) is `backoff * 2^(k-2)`, capped and
//! optionally jittered. Errors are classified per [`ResourceKind`]: a
//! non-retryable error stops the loop after the attempt that produced it,
//! and cancellation through a [`CancellationToken`] aborts the in-flight
//! attempt and any pending backoff.
//!
//! Two presets cover the common cases:
//! - [`with_database_retry`]: 3 attempts, 200ms base delay, database classifier
//! - [`with_service_retry`]: 2 attempts, 1s base delay, classifier for the given kind
//!
//! ```rust
//! use bulwark_retry::{with_database_retry, RetryOptions};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let outcome = with_database_retry(
//!     || async { Ok::<_, std::io::Error>(vec!["bobblehead"]) },
//!     RetryOptions::new().operation_name("list-bobbleheads"),
//! )
//! .await
//! .unwrap();
//!
//! assert_eq!(outcome.attempts, 1);
//! assert!(!outcome.was_retried);
//! # }
//! ```
//!
//! ## Feature Flags
//! - `tracing`: log retries and exhaustion (default)
//! - `metrics`: `retry_calls_total`, `retry_attempts_total`
//! - `serde`: deserialize [`RetryOptions`]

mod backoff;
mod classify;
mod config;
mod error;
mod events;
mod executor;
mod layer;
mod policy;

pub use backoff::{
    ExponentialBackoff, ExponentialRandomBackoff, FixedInterval, FnInterval, IntervalFunction,
};
pub use classify::{FailureDetails, ResourceKind};
pub use config::{RetryConfig, RetryConfigBuilder, RetryOptions};
pub use error::RetryError;
pub use events::RetryEvent;
pub use executor::{with_database_retry, with_retry, with_service_retry, AttemptDetail, RetryResult};
pub use layer::{Retry, RetryLayer};
pub use policy::{RetryPolicy, RetryPredicate};
pub use tokio_util::sync::CancellationToken;
