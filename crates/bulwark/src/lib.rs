//! Circuit breakers, retries and fail-open rate limiting for async services.
//!
//! `bulwark` bundles the pattern crates behind one dependency and adds the
//! pieces an application wires up once at startup:
//!
//! - [`ResilienceSettings`]: every tunable threshold, loaded from TOML
//! - [`Resilience`]: the process-wide breaker registry plus guarded
//!   `database` / `external_service` calls that run a retry loop inside a
//!   named circuit breaker
//! - [`spawn_detached`]: fire-and-forget side effects whose failures are
//!   logged, never propagated
//!
//! # Patterns
//!
//! - [`circuitbreaker`]: consecutive-failure breakers and the named registry
//! - [`retry`]: exponential backoff with resource-aware classification
//! - [`ratelimiter`] (`ratelimiter` feature): counter-based limits in a shared
//!   store, failing open when the store is down
//!
//! # Example
//!
//! ```rust
//! use bulwark::{Resilience, ResilienceSettings, ResourceKind};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = ResilienceSettings::from_toml_str(
//!     r#"
//!     [circuit_breakers.external_service]
//!     failure_threshold = 3
//!     "#,
//! )?;
//! let resilience = Resilience::new(settings);
//!
//! let sent = resilience
//!     .external_service("email", ResourceKind::ExternalService, || async {
//!         Ok::<_, std::io::Error>("queued")
//!     })
//!     .await;
//!
//! match sent {
//!     Ok(status) => assert_eq!(status, "queued"),
//!     Err(err) if err.is_handled() => eprintln!("{}", err.user_facing().message()),
//!     Err(err) => return Err(err.to_string().into()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Feature Flags
//! - `ratelimiter` (default): the rate limiter and its middleware
//! - `redis`: Redis counter store
//! - `tracing`: logging in every pattern
//! - `metrics`: metrics in every pattern
//! - `full`: all of the above

mod attempt;
mod resilience;
mod settings;

pub use bulwark_circuitbreaker as circuitbreaker;
pub use bulwark_core as core;
#[cfg(feature = "ratelimiter")]
pub use bulwark_ratelimiter as ratelimiter;
pub use bulwark_retry as retry;

pub use bulwark_circuitbreaker::{
    BreakerCategory, CircuitBreaker, CircuitBreakerError, CircuitBreakerRegistry, CircuitState,
};
pub use bulwark_core::{spawn_detached, ResilienceError, UserFacing};
pub use bulwark_retry::{
    with_database_retry, with_retry, with_service_retry, CancellationToken, ResourceKind,
    RetryOptions,
};

pub use resilience::Resilience;
pub use settings::{
    BreakerOverrides, BreakerSettings, ResilienceSettings, RetrySettings, SettingsError,
};
