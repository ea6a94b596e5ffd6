//! Fail-open rate limiting over a shared counter store.
//!
//! Each limited request increments a counter keyed by
//! `rate_limit:{actor}:{action}`. The first increment in a window sets the
//! key's expiry, so the window slides from the actor's first request. Once
//! the counter passes the policy's limit, requests are rejected with a
//! [`RateLimitExceeded`] carrying the count, limit and window.
//!
//! The store call is guarded by a circuit breaker and retried with the
//! external-service preset. If the store is unreachable anyway, the check
//! logs a warning and lets the request through: an outage of the counter
//! store never blocks traffic.
//!
//! ## Middleware
//!
//! ```rust
//! use bulwark_ratelimiter::{
//!     create_rate_limit_middleware, AuthenticatedActor, InMemoryCounterStore, RateLimiter,
//! };
//! use tower::{Service, ServiceBuilder, ServiceExt};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let limiter = RateLimiter::builder(InMemoryCounterStore::new()).build();
//! let mut service = ServiceBuilder::new()
//!     .layer(create_rate_limit_middleware(limiter, 10, 60, None))
//!     .service(tower::service_fn(|_req: http::Request<()>| async {
//!         Ok::<_, std::convert::Infallible>(http::Response::new("created"))
//!     }));
//!
//! let mut request = http::Request::post("/comments").body(()).unwrap();
//! request
//!     .extensions_mut()
//!     .insert(AuthenticatedActor("user_42".into()));
//!
//! let response = service.ready().await.unwrap().call(request).await.unwrap();
//! assert_eq!(*response.body(), "created");
//! # }
//! ```
//!
//! ## Actors
//!
//! The default [`KeyGenerator`] uses the [`AuthenticatedActor`] extension,
//! falling back to [`client_ip`]: the first `x-forwarded-for` entry, then
//! `x-real-ip`, then `"unknown"`.
//!
//! ## Feature Flags
//! - `tracing`: log fail-open fallbacks and rejections (default)
//! - `metrics`: `ratelimiter_calls_total{ratelimiter,result}`
//! - `redis`: [`RedisCounterStore`]
//! - `serde`: (de)serialize [`RateLimitPolicy`] with `window_seconds`

mod error;
mod events;
mod key;
mod layer;
mod limiter;
mod policy;
#[cfg(feature = "redis")]
mod redis_store;
mod store;

pub use error::{RateLimitExceeded, RateLimitServiceError};
pub use events::RateLimiterEvent;
pub use key::{
    client_ip, rate_limit_key, ActionName, AuthenticatedActor, KeyGenerator, UNKNOWN_ACTOR,
};
pub use layer::{create_rate_limit_middleware, RateLimit, RateLimitLayer};
pub use limiter::{RateLimitDecision, RateLimiter, RateLimiterBuilder, STORE_BREAKER_NAME};
pub use policy::RateLimitPolicy;
#[cfg(feature = "redis")]
pub use redis_store::RedisCounterStore;
pub use store::{CounterStore, InMemoryCounterStore, StoreError};
