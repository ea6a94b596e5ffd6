use crate::error::RateLimitServiceError;
use crate::key::KeyGenerator;
use crate::limiter::{RateLimitDecision, RateLimiter};
use crate::policy::RateLimitPolicy;
use futures::future::BoxFuture;
use http::Request;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service, ServiceExt};

/// Builds the rate-limit middleware for one action.
///
/// Allows `requests` per `window_seconds` for each key. The key comes from
/// `key_generator`, defaulting to [`KeyGenerator::actor`].
///
/// ```rust
/// use bulwark_ratelimiter::{
///     create_rate_limit_middleware, InMemoryCounterStore, KeyGenerator, RateLimiter,
/// };
/// use tower::ServiceBuilder;
///
/// let limiter = RateLimiter::builder(InMemoryCounterStore::new()).build();
///
/// let service = ServiceBuilder::new()
///     .layer(create_rate_limit_middleware(
///         limiter,
///         30,
///         60,
///         Some(KeyGenerator::client_ip("search")),
///     ))
///     .service(tower::service_fn(|_req: http::Request<()>| async {
///         Ok::<_, std::convert::Infallible>(http::Response::new(()))
///     }));
/// ```
pub fn create_rate_limit_middleware(
    limiter: RateLimiter,
    requests: u64,
    window_seconds: u64,
    key_generator: Option<KeyGenerator>,
) -> RateLimitLayer {
    RateLimitLayer::new(
        limiter,
        RateLimitPolicy::new(requests, Duration::from_secs(window_seconds)),
    )
    .key_generator(key_generator.unwrap_or_default())
}

/// Tower layer counting requests through a [`RateLimiter`].
#[derive(Debug, Clone)]
pub struct RateLimitLayer {
    limiter: RateLimiter,
    policy: RateLimitPolicy,
    key_generator: KeyGenerator,
}

impl RateLimitLayer {
    /// Limits requests with `policy`, keyed by [`KeyGenerator::actor`].
    pub fn new(limiter: RateLimiter, policy: RateLimitPolicy) -> Self {
        Self {
            limiter,
            policy,
            key_generator: KeyGenerator::default(),
        }
    }

    /// Replaces the key generator.
    pub fn key_generator(mut self, key_generator: KeyGenerator) -> Self {
        self.key_generator = key_generator;
        self
    }

    /// The enforced policy.
    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimit<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimit {
            inner,
            limiter: self.limiter.clone(),
            policy: self.policy,
            key_generator: self.key_generator.clone(),
        }
    }
}

/// Service produced by [`RateLimitLayer`].
///
/// Admitted requests carry their [`RateLimitDecision`] as an extension.
#[derive(Debug, Clone)]
pub struct RateLimit<S> {
    inner: S,
    limiter: RateLimiter,
    policy: RateLimitPolicy,
    key_generator: KeyGenerator,
}

impl<S, B> Service<Request<B>> for RateLimit<S>
where
    S: Service<Request<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = RateLimitServiceError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner
            .poll_ready(cx)
            .map_err(RateLimitServiceError::Inner)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let limiter = self.limiter.clone();
        let policy = self.policy;

        let (mut parts, body) = req.into_parts();
        let key = self.key_generator.key(&parts);

        Box::pin(async move {
            let decision = limiter
                .check(&key, &policy)
                .await
                .map_err(RateLimitServiceError::Limited)?;
            parts.extensions.insert(decision);

            inner
                .oneshot(Request::from_parts(parts, body))
                .await
                .map_err(RateLimitServiceError::Inner)
        })
    }
}
