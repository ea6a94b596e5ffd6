use crate::config::{RetryConfig, RetryConfigBuilder};
use crate::error::RetryError;
use crate::executor::with_retry;
use futures::future::BoxFuture;
use std::fmt::Display;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service, ServiceExt};

/// Tower layer that retries failed requests.
///
/// Requests must be `Clone`; each attempt gets its own copy and waits for
/// the inner service to become ready.
///
/// ```
/// use bulwark_retry::{RetryLayer, ResourceKind};
/// use tower::ServiceBuilder;
/// use std::time::Duration;
///
/// let layer = RetryLayer::<std::io::Error>::builder()
///     .max_attempts(2)
///     .exponential_backoff(Duration::from_secs(1))
///     .resource_kind(ResourceKind::ExternalService)
///     .name("email")
///     .build_layer();
///
/// let service = ServiceBuilder::new()
///     .layer(layer)
///     .service(tower::service_fn(|to: String| async move {
///         Ok::<_, std::io::Error>(to)
///     }));
/// ```
pub struct RetryLayer<E> {
    config: Arc<RetryConfig<E>>,
}

impl<E> RetryLayer<E> {
    /// Wraps `config`.
    pub fn new(config: RetryConfig<E>) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Starts a configuration builder.
    pub fn builder() -> RetryConfigBuilder<E> {
        RetryConfigBuilder::new()
    }
}

impl<E> Clone for RetryLayer<E> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
        }
    }
}

impl<S, E> Layer<S> for RetryLayer<E> {
    type Service = Retry<S, E>;

    fn layer(&self, inner: S) -> Self::Service {
        Retry {
            inner,
            config: Arc::clone(&self.config),
        }
    }
}

/// Service produced by [`RetryLayer`].
pub struct Retry<S, E> {
    inner: S,
    config: Arc<RetryConfig<E>>,
}

impl<S: Clone, E> Clone for Retry<S, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S, Req, E> Service<Req> for Retry<S, E>
where
    S: Service<Req, Error = E> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    Req: Clone + Send + 'static,
    E: Display + Send + Sync + 'static,
{
    type Response = S::Response;
    type Error = RetryError<E>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Each attempt drives readiness on its own clone.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let service = self.inner.clone();
        let config = Arc::clone(&self.config);

        Box::pin(async move {
            let outcome = with_retry(
                move || {
                    let svc = service.clone();
                    let req = req.clone();
                    async move { svc.oneshot(req).await }
                },
                &config,
            )
            .await?;
            Ok(outcome.result)
        })
    }
}
