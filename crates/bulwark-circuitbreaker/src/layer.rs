use crate::classifier::{DefaultClassifier, FailureClassifier, FnClassifier};
use crate::{CircuitBreaker, CircuitBreakerError};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer guarding a service with an existing [`CircuitBreaker`].
///
/// Every service produced by the layer shares the breaker, so a registry
/// lookup and a layered client observe the same state.
///
/// ```rust
/// use bulwark_circuitbreaker::{CircuitBreakerLayer, CircuitBreakerRegistry};
/// use tower::{service_fn, ServiceBuilder};
///
/// let registry = CircuitBreakerRegistry::new();
/// let breaker = registry.external_service_breaker("email");
///
/// let service = ServiceBuilder::new()
///     .layer(CircuitBreakerLayer::new(breaker))
///     .service(service_fn(|to: String| async move {
///         Ok::<_, std::io::Error>(format!("sent to {to}"))
///     }));
/// ```
#[derive(Clone)]
pub struct CircuitBreakerLayer<C = DefaultClassifier> {
    breaker: CircuitBreaker,
    classifier: Arc<C>,
}

impl CircuitBreakerLayer<DefaultClassifier> {
    /// Guards services with `breaker`, counting every error as a failure.
    pub fn new(breaker: CircuitBreaker) -> Self {
        Self {
            breaker,
            classifier: Arc::new(DefaultClassifier),
        }
    }

    /// Uses `f` to decide which results count as failures.
    pub fn with_classifier<F>(self, f: F) -> CircuitBreakerLayer<FnClassifier<F>> {
        CircuitBreakerLayer {
            breaker: self.breaker,
            classifier: Arc::new(FnClassifier::new(f)),
        }
    }
}

impl<C> CircuitBreakerLayer<C> {
    /// The shared breaker.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

impl<S, C> Layer<S> for CircuitBreakerLayer<C> {
    type Service = CircuitBreakerService<S, C>;

    fn layer(&self, inner: S) -> Self::Service {
        CircuitBreakerService {
            inner,
            breaker: self.breaker.clone(),
            classifier: Arc::clone(&self.classifier),
        }
    }
}

/// Service produced by [`CircuitBreakerLayer`].
pub struct CircuitBreakerService<S, C = DefaultClassifier> {
    inner: S,
    breaker: CircuitBreaker,
    classifier: Arc<C>,
}

impl<S, C> CircuitBreakerService<S, C> {
    /// The shared breaker.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

impl<S: Clone, C> Clone for CircuitBreakerService<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            breaker: self.breaker.clone(),
            classifier: Arc::clone(&self.classifier),
        }
    }
}

impl<S, C, Req> Service<Req> for CircuitBreakerService<S, C>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    C: FailureClassifier<S::Response, S::Error> + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = CircuitBreakerError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(CircuitBreakerError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let breaker = self.breaker.clone();
        let classifier = Arc::clone(&self.classifier);
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            breaker
                .execute_classified(|| inner.call(req), &*classifier)
                .await
                .map(|execution| execution.result)
        })
    }
}
