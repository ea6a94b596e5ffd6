use bulwark_ratelimiter::{
    create_rate_limit_middleware, ActionName, AuthenticatedActor, InMemoryCounterStore,
    KeyGenerator, RateLimitDecision, RateLimitServiceError, RateLimiter,
};
use http::{Request, Response};
use std::convert::Infallible;
use std::sync::Arc;
use tower::{service_fn, Layer, Service, ServiceExt};

async fn ok(_req: Request<()>) -> Result<Response<&'static str>, Infallible> {
    Ok(Response::new("ok"))
}

fn post(path: &str) -> http::request::Builder {
    Request::post(path)
}

#[tokio::test]
async fn authenticated_actor_wins_over_headers() {
    let store = Arc::new(InMemoryCounterStore::new());
    let limiter = RateLimiter::builder_shared(store.clone()).build();
    let mut svc = create_rate_limit_middleware(limiter, 5, 60, None).layer(service_fn(ok));

    let mut req = post("/collections")
        .header("x-forwarded-for", "203.0.113.9")
        .body(())
        .unwrap();
    req.extensions_mut()
        .insert(AuthenticatedActor("user_12".into()));
    req.extensions_mut()
        .insert(ActionName("create-collection".into()));

    svc.ready().await.unwrap().call(req).await.unwrap();
    assert_eq!(store.get("rate_limit:user_12:create-collection"), Some(1));
}

#[tokio::test]
async fn anonymous_requests_are_keyed_by_forwarded_address() {
    let store = Arc::new(InMemoryCounterStore::new());
    let limiter = RateLimiter::builder_shared(store.clone()).build();
    let mut svc = create_rate_limit_middleware(limiter, 5, 60, None).layer(service_fn(ok));

    let req = post("/search")
        .header("x-forwarded-for", " 198.51.100.4 , 10.0.0.1")
        .header("x-real-ip", "10.0.0.2")
        .body(())
        .unwrap();
    svc.ready().await.unwrap().call(req).await.unwrap();

    let req = post("/search")
        .header("x-real-ip", "10.0.0.2")
        .body(())
        .unwrap();
    svc.ready().await.unwrap().call(req).await.unwrap();

    let req = post("/search").body(()).unwrap();
    svc.ready().await.unwrap().call(req).await.unwrap();

    assert_eq!(store.get("rate_limit:198.51.100.4:/search"), Some(1));
    assert_eq!(store.get("rate_limit:10.0.0.2:/search"), Some(1));
    assert_eq!(store.get("rate_limit:unknown:/search"), Some(1));
}

#[tokio::test]
async fn rejection_does_not_reach_the_inner_service() {
    let limiter = RateLimiter::builder(InMemoryCounterStore::new()).build();
    let layer = create_rate_limit_middleware(
        limiter,
        1,
        60,
        Some(KeyGenerator::client_ip("report-content")),
    );
    let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counted = Arc::clone(&hits);
    let mut svc = layer.layer(service_fn(move |_req: Request<()>| {
        counted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        async { Ok::<_, Infallible>(Response::new(())) }
    }));

    let request = || {
        post("/reports")
            .header("x-real-ip", "192.0.2.1")
            .body(())
            .unwrap()
    };

    svc.ready().await.unwrap().call(request()).await.unwrap();
    let err = svc
        .ready()
        .await
        .unwrap()
        .call(request())
        .await
        .unwrap_err();

    match err {
        RateLimitServiceError::Limited(rejection) => {
            assert_eq!(rejection.key, "rate_limit:192.0.2.1:report-content");
            assert_eq!(rejection.current_count, 2);
        }
        RateLimitServiceError::Inner(never) => match never {},
    }
    assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn handler_sees_the_decision() {
    let limiter = RateLimiter::builder(InMemoryCounterStore::new()).build();
    let mut svc = create_rate_limit_middleware(limiter, 3, 60, None).layer(service_fn(
        |req: Request<()>| async move {
            Ok::<_, Infallible>(Response::new(
                req.extensions().get::<RateLimitDecision>().copied(),
            ))
        },
    ));

    let response = svc
        .ready()
        .await
        .unwrap()
        .call(post("/votes").body(()).unwrap())
        .await
        .unwrap();
    assert_eq!(
        response.into_body(),
        Some(RateLimitDecision::Permitted {
            current_count: 1,
            remaining: 2
        })
    );
}
