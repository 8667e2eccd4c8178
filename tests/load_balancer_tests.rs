// tests/load_balancer_tests.rs
use hyper::{Body, Client, Method, Request, StatusCode};
use rr_balancer::config::{BackendConfig, ForwardConfig, RetryConfig};
use rr_balancer::proxy::{Proxy, ServerPool};
use rr_balancer::retry::RetryPolicy;
use rr_balancer::server::{RequestHandler, ServerBuilder};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::{Service, ServiceExt};
use url::Url;

fn closed_port_url() -> Url {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{}", addr)).unwrap()
}

fn proxy_for(urls: Vec<Url>) -> Arc<Proxy> {
    let configs: Vec<BackendConfig> = urls.into_iter().map(|url| BackendConfig { url }).collect();
    let pool = ServerPool::from_config(&configs, &ForwardConfig::default());
    let policy = RetryPolicy::new(RetryConfig {
        max_retries: 3,
        max_attempts: 3,
        retry_delay_ms: 1,
    });
    Arc::new(Proxy::new(Arc::new(pool), policy, None))
}

async fn body_string(resp: hyper::Response<Body>) -> String {
    let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_round_robin_distribution() {
    let mut a = mockito::Server::new_async().await;
    let mut b = mockito::Server::new_async().await;
    let mock_a = a
        .mock("GET", "/hello")
        .with_body("a")
        .expect(2)
        .create_async()
        .await;
    let mock_b = b
        .mock("GET", "/hello")
        .with_body("b")
        .expect(1)
        .create_async()
        .await;

    let proxy = proxy_for(vec![
        Url::parse(&a.url()).unwrap(),
        Url::parse(&b.url()).unwrap(),
    ]);

    let mut seen = Vec::new();
    for _ in 0..3 {
        let resp = proxy.handle(get("/hello")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        seen.push(body_string(resp).await);
    }

    assert_eq!(seen, vec!["a", "b", "a"]);
    mock_a.assert_async().await;
    mock_b.assert_async().await;
}

#[tokio::test]
async fn test_backend_errors_are_passed_through() {
    let mut a = mockito::Server::new_async().await;
    let mock = a
        .mock("GET", "/broken")
        .with_status(500)
        .with_body("boom")
        .expect(1)
        .create_async()
        .await;

    let proxy = proxy_for(vec![Url::parse(&a.url()).unwrap()]);

    // An HTTP error status is a response, not a forwarding failure.
    let resp = proxy.handle(get("/broken")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(resp).await, "boom");
    assert!(proxy.pool().backends()[0].is_alive().await);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_failover_replays_request_body() {
    let mut live = mockito::Server::new_async().await;
    let mock = live
        .mock("POST", "/orders")
        .match_body("payload")
        .with_status(201)
        .expect(1)
        .create_async()
        .await;

    let dead = closed_port_url();
    let proxy = proxy_for(vec![dead.clone(), Url::parse(&live.url()).unwrap()]);

    let req = Request::builder()
        .method(Method::POST)
        .uri("/orders")
        .body(Body::from("payload"))
        .unwrap();
    let resp = proxy.handle(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    assert!(!proxy.pool().backends()[0].is_alive().await);
    assert!(proxy.pool().backends()[1].is_alive().await);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_all_backends_down_returns_503() {
    let proxy = proxy_for(vec![closed_port_url(), closed_port_url()]);
    let mut handler = RequestHandler::new(proxy.clone());

    let resp = handler.ready().await.unwrap().call(get("/")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_string(resp).await, "Service not available");
    assert_eq!(proxy.pool().alive_count().await, 0);

    // Nothing alive: later requests fail without touching the network.
    let resp = handler.ready().await.unwrap().call(get("/")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_end_to_end_through_listener() {
    let mut backend = mockito::Server::new_async().await;
    let mock = backend
        .mock("GET", "/api/items")
        .match_query(mockito::Matcher::UrlEncoded("page".into(), "2".into()))
        .match_header("x-forwarded-for", "127.0.0.1")
        .with_body("items")
        .expect(1)
        .create_async()
        .await;

    let proxy = proxy_for(vec![Url::parse(&backend.url()).unwrap()]);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let lb_addr = listener.local_addr().unwrap();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(
        ServerBuilder::from_listener(listener)
            .with_handler(RequestHandler::new(proxy))
            .serve_with_shutdown(async {
                let _ = stop_rx.await;
            }),
    );

    let client = Client::new();
    let uri = format!("http://{}/api/items?page=2", lb_addr).parse().unwrap();
    let resp = client.get(uri).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "items");
    mock.assert_async().await;

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
