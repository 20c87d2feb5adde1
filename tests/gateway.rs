//! End-to-end tests: client → gateway → mock upstream.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use service_gateway::auth::session::unix_now;
use service_gateway::auth::CachedIdentity;
use service_gateway::cache::MemoryCache;
use service_gateway::config::{GatewayConfig, ServiceConfig};
use service_gateway::dispatch::HttpTransport;
use service_gateway::http::codes;
use service_gateway::lifecycle::{build_gateway_with, Gateway, Shutdown};

mod common;

struct Harness {
    addr: SocketAddr,
    gateway: Arc<Gateway>,
    shutdown: Shutdown,
    client: reqwest::Client,
}

impl Harness {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn get(&self, path: &str) -> (reqwest::header::HeaderMap, Value) {
        let res = self.client.get(self.url(path)).send().await.expect("Gateway unreachable");
        assert_eq!(res.status(), 200);
        let headers = res.headers().clone();
        (headers, res.json().await.unwrap())
    }
}

fn service(name: &str, prefix: &str, method: &str, auth: bool, instances: Vec<String>) -> ServiceConfig {
    ServiceConfig {
        name: name.into(),
        prefix: prefix.into(),
        route: "/".into(),
        method: method.into(),
        auth,
        tags: Vec::new(),
        instances,
    }
}

async fn start_gateway(services: Vec<ServiceConfig>) -> Harness {
    let mut config = GatewayConfig::default();
    config.auth.signing_key = "integration-secret".into();
    config.auth.cipher_key = "0123456789abcdef".into();
    config.services = services;

    let transport = HttpTransport::new(Duration::from_millis(200)).unwrap();
    let gateway = Arc::new(
        build_gateway_with(config, Arc::new(MemoryCache::new()), Arc::new(transport)).unwrap(),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = gateway.server();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    // Let the endpointers pick up their static instances.
    for route in &gateway.routes {
        for _ in 0..200 {
            if !route.dispatcher.endpointer().endpoints().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap();

    Harness {
        addr,
        gateway,
        shutdown,
        client,
    }
}

fn session(expires_in: i64) -> CachedIdentity {
    CachedIdentity {
        id: 7,
        name: "ann".into(),
        status: 1,
        expires_in,
        message: String::new(),
    }
}

#[tokio::test]
async fn test_health_reports_service_identity() {
    let h = start_gateway(Vec::new()).await;

    let (headers, body) = h.get("/health").await;
    assert_eq!(body["status"], codes::OK);
    assert_eq!(body["data"]["service"], "service-gateway");
    assert_eq!(headers.get("x-power").unwrap(), "service-gateway");
    assert!(headers.get("x-request-id").is_some());

    let (_, body) = h.get("/").await;
    assert_eq!(body["status"], codes::OK);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let h = start_gateway(Vec::new()).await;
    let (_, body) = h.get("/nowhere").await;
    assert_eq!(body["status"], codes::NOT_FOUND);
}

#[tokio::test]
async fn test_wrong_method_on_health() {
    let h = start_gateway(Vec::new()).await;
    let res = h.client.post(h.url("/health")).send().await.unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], codes::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_public_get_strips_prefix_and_forwards_query() {
    let backend = common::start_mock_backend(200, common::ok_row(json!({"page": 2}))).await;
    let h = start_gateway(vec![service("users", "/api/users", "GET", false, vec![backend.address()])]).await;

    let (_, body) = h.get("/api/users/list?page=2&access_token=abc").await;
    assert_eq!(body["status"], codes::OK);
    assert_eq!(body["data"]["page"], 2);

    let seen = &backend.requests()[0];
    assert!(
        seen.line.starts_with("GET /list?page=2&access_token=abc "),
        "unexpected request line: {}",
        seen.line
    );
    assert!(seen.header("x-request-id").is_some());
}

#[tokio::test]
async fn test_protected_route_without_token_never_reaches_upstream() {
    let backend = common::start_mock_backend(200, common::ok_row(json!(null))).await;
    let h = start_gateway(vec![service("orders", "/api/orders", "POST", true, vec![backend.address()])]).await;

    let res = h
        .client
        .post(h.url("/api/orders/create"))
        .json(&json!({"sku": "a-1"}))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();

    assert_eq!(body["status"], codes::UNAUTHORIZED);
    assert_eq!(body["errors"]["message"], "missing credential");
    assert_eq!(backend.hits(), 0);
}

#[tokio::test]
async fn test_issued_token_reaches_upstream() {
    let backend = common::start_mock_backend(200, common::ok_row(json!({"order": 1}))).await;
    let h = start_gateway(vec![service("orders", "/api/orders", "POST", true, vec![backend.address()])]).await;

    let token = h
        .gateway
        .authenticator
        .issue("7", &session(unix_now() + 3600))
        .await
        .unwrap();

    let res = h
        .client
        .post(h.url("/api/orders/create"))
        .bearer_auth(&token)
        .json(&json!({"sku": "a-1"}))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], codes::OK);
    assert_eq!(body["data"]["order"], 1);

    let seen = &backend.requests()[0];
    assert!(seen.line.starts_with("POST /create?access_token="));
    assert_eq!(seen.header("authorization"), Some(format!("Bearer {}", token).as_str()));
    let forwarded: Value = serde_json::from_str(&seen.body).unwrap();
    assert_eq!(forwarded["sku"], "a-1");
}

#[tokio::test]
async fn test_expired_session_is_rejected() {
    let backend = common::start_mock_backend(200, common::ok_row(json!(null))).await;
    let h = start_gateway(vec![service("orders", "/api/orders", "GET", true, vec![backend.address()])]).await;

    let auth = &h.gateway.authenticator;
    let token = auth.issue("7", &session(unix_now() + 3600)).await.unwrap();
    auth.sessions().store("7", &session(unix_now() - 10)).await.unwrap();

    let (_, body) = h.get(&format!("/api/orders/mine?access_token={}", token)).await;
    assert_eq!(body["status"], codes::UNAUTHORIZED);
    assert_eq!(body["errors"]["message"], "session expired");
    assert_eq!(backend.hits(), 0);
}

#[tokio::test]
async fn test_unreachable_upstream_is_an_exception() {
    let dead = common::closed_address().await;
    let h = start_gateway(vec![service("users", "/api/users", "GET", false, vec![dead])]).await;

    let (_, body) = h.get("/api/users/list").await;
    assert_eq!(body["status"], codes::EXCEPTION);
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let h = start_gateway(Vec::new()).await;
    h.get("/health").await;

    h.shutdown.trigger();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(h.client.get(h.url("/health")).send().await.is_err());
}
