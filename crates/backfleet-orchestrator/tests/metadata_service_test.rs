//! Metadata Service Integration Tests
//!
//! These tests run the real axum metadata server on a loopback port and talk
//! to it over HTTP the way workers and downstream tooling do.
//!
//! Tests cover:
//! 1. Registration schema enforcement
//! 2. Last-write-wins re-registration
//! 3. Text and JSON listings, per type and in aggregate
//! 4. Barrier release, including excess registrations after release
//! 5. Concurrent registrations

use backfleet_common::{Backend, BoundBackend, Topology, TrafficType};
use backfleet_orchestrator::{MetadataServer, MetadataState, ReadinessBarrier, Registry};
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Test Server
// ============================================================================

struct TestServer {
    base_url: String,
    state: Arc<MetadataState>,
    topology: Arc<Topology>,
    _handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start(per_type: usize) -> Self {
        let topology = Arc::new(Topology::enumerate("127.0.0.1", "fleet", per_type));
        let barrier = Arc::new(ReadinessBarrier::new(topology.len()));
        let state = Arc::new(MetadataState::new(Registry::new(topology.clone()), barrier));

        let listener = MetadataServer::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("Failed to bind metadata server");
        let addr = listener.local_addr().unwrap();

        let server = MetadataServer::new(state.clone());
        let handle = tokio::spawn(async move {
            let _ = server.serve(listener).await;
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            topology,
            _handle: handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn backends(&self) -> Vec<Backend> {
        self.topology.iter().cloned().collect()
    }

    async fn register(&self, client: &Client, body: serde_json::Value) -> StatusCode {
        client
            .post(self.url("/register"))
            .json(&body)
            .send()
            .await
            .unwrap()
            .status()
    }

    async fn register_all(&self, client: &Client) {
        for (i, backend) in self.backends().iter().enumerate() {
            let bound = backend.bind(20000 + i as u16);
            let status = self.register(client, serde_json::to_value(&bound).unwrap()).await;
            assert_eq!(status, StatusCode::OK);
        }
    }

    async fn get(&self, client: &Client, path: &str) -> (StatusCode, String) {
        let res = client.get(self.url(path)).send().await.unwrap();
        let status = res.status();
        (status, res.text().await.unwrap())
    }
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_register_accepts_valid_payload() {
    let server = TestServer::start(1).await;
    let client = Client::new();

    let status = server
        .register(
            &client,
            json!({"host_addr": "127.0.0.1", "name": "fleet-edge-0", "traffic_type": "edge", "port": 31000}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(server.state.registry().port("fleet-edge-0"), Some(31000));
    assert_eq!(server.state.barrier().count(), 1);
}

#[tokio::test]
async fn test_register_rejects_unknown_field_without_counting() {
    let server = TestServer::start(1).await;
    let client = Client::new();

    let res = client
        .post(server.url("/register"))
        .json(&json!({
            "host_addr": "127.0.0.1",
            "name": "fleet-edge-0",
            "traffic_type": "edge",
            "port": 31000,
            "extra": true,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(res.text().await.unwrap().contains("extra"));
    assert!(server.state.registry().is_empty());
    assert_eq!(server.state.barrier().count(), 0);
}

#[tokio::test]
async fn test_register_rejects_malformed_json() {
    let server = TestServer::start(1).await;
    let client = Client::new();

    let res = client
        .post(server.url("/register"))
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(server.state.barrier().count(), 0);
}

#[tokio::test]
async fn test_register_rejects_unknown_traffic_type() {
    let server = TestServer::start(1).await;
    let client = Client::new();

    let status = server
        .register(
            &client,
            json!({"host_addr": "127.0.0.1", "name": "fleet-edge-0", "traffic_type": "grpc", "port": 31000}),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_requires_post() {
    let server = TestServer::start(1).await;
    let client = Client::new();

    let (status, _) = server.get(&client, "/register").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_reregistration_last_write_wins() {
    let server = TestServer::start(1).await;
    let client = Client::new();

    for port in [31000, 31001] {
        let status = server
            .register(
                &client,
                json!({"host_addr": "127.0.0.1", "name": "fleet-http-0", "traffic_type": "http", "port": port}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(server.state.registry().port("fleet-http-0"), Some(31001));
    assert_eq!(server.state.registry().len(), 1);
}

// ============================================================================
// Listings
// ============================================================================

#[tokio::test]
async fn test_listing_before_ready_is_service_unavailable() {
    let server = TestServer::start(1).await;
    let client = Client::new();

    server
        .register(
            &client,
            json!({"host_addr": "127.0.0.1", "name": "fleet-edge-0", "traffic_type": "edge", "port": 31000}),
        )
        .await;

    let (status, body) = server.get(&client, "/backends").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("fleet-http-0"));

    let (status, _) = server.get(&client, "/__ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    // The edge scope is complete and can be served.
    let (status, body) = server.get(&client, "/backends/edge").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "127.0.0.1 fleet-edge-0 31000 edge\n");
}

#[tokio::test]
async fn test_text_listing_after_ready() {
    let server = TestServer::start(3).await;
    let client = Client::new();
    server.register_all(&client).await;

    let (status, body) = server.get(&client, "/backends").await;
    assert_eq!(status, StatusCode::OK);

    let lines: Vec<BoundBackend> = body.lines().map(|l| l.parse().unwrap()).collect();
    assert_eq!(lines.len(), 12);

    let names: HashSet<_> = lines.iter().map(|b| b.name.clone()).collect();
    assert_eq!(names.len(), 12);
    assert!(lines.iter().all(|b| b.port > 0 && b.host_addr == "127.0.0.1"));

    // Types come out in enumeration order.
    let types: Vec<_> = lines.iter().map(|b| b.traffic_type).collect();
    let mut sorted = types.clone();
    sorted.sort();
    assert_eq!(types, sorted);
}

#[tokio::test]
async fn test_http_listing_only_http_in_topology_order() {
    let server = TestServer::start(3).await;
    let client = Client::new();
    server.register_all(&client).await;

    let (status, body) = server.get(&client, "/backends/http").await;
    assert_eq!(status, StatusCode::OK);

    let lines: Vec<BoundBackend> = body.lines().map(|l| l.parse().unwrap()).collect();
    let names: Vec<_> = lines.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["fleet-http-0", "fleet-http-1", "fleet-http-2"]);
    assert!(lines.iter().all(|b| b.traffic_type == TrafficType::Http));
}

#[tokio::test]
async fn test_every_type_route_exists() {
    let server = TestServer::start(1).await;
    let client = Client::new();
    server.register_all(&client).await;

    for t in TrafficType::ALL {
        let (status, body) = server.get(&client, &format!("/backends/{}", t)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.lines().count(), 1);
    }

    let (status, _) = server.get(&client, "/backends/grpc").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_json_listing_four_by_two() {
    let server = TestServer::start(2).await;
    let client = Client::new();
    server.register_all(&client).await;

    assert!(server.state.barrier().is_released());

    let res = client.get(server.url("/backends?json")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "application/json");

    let doc: serde_json::Value = res.json().await.unwrap();
    let object = doc.as_object().unwrap();
    assert_eq!(object.len(), 4);
    for t in TrafficType::ALL {
        let list = doc[t.as_str()].as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["name"], format!("fleet-{}-0", t));
        assert_eq!(list[1]["name"], format!("fleet-{}-1", t));
        assert!(list.iter().all(|b| b["port"].as_u64().unwrap() > 0));
    }
}

// ============================================================================
// Barrier
// ============================================================================

#[tokio::test]
async fn test_barrier_releases_once_with_excess_registrations() {
    let server = TestServer::start(1).await;
    let client = Client::new();
    server.register_all(&client).await;

    assert!(server.state.barrier().is_released());
    tokio::time::timeout(Duration::from_secs(1), server.state.barrier().wait())
        .await
        .expect("barrier should be released");

    // Re-registering after release is accepted and does not block or recount.
    let status = tokio::time::timeout(
        Duration::from_secs(5),
        server.register(
            &client,
            json!({"host_addr": "127.0.0.1", "name": "fleet-edge-0", "traffic_type": "edge", "port": 32000}),
        ),
    )
    .await
    .expect("late registration must not block");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(server.state.barrier().count(), 4);
    assert_eq!(server.state.registry().port("fleet-edge-0"), Some(32000));

    let (status, body) = server.get(&client, "/__ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ready\n");
}

#[tokio::test]
async fn test_repeat_registrations_keep_barrier_closed() {
    let server = TestServer::start(1).await;
    let client = Client::new();

    // One backend registering as many times as the fleet is large.
    for port in 32000..32004 {
        let status = server
            .register(
                &client,
                json!({"host_addr": "127.0.0.1", "name": "fleet-edge-0", "traffic_type": "edge", "port": port}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(server.state.registry().port("fleet-edge-0"), Some(32003));
    assert_eq!(server.state.barrier().count(), 1);
    assert!(!server.state.barrier().is_released());

    let (status, body) = server.get(&client, "/__ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, "waiting for 1/4 backends\n");

    let (status, _) = server.get(&client, "/backends").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    // The remaining backends still open it.
    server.register_all(&client).await;
    assert!(server.state.barrier().is_released());
    let (status, body) = server.get(&client, "/backends").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.lines().count(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_lose_nothing() {
    let server = Arc::new(TestServer::start(16).await);
    let client = Client::new();

    let handles: Vec<_> = server
        .backends()
        .into_iter()
        .enumerate()
        .map(|(i, backend)| {
            let server = server.clone();
            let client = client.clone();
            tokio::spawn(async move {
                let bound = backend.bind(40000 + i as u16);
                server.register(&client, serde_json::to_value(&bound).unwrap()).await
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    assert_eq!(server.state.registry().len(), 64);
    assert_eq!(server.state.barrier().count(), 64);
    assert!(server.state.barrier().is_released());

    let (status, body) = server.get(&client, "/backends").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.lines().count(), 64);
}

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::start(1).await;
    let client = Client::new();

    let (status, body) = server.get(&client, "/__health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}
