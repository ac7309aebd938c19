#![allow(clippy::unwrap_used)]
// Integration tests for `RestGateway` using wiremock.

use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hublink_api::{
    EntityQuery, Error, MatchMode, RestGateway, RetryPolicy, ServiceCall, Target, TransportConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, RestGateway) {
    let server = MockServer::start().await;
    let gateway = RestGateway::new(
        Url::parse(&server.uri()).unwrap(),
        &SecretString::from("secret-token".to_string()),
        &TransportConfig::default(),
        RetryPolicy::exponential(Duration::from_millis(5), 3),
    )
    .unwrap();
    (server, gateway)
}

fn sample_states() -> serde_json::Value {
    json!([
        {
            "entity_id": "light.kitchen",
            "state": "on",
            "attributes": { "friendly_name": "Kitchen", "brightness": 255 },
            "last_changed": "2026-02-01T10:00:00Z",
            "last_updated": "2026-02-01T10:00:00Z"
        },
        {
            "entity_id": "sensor.outside_temp",
            "state": "3.5",
            "attributes": { "friendly_name": "Outside Temperature" },
            "last_changed": "2026-02-01T09:00:00Z",
            "last_updated": "2026-02-01T10:01:00Z"
        }
    ])
}

// ── Probe ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ping_sends_bearer_token() {
    let (server, gateway) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "API running." })))
        .expect(1)
        .mount(&server)
        .await;

    gateway.ping().await.unwrap();
}

#[tokio::test]
async fn test_ping_rejects_unknown_marker() {
    let (server, gateway) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "maintenance" })))
        .mount(&server)
        .await;

    let result = gateway.ping().await;
    assert!(
        matches!(result, Err(Error::UnexpectedResponse(_))),
        "expected UnexpectedResponse, got: {result:?}"
    );
}

// ── Snapshot ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_states_snapshot() {
    let (server, gateway) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sample_states()))
        .mount(&server)
        .await;

    let states = gateway.states().await.unwrap();
    assert_eq!(states.len(), 2);
    assert_eq!(states[0].id, "light.kitchen");
    assert_eq!(states[0].state, "on");
    assert_eq!(states[1].display_name(), "Outside Temperature");
    assert!(states[1].last_updated > states[1].last_changed);
}

#[tokio::test]
async fn test_single_state_by_query() {
    let (server, gateway) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/states"))
        .and(query_param("entity_id", "light.kitchen"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entity_id": "light.kitchen",
            "state": "off"
        })))
        .mount(&server)
        .await;

    let entity = gateway.state("light.kitchen").await.unwrap().unwrap();
    assert_eq!(entity.state, "off");
}

#[tokio::test]
async fn test_single_state_not_found() {
    let (server, gateway) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Entity not found."))
        .mount(&server)
        .await;

    assert!(gateway.state("light.nowhere").await.unwrap().is_none());
}

#[tokio::test]
async fn test_query_helpers_on_snapshot() {
    let (server, gateway) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sample_states()))
        .mount(&server)
        .await;

    let states = gateway.states().await.unwrap();
    let temps = EntityQuery::default()
        .search("outside", MatchMode::Substring)
        .domain("sensor")
        .filter(&states);
    assert_eq!(temps.len(), 1);
    assert_eq!(temps[0].id, "sensor.outside_temp");
}

// ── Control calls ───────────────────────────────────────────────────

#[tokio::test]
async fn test_call_service_merges_body() {
    let (server, gateway) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/services/light/turn_on"))
        .and(body_json(json!({ "brightness": 80, "entity_id": ["light.kitchen"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let mut call = ServiceCall {
        target: Target::entities(["light.kitchen"]),
        ..ServiceCall::default()
    };
    call.data.insert("brightness".into(), json!(80));

    let result = gateway.call_service("light", "turn_on", &call).await.unwrap();
    assert_eq!(result, json!([]));
}

// ── Error handling ──────────────────────────────────────────────────

#[tokio::test]
async fn test_http_errors_are_not_retried() {
    let (server, gateway) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/services/light/explode"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Service not found."))
        .expect(1)
        .mount(&server)
        .await;

    let result = gateway
        .call_service("light", "explode", &ServiceCall::default())
        .await;

    match result {
        Err(Error::Http { status, body }) => {
            assert_eq!(status, 400);
            assert_eq!(body, "Service not found.");
        }
        other => panic!("expected Http error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_server_errors_are_surfaced_once() {
    let (server, gateway) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let result = gateway.states().await;
    assert!(matches!(result, Err(Error::Http { status: 503, .. })));
}

#[tokio::test]
async fn test_transport_failures_exhaust_retries() {
    // Bind then drop to get a port nobody listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let gateway = RestGateway::with_client(
        reqwest::Client::new(),
        Url::parse(&format!("http://{addr}")).unwrap(),
        RetryPolicy::exponential(Duration::from_millis(1), 3),
    );

    let result = gateway.ping().await;
    assert!(
        matches!(result, Err(Error::Transport(_))),
        "expected Transport error, got: {result:?}"
    );
}
