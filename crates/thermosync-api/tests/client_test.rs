// Integration tests for `HttpDeviceClient` using wiremock.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use thermosync_api::{Credentials, Error, HttpDeviceClient};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, HttpDeviceClient) {
    let server = MockServer::start().await;
    let client = HttpDeviceClient::with_client(
        reqwest::Client::new(),
        &format!("{}/api/v1/state", server.uri()),
    )
    .unwrap();
    (server, client)
}

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

// ── Happy path ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_returns_raw_json() {
    let (server, client) = setup().await;

    let body = json!({ "zone": 1, "temperature": 21.5, "firmware": "2.4.1" });
    Mock::given(method("GET"))
        .and(path("/api/v1/state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let value = client.fetch_json(FETCH_TIMEOUT).await.unwrap();
    assert_eq!(value, body);
}

#[tokio::test]
async fn test_fetch_sends_basic_auth() {
    let (server, client) = setup().await;
    let client = client.with_credentials(Credentials {
        username: "owner@example.com".into(),
        password: SecretString::from("hunter22".to_string()),
    });

    Mock::given(method("GET"))
        .and(path("/api/v1/state"))
        .and(header(
            "authorization",
            "Basic b3duZXJAZXhhbXBsZS5jb206aHVudGVyMjI=",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let value = client.fetch_json(FETCH_TIMEOUT).await.unwrap();
    assert_eq!(value, json!([]));
}

// ── Error paths ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_server_error_maps_to_status() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/state"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = client.fetch_json(FETCH_TIMEOUT).await.unwrap_err();
    match err {
        Error::Status { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rate_limit_reads_retry_after() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/state"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "17"))
        .mount(&server)
        .await;

    let err = client.fetch_json(FETCH_TIMEOUT).await.unwrap_err();
    assert!(
        matches!(err, Error::RateLimited { retry_after_secs: 17 }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn test_malformed_body_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/state"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client.fetch_json(FETCH_TIMEOUT).await.unwrap_err();
    match err {
        Error::Deserialization { body, .. } => assert_eq!(body, "<html>oops</html>"),
        other => panic!("expected Deserialization, got {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/state"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "zone": 1 }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = client
        .fetch_json(Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {err:?}");
    assert!(matches!(err, Error::Timeout { .. }));
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    // Nothing listens on port 1 of the loopback interface.
    let client =
        HttpDeviceClient::with_client(reqwest::Client::new(), "http://127.0.0.1:1/state").unwrap();

    let err = client.fetch_json(FETCH_TIMEOUT).await.unwrap_err();
    assert!(err.is_connect(), "expected connect error, got {err:?}");
}
