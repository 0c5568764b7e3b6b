// End-to-end cycles against a mock device over HTTP.
#![allow(clippy::unwrap_used)]

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use thermosync_core::validate::validate_config_entry;
use thermosync_core::{Coordinator, ErrorKind, LoggerRegistry, http_client_for};

async fn coordinator_for(server: &MockServer) -> Coordinator<thermosync_api::HttpDeviceClient> {
    let raw = json!({
        "device_id": "boiler",
        "host": format!("{}/api/v1/state", server.uri()),
        "username": "owner@example.com",
        "password": "hunter22",
        "zones": [1, 2],
        "timeout": 2,
    });
    let entry = validate_config_entry(&raw).unwrap();
    let client = http_client_for(&entry).unwrap();
    Coordinator::from_entry(entry, client, &LoggerRegistry::new())
}

#[tokio::test]
async fn http_payload_is_validated_and_published() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "zone": 1, "temperature": "20.5", "mode": "heating" },
            { "zone": 2, "temperature": 18.0, "heating_active": false },
        ])))
        .mount(&server)
        .await;

    let coordinator = coordinator_for(&server).await;
    let outcome = coordinator.run_cycle().await;
    assert!(outcome.is_success(), "{outcome:?}");

    let (snapshot, stale) = coordinator.get_snapshot();
    let snapshot = snapshot.unwrap();
    assert!(stale.is_none());
    assert_eq!(snapshot.readings.len(), 2);
    assert!((snapshot.zone(1).unwrap().temperature - 20.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn http_errors_map_to_connection_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/state"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let coordinator = coordinator_for(&server).await;
    let outcome = coordinator.run_cycle().await;
    let error = outcome.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Connection);
    assert!(error.message.contains("503"), "{}", error.message);
}

#[tokio::test]
async fn non_json_body_counts_as_connection_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/state"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let coordinator = coordinator_for(&server).await;
    let error = coordinator.run_cycle().await.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Connection);
    assert!(error.message.contains("malformed response"));
}

#[tokio::test]
async fn retry_after_header_sets_the_next_delay() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/state"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "45"))
        .mount(&server)
        .await;

    let coordinator = coordinator_for(&server).await;
    let outcome = coordinator.run_cycle().await;
    assert_eq!(outcome.error.unwrap().kind, ErrorKind::Connection);
    assert_eq!(outcome.next_delay, std::time::Duration::from_secs(45));
}
