// CoordinatorGroup construction and lifecycle.
#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;

use serde_json::json;

use common::{ScriptedClient, device, reading};
use thermosync_core::{CoordinatorGroup, CoreError, LoggerRegistry};

fn named(name: &str, device_id: &str) -> (String, serde_json::Value) {
    let mut raw = device(30);
    raw["device_id"] = json!(device_id);
    (name.to_owned(), raw)
}

#[tokio::test(start_paused = true)]
async fn builds_starts_and_stops_every_device() {
    let registry = LoggerRegistry::new();
    let group = CoordinatorGroup::build(
        [named("upstairs", "boiler_up"), named("downstairs", "boiler_down")],
        &registry,
        |_entry| Ok(Arc::new(ScriptedClient::new([reading(1, 20.0)]))),
    )
    .unwrap();

    assert_eq!(group.len(), 2);
    let names: Vec<&str> = group.iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["upstairs", "downstairs"]);

    let mut outcomes = group.get("downstairs").unwrap().outcomes();
    group.start_all().await.unwrap();
    let outcome = outcomes.recv().await.unwrap();
    assert_eq!(outcome.device_id, "boiler_down");
    assert!(outcome.is_success());

    group.shutdown_all().await;
    // Loggers are shared per name across coordinators.
    assert_eq!(registry.len(), 2);
}

#[test]
fn one_bad_entry_rejects_the_whole_set() {
    let (_, mut broken) = named("attic", "boiler_attic");
    broken["scan_interval"] = json!(5);
    broken["password"] = json!("123");

    let err = CoordinatorGroup::<ScriptedClient>::build(
        [named("upstairs", "boiler_up"), ("attic".to_owned(), broken)],
        &LoggerRegistry::new(),
        |_entry| Ok(ScriptedClient::default()),
    )
    .err()
    .unwrap();

    match err {
        CoreError::Configurations(rejected) => {
            assert_eq!(rejected.len(), 1);
            assert_eq!(rejected[0].device, "attic");
            assert!(rejected[0].failure.mentions("scan_interval"));
            assert!(rejected[0].failure.mentions("password"));
        }
        other => panic!("expected Configurations, got {other:?}"),
    }
}

#[test]
fn duplicate_device_ids_are_rejected() {
    let err = CoordinatorGroup::<ScriptedClient>::build(
        [named("a", "boiler"), named("b", "boiler")],
        &LoggerRegistry::new(),
        |_entry| Ok(ScriptedClient::default()),
    )
    .err()
    .unwrap();

    match err {
        CoreError::Configurations(rejected) => {
            assert_eq!(rejected[0].device, "b");
            assert_eq!(rejected[0].failure.field(), "device_id");
        }
        other => panic!("expected Configurations, got {other:?}"),
    }
}

#[test]
fn client_construction_failure_propagates() {
    let err = CoordinatorGroup::<ScriptedClient>::build(
        [named("a", "boiler")],
        &LoggerRegistry::new(),
        |entry| {
            Err(CoreError::Client {
                device_id: entry.device_id.clone(),
                message: "no TLS roots".into(),
            })
        },
    )
    .err()
    .unwrap();
    assert!(matches!(err, CoreError::Client { ref device_id, .. } if device_id == "boiler"));
}
