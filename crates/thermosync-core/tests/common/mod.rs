// Shared fixtures for coordinator tests.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};

use thermosync_core::{DeviceClient, RawPayload, TransportError};

/// What the scripted client does on one fetch.
#[derive(Debug, Clone)]
pub enum Step {
    /// Never answer; the coordinator's timeout fires.
    Stall,
    Refuse,
    /// Answer 429 with a `Retry-After` of this many seconds.
    RateLimited(u64),
    Payload(Value),
}

/// Plays back a fixed script, then stalls forever.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DeviceClient for ScriptedClient {
    async fn fetch(&self, _timeout: Duration) -> Result<RawPayload, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Stall);
        match step {
            Step::Stall => std::future::pending().await,
            Step::Refuse => Err(TransportError::Connection {
                reason: "connection refused".into(),
            }),
            Step::RateLimited(secs) => Err(TransportError::RateLimited {
                retry_after: Duration::from_secs(secs),
            }),
            Step::Payload(value) => Ok(value),
        }
    }
}

/// A valid device table with the given scan interval (seconds).
pub fn device(scan_interval: u64) -> Value {
    json!({
        "device_id": "boiler",
        "host": "http://boiler.local/api/v1/state",
        "username": "owner@example.com",
        "password": "hunter22",
        "scan_interval": scan_interval,
        "zones": [1, 2],
        "timeout": 5,
    })
}

pub fn reading(zone: u8, temperature: f64) -> Step {
    Step::Payload(json!({ "zone": zone, "temperature": temperature }))
}
