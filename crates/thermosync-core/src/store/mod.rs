// ── Snapshot store ──
//
// Holds the single published composite (snapshot + staleness + last error)
// behind an `ArcSwap`, so readers always load one consistent value without
// blocking the poll loop. A `watch` channel fires once per successful
// publish for subscribers.

mod stream;

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::error::ErrorInfo;
use crate::model::DeviceSnapshot;

pub use stream::{SnapshotStream, SnapshotWatchStream};

/// Marks a snapshot as outdated: the most recent cycle(s) failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Staleness {
    /// First failure after the last successful publish.
    pub since: DateTime<Utc>,
}

/// What readers see. Replaced as a whole, never mutated.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Published {
    pub snapshot: Option<Arc<DeviceSnapshot>>,
    pub stale: Option<Staleness>,
    pub last_error: Option<ErrorInfo>,
}

pub struct SnapshotStore {
    current: ArcSwap<Published>,
    updates: watch::Sender<Option<Arc<DeviceSnapshot>>>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (updates, _) = watch::channel(None);
        Self {
            current: ArcSwap::from_pointee(Published::default()),
            updates,
        }
    }

    /// The whole composite, loaded atomically.
    pub fn load(&self) -> Arc<Published> {
        self.current.load_full()
    }

    /// Last good snapshot plus a staleness marker if later cycles failed.
    pub fn get_snapshot(&self) -> (Option<Arc<DeviceSnapshot>>, Option<Staleness>) {
        let published = self.current.load();
        (published.snapshot.clone(), published.stale)
    }

    pub fn get_last_error(&self) -> Option<ErrorInfo> {
        self.current.load().last_error.clone()
    }

    /// Subscribe to successful publishes.
    pub fn subscribe(&self) -> SnapshotStream {
        SnapshotStream::new(self.updates.subscribe())
    }

    /// Replace the snapshot and clear staleness and last error.
    pub(crate) fn publish(&self, snapshot: DeviceSnapshot) -> Arc<DeviceSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.current.store(Arc::new(Published {
            snapshot: Some(Arc::clone(&snapshot)),
            stale: None,
            last_error: None,
        }));
        self.updates.send_replace(Some(Arc::clone(&snapshot)));
        snapshot
    }

    /// Keep the snapshot, mark it stale (from the first failure on) and
    /// record `error`.
    pub(crate) fn record_failure(&self, error: ErrorInfo) {
        let at = error.at;
        self.current.rcu(|prev| Published {
            snapshot: prev.snapshot.clone(),
            stale: prev.stale.or(Some(Staleness { since: at })),
            last_error: Some(error.clone()),
        });
    }
}
