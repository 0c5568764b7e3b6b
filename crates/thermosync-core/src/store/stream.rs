// Subscription handles for published snapshots.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::DeviceSnapshot;

type Slot = Option<Arc<DeviceSnapshot>>;

/// A subscription to one coordinator's snapshots.
///
/// `changed()` resolves once per successful publish; failed cycles never
/// wake subscribers.
pub struct SnapshotStream {
    current: Slot,
    receiver: watch::Receiver<Slot>,
}

impl SnapshotStream {
    pub(crate) fn new(receiver: watch::Receiver<Slot>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The snapshot captured at subscription time (or at the last `changed`).
    pub fn current(&self) -> Option<&Arc<DeviceSnapshot>> {
        self.current.as_ref()
    }

    pub fn latest(&self) -> Slot {
        self.receiver.borrow().clone()
    }

    /// Whether a publish happened since the last `changed`.
    pub fn has_changed(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }

    /// Wait for the next publish. `None` once the coordinator is gone.
    pub async fn changed(&mut self) -> Option<Arc<DeviceSnapshot>> {
        self.receiver.changed().await.ok()?;
        let snapshot = self.receiver.borrow_and_update().clone();
        self.current.clone_from(&snapshot);
        snapshot
    }

    /// Convert into a `Stream` yielding each new snapshot.
    pub fn into_stream(self) -> SnapshotWatchStream {
        SnapshotWatchStream {
            inner: WatchStream::from_changes(self.receiver),
        }
    }
}

/// `Stream` adapter over a [`SnapshotStream`].
pub struct SnapshotWatchStream {
    inner: WatchStream<Slot>,
}

impl Stream for SnapshotWatchStream {
    type Item = Arc<DeviceSnapshot>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Some(snapshot))) => return Poll::Ready(Some(snapshot)),
                Poll::Ready(Some(None)) => {}
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use futures_util::StreamExt;

    use super::super::SnapshotStore;
    use super::*;
    use crate::error::{ErrorInfo, ErrorKind};

    fn snapshot() -> DeviceSnapshot {
        DeviceSnapshot {
            device_id: "boiler".into(),
            readings: Vec::new(),
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn changed_fires_per_publish_only() {
        let store = SnapshotStore::new();
        let mut sub = store.subscribe();
        assert!(sub.current().is_none());

        store.record_failure(ErrorInfo {
            kind: ErrorKind::Connection,
            message: "refused".into(),
            field: None,
            at: Utc::now(),
            attempt: 1,
        });
        store.publish(snapshot());

        let got = sub.changed().await.unwrap();
        assert_eq!(got.device_id, "boiler");
        assert!(sub.current().is_some());
        assert!(!sub.has_changed());
    }

    #[tokio::test]
    async fn stream_yields_new_snapshots() {
        let store = SnapshotStore::new();
        let mut stream = store.subscribe().into_stream();

        store.publish(snapshot());
        let first = stream.next().await.unwrap();
        assert_eq!(first.device_id, "boiler");

        drop(store);
        assert!(stream.next().await.is_none());
    }
}
