// ── Update coordinator ──
//
// One coordinator per device. It owns the poll loop (a tokio task started
// by `start` and cancelled by `shutdown`), runs every response through the
// payload validator, applies backoff on failure and publishes the result
// to the snapshot store. Cheaply cloneable via `Arc<CoordinatorInner>`.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, PoisonError, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;
use tokio::sync::{Mutex, Notify, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;
use crate::client::DeviceClient;
use crate::config::ConfigEntry;
use crate::error::{ConfigurationError, CoreError, CycleError, ErrorInfo, ErrorKind};
use crate::logging::{Logger, LoggerRegistry};
use crate::model::DeviceSnapshot;
use crate::store::{Published, SnapshotStore, SnapshotStream, Staleness};
use crate::validate::{ValidationFailure, validate_config_entry, validate_device_payload};

const OUTCOME_CHANNEL_SIZE: usize = 64;

/// Consecutive failures after which a device is reported unavailable.
pub const UNAVAILABLE_AFTER_FAILURES: u32 = 5;

// ── Public types ─────────────────────────────────────────────────────

/// Where the poll loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum CycleState {
    Idle,
    Polling,
    Success,
    Failed,
}

/// Record of one poll attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleOutcome {
    pub device_id: String,
    pub started_at: DateTime<Utc>,
    /// `None` on success.
    pub error: Option<ErrorInfo>,
    /// Failure streak after this cycle (0 on success).
    pub consecutive_failures: u32,
    /// Wait before the next scheduled cycle.
    #[serde(serialize_with = "as_secs_f64")]
    pub next_delay: Duration,
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

fn as_secs_f64<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Running counters for one coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorStats {
    pub cycles: u64,
    pub successes: u64,
    pub failures: u64,
    pub connection_failures: u64,
    pub timeouts: u64,
    pub validation_failures: u64,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
}

// ── Coordinator ──────────────────────────────────────────────────────

pub struct Coordinator<C: DeviceClient> {
    inner: Arc<CoordinatorInner<C>>,
}

impl<C: DeviceClient> Clone for Coordinator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct CoordinatorInner<C> {
    device_id: String,
    entry: ArcSwap<ConfigEntry>,
    client: C,
    log: Logger,
    store: SnapshotStore,
    book: std::sync::Mutex<Book>,
    state: watch::Sender<CycleState>,
    outcome_tx: broadcast::Sender<CycleOutcome>,
    /// Held for the duration of a cycle; at most one runs at a time.
    cycle_lock: Mutex<()>,
    refresh: Arc<Notify>,
    /// When the next scheduled cycle is due. Every cycle re-arms it, so the
    /// loop also follows cycles run through `force_update`/`run_cycle`.
    due: watch::Sender<Instant>,
    cancel: CancellationToken,
    /// Child token for the running loop, replaced on each start.
    cancel_child: Mutex<CancellationToken>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct Book {
    backoff: Backoff,
    stats: CoordinatorStats,
    last_fetch: Option<Instant>,
}

impl<C> Drop for CoordinatorInner<C> {
    // The poll task only holds a weak handle; stop it with the last strong one.
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<C: DeviceClient> Coordinator<C> {
    /// Validate `raw` and build a coordinator around `client`.
    ///
    /// Every field failure is logged; the coordinator is not created.
    pub fn new(raw: &Value, client: C, registry: &LoggerRegistry) -> Result<Self, ConfigurationError> {
        match validate_config_entry(raw) {
            Ok(entry) => Ok(Self::from_entry(entry, client, registry)),
            Err(failure) => {
                let device = device_label(raw);
                log_rejection(&registry.get("config"), &device, &failure);
                Err(ConfigurationError { device, failure })
            }
        }
    }

    /// Build from an already validated entry.
    pub fn from_entry(entry: ConfigEntry, client: C, registry: &LoggerRegistry) -> Self {
        let log = registry
            .get("coordinator")
            .with_context("device_id", &entry.device_id);
        let backoff = Backoff::new(entry.retry).with_seed(seed_for(&entry.device_id));
        let (state, _) = watch::channel(CycleState::Idle);
        let (outcome_tx, _) = broadcast::channel(OUTCOME_CHANNEL_SIZE);
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Self {
            inner: Arc::new(CoordinatorInner {
                device_id: entry.device_id.clone(),
                entry: ArcSwap::from_pointee(entry),
                client,
                log,
                store: SnapshotStore::new(),
                book: std::sync::Mutex::new(Book {
                    backoff,
                    stats: CoordinatorStats::default(),
                    last_fetch: None,
                }),
                state,
                outcome_tx,
                cycle_lock: Mutex::new(()),
                refresh: Arc::new(Notify::new()),
                due: watch::channel(Instant::now()).0,
                cancel,
                cancel_child: Mutex::new(cancel_child),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.inner.device_id
    }

    /// The configuration currently in force.
    pub fn entry(&self) -> Arc<ConfigEntry> {
        self.inner.entry.load_full()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Spawn the poll loop. The first cycle runs immediately.
    ///
    /// The loop stops on [`shutdown`](Self::shutdown) or once every handle
    /// to this coordinator has been dropped.
    pub async fn start(&self) -> Result<(), CoreError> {
        let mut task = self.inner.task.lock().await;
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(CoreError::AlreadyRunning {
                device_id: self.inner.device_id.clone(),
            });
        }

        let child = self.inner.cancel.child_token();
        *self.inner.cancel_child.lock().await = child.clone();
        *task = Some(tokio::spawn(poll_task(
            Arc::downgrade(&self.inner),
            child,
            Arc::clone(&self.inner.refresh),
            self.inner.due.subscribe(),
        )));

        let entry = self.inner.entry.load();
        self.inner.log.info(format!(
            "coordinator started, polling {} every {}",
            entry.host,
            humantime::format_duration(entry.scan_interval)
        ));
        Ok(())
    }

    /// Stop the poll loop, aborting any in-flight fetch or wait.
    pub async fn shutdown(&self) {
        self.inner.cancel_child.lock().await.cancel();
        let handle = self.inner.task.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
            self.inner.log.info("coordinator stopped");
        }
        self.set_state(CycleState::Idle);
    }

    /// Wake the loop for an immediate cycle.
    pub fn request_refresh(&self) {
        self.inner.refresh.notify_one();
    }

    /// Run one cycle now, unless one is already in progress.
    pub async fn force_update(&self) -> Option<CycleOutcome> {
        let Ok(_cycle) = self.inner.cycle_lock.try_lock() else {
            self.inner.log.debug("forced update skipped, cycle in progress");
            return None;
        };
        Some(self.cycle().await)
    }

    /// Run one full cycle: fetch, validate, publish or back off.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let _cycle = self.inner.cycle_lock.lock().await;
        self.cycle().await
    }

    /// Validate and swap in a replacement configuration. A rejected entry
    /// leaves the running one untouched.
    pub fn reconfigure(&self, raw: &Value) -> Result<(), ConfigurationError> {
        let reject = |failure: ValidationFailure| {
            log_rejection(&self.inner.log, &self.inner.device_id, &failure);
            ConfigurationError {
                device: self.inner.device_id.clone(),
                failure,
            }
        };

        let entry = validate_config_entry(raw).map_err(reject)?;
        if entry.device_id != self.inner.device_id {
            return Err(reject(ValidationFailure::single(
                "device_id",
                format!("cannot change from '{}' to '{}'", self.inner.device_id, entry.device_id),
            )));
        }

        self.book().backoff.set_policy(entry.retry);
        self.inner.entry.store(Arc::new(entry));
        self.inner.log.info("configuration replaced");
        self.request_refresh();
        Ok(())
    }

    // ── Consumer surface ─────────────────────────────────────────

    /// Last good snapshot plus a staleness marker if later cycles failed.
    pub fn get_snapshot(&self) -> (Option<Arc<DeviceSnapshot>>, Option<Staleness>) {
        self.inner.store.get_snapshot()
    }

    pub fn get_last_error(&self) -> Option<ErrorInfo> {
        self.inner.store.get_last_error()
    }

    /// Snapshot, staleness and last error as one consistent value.
    pub fn published(&self) -> Arc<Published> {
        self.inner.store.load()
    }

    /// Fires once per successful publish.
    pub fn subscribe(&self) -> SnapshotStream {
        self.inner.store.subscribe()
    }

    /// Every cycle outcome, successful or not.
    pub fn outcomes(&self) -> broadcast::Receiver<CycleOutcome> {
        self.inner.outcome_tx.subscribe()
    }

    pub fn state(&self) -> CycleState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<CycleState> {
        self.inner.state.subscribe()
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.book().stats.clone()
    }

    /// Updated within two polling intervals and under the failure limit.
    pub fn is_available(&self) -> bool {
        let window = TimeDelta::from_std(self.inner.entry.load().scan_interval * 2)
            .unwrap_or(TimeDelta::MAX);
        let book = self.book();
        let recent = book
            .stats
            .last_success
            .is_some_and(|at| Utc::now().signed_duration_since(at) <= window);
        recent && book.stats.consecutive_failures < UNAVAILABLE_AFTER_FAILURES
    }

    // ── Cycle internals ──────────────────────────────────────────

    async fn cycle(&self) -> CycleOutcome {
        let entry = self.inner.entry.load_full();
        let started_at = Utc::now();
        let attempt = {
            let mut book = self.book();
            book.stats.cycles += 1;
            book.stats.last_attempt = Some(started_at);
            book.backoff.failures().saturating_add(1)
        };
        let log = self
            .inner
            .log
            .with_fields([("operation", "poll".to_owned()), ("attempt", attempt.to_string())]);

        let last_fetch = self.book().last_fetch;
        if let Some(ready) = last_fetch
            .map(|at| at + entry.min_call_interval)
            .filter(|ready| *ready > Instant::now())
        {
            log.debug(format!(
                "pacing fetch by {}",
                humantime::format_duration(ready - Instant::now())
            ));
            tokio::time::sleep_until(ready).await;
        }
        self.book().last_fetch = Some(Instant::now());

        self.set_state(CycleState::Polling);
        log.debug("polling device");

        let fetch = self.inner.client.fetch(entry.timeout);
        let result = match tokio::time::timeout(entry.timeout, fetch).await {
            Ok(Ok(raw)) => validate_device_payload(&raw, &entry, Utc::now()).map_err(CycleError::Validation),
            Ok(Err(err)) => Err(CycleError::from(err)),
            Err(_) => Err(CycleError::Timeout {
                timeout: entry.timeout,
            }),
        };

        let outcome = match result {
            Ok(snapshot) => self.publish(snapshot, &entry, &log, started_at),
            Err(err) => self.back_off(&err, &log, started_at),
        };
        self.inner.due.send_replace(Instant::now() + outcome.next_delay);
        let _ = self.inner.outcome_tx.send(outcome.clone());
        outcome
    }

    fn publish(
        &self,
        snapshot: DeviceSnapshot,
        entry: &ConfigEntry,
        log: &Logger,
        started_at: DateTime<Utc>,
    ) -> CycleOutcome {
        let snapshot = self.inner.store.publish(snapshot);
        let recovered_after = {
            let mut book = self.book();
            let streak = book.backoff.failures();
            book.backoff.reset();
            book.stats.successes += 1;
            book.stats.consecutive_failures = 0;
            book.stats.last_success = Some(Utc::now());
            streak
        };
        self.set_state(CycleState::Success);

        for reading in &snapshot.readings {
            log.with_context("zone", reading.zone)
                .debug(format!("temperature {} {}", reading.temperature, entry.unit));
        }
        let log = log.with_context("zones", snapshot.readings.len());
        if recovered_after > 0 {
            log.info(format!("device state published, recovered after {recovered_after} failure(s)"));
        } else {
            log.info("device state published");
        }
        self.set_state(CycleState::Idle);

        CycleOutcome {
            device_id: self.inner.device_id.clone(),
            started_at,
            error: None,
            consecutive_failures: 0,
            next_delay: entry.scan_interval,
        }
    }

    fn back_off(&self, err: &CycleError, log: &Logger, started_at: DateTime<Utc>) -> CycleOutcome {
        let (delay, failures) = {
            let mut book = self.book();
            let mut delay = book.backoff.record_failure();
            if let Some(retry_after) = err.retry_after() {
                delay = book.backoff.defer(retry_after);
            }
            let failures = book.backoff.failures();
            let stats = &mut book.stats;
            stats.failures += 1;
            stats.consecutive_failures = failures;
            match err.kind() {
                ErrorKind::Connection => stats.connection_failures += 1,
                ErrorKind::Timeout => stats.timeouts += 1,
                ErrorKind::Validation => stats.validation_failures += 1,
            }
            (delay, failures)
        };

        let info = ErrorInfo::from_cycle(err, Utc::now(), failures);
        self.inner.store.record_failure(info.clone());
        self.set_state(CycleState::Failed);

        let retry_in = humantime::format_duration(delay);
        match err {
            CycleError::Validation(failure) => log
                .with_fields([("field", failure.field()), ("reason", failure.reason())])
                .warning(format!("payload rejected, retrying in {retry_in}")),
            _ => log
                .with_context("error", err)
                .warning(format!("poll failed, retrying in {retry_in}")),
        }
        if failures == UNAVAILABLE_AFTER_FAILURES {
            log.error(format!("device unavailable after {failures} consecutive failures"));
        }

        CycleOutcome {
            device_id: self.inner.device_id.clone(),
            started_at,
            error: Some(info),
            consecutive_failures: failures,
            next_delay: delay,
        }
    }

    fn set_state(&self, state: CycleState) {
        self.inner.state.send_replace(state);
    }

    fn book(&self) -> std::sync::MutexGuard<'_, Book> {
        self.inner.book.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Background task ──────────────────────────────────────────────────

/// Poll until cancelled: cycle, then wait until the cycle is due again or
/// a refresh is requested. Only a weak handle is kept between cycles.
/// Cancellation wins over every other branch.
async fn poll_task<C: DeviceClient>(
    inner: Weak<CoordinatorInner<C>>,
    cancel: CancellationToken,
    refresh: Arc<Notify>,
    mut due: watch::Receiver<Instant>,
) {
    loop {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let coordinator = Coordinator { inner };
        coordinator.set_state(CycleState::Idle);
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = coordinator.run_cycle() => {}
        }
        let log = coordinator.inner.log.clone();
        drop(coordinator);

        loop {
            let deadline = *due.borrow_and_update();
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = refresh.notified() => {
                    log.debug("refresh requested");
                    break;
                }
                Ok(()) = due.changed() => {}
                () = tokio::time::sleep_until(deadline) => break,
            }
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn device_label(raw: &Value) -> String {
    raw.get("device_id")
        .and_then(Value::as_str)
        .map_or_else(|| "<unnamed>".to_owned(), str::to_owned)
}

fn log_rejection(log: &Logger, device: &str, failure: &ValidationFailure) {
    let log = log.with_context("device_id", device);
    for error in failure.errors() {
        log.with_context("field", &error.field)
            .error(format!("invalid configuration: {}", error.reason));
    }
}

fn seed_for(device_id: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    device_id.hash(&mut hasher);
    hasher.finish()
}
