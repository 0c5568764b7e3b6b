// thermosync-core: update coordination engine between thermosync-api and consumers.

pub mod backoff;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod group;
pub mod logging;
pub mod model;
pub mod store;
pub mod validate;

// ── Primary re-exports ──────────────────────────────────────────────
pub use backoff::Backoff;
pub use client::{DeviceClient, RawPayload, http_client_for};
pub use config::{ConfigEntry, RetryPolicy, TemperatureUnit};
pub use coordinator::{Coordinator, CoordinatorStats, CycleOutcome, CycleState};
pub use error::{
    ConfigurationError, CoreError, CycleError, ErrorInfo, ErrorKind, LoggingError, TransportError,
};
pub use group::CoordinatorGroup;
pub use logging::{LogGuard, Logger, LoggerRegistry, LoggingConfig, Severity};
pub use model::{DeviceSnapshot, ZoneMode, ZoneReading};
pub use store::{Published, SnapshotStream, Staleness};
pub use validate::{
    FieldError, ServiceCall, ValidationFailure, device_name_or, scan_interval_or, temperature_or,
    validate_service_call, zone_or,
};
