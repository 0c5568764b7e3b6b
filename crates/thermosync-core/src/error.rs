// ── Core error types ──
//
// The engine distinguishes three cycle failure kinds (connection, timeout,
// validation) and keeps setup failures (bad configuration, duplicate
// start) in `CoreError`. Transport errors from `thermosync-api` never
// reach consumers raw: `From<thermosync_api::Error>` folds them into
// `TransportError` first.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::validate::ValidationFailure;

/// Setup-time error for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Configuration errors ─────────────────────────────────────────
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("{} device configuration(s) rejected", .0.len())]
    Configurations(Vec<ConfigurationError>),

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Coordinator for '{device_id}' is already running")]
    AlreadyRunning { device_id: String },

    #[error("Cannot build device client for '{device_id}': {message}")]
    Client { device_id: String, message: String },
}

/// A device configuration entry failed validation. The coordinator for
/// that device is never created.
#[derive(Debug, Clone, Error)]
#[error("Invalid configuration for '{device}': {failure}")]
pub struct ConfigurationError {
    pub device: String,
    pub failure: ValidationFailure,
}

// ── Transport ────────────────────────────────────────────────────────

/// Failure reported by a [`DeviceClient`](crate::client::DeviceClient).
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection failed: {reason}")]
    Connection { reason: String },

    #[error("request timed out after {}ms", timeout.as_millis())]
    Timeout { timeout: Duration },

    /// The device answered, but not with a JSON document.
    #[error("malformed response: {reason}")]
    Malformed { reason: String },

    /// The device asked us to back off for at least `retry_after`.
    #[error("rate limited, retry after {}", humantime::format_duration(*retry_after))]
    RateLimited { retry_after: Duration },
}

impl From<thermosync_api::Error> for TransportError {
    fn from(err: thermosync_api::Error) -> Self {
        match err {
            thermosync_api::Error::Timeout { timeout } => TransportError::Timeout { timeout },
            thermosync_api::Error::Transport(ref e) if e.is_timeout() => TransportError::Timeout {
                timeout: Duration::ZERO,
            },
            thermosync_api::Error::Transport(e) => TransportError::Connection {
                reason: e.to_string(),
            },
            thermosync_api::Error::InvalidUrl(e) => TransportError::Connection {
                reason: format!("invalid endpoint: {e}"),
            },
            thermosync_api::Error::Tls(message) => TransportError::Connection { reason: message },
            thermosync_api::Error::RateLimited { retry_after_secs } => TransportError::RateLimited {
                retry_after: Duration::from_secs(retry_after_secs),
            },
            thermosync_api::Error::Status { status, .. } => TransportError::Connection {
                reason: format!("device returned HTTP {status}"),
            },
            thermosync_api::Error::Deserialization { message, .. } => {
                TransportError::Malformed { reason: message }
            }
        }
    }
}

// ── Cycle ────────────────────────────────────────────────────────────

/// Why a single poll cycle failed.
#[derive(Debug, Clone, Error)]
pub enum CycleError {
    #[error("connection error: {reason}")]
    Connection { reason: String },

    /// Counted as a connection failure; the next attempt waits at least
    /// `retry_after`.
    #[error("connection error: rate limited, retry after {}", humantime::format_duration(*retry_after))]
    RateLimited { retry_after: Duration },

    #[error("timed out after {}", humantime::format_duration(*timeout))]
    Timeout { timeout: Duration },

    #[error("validation error: {0}")]
    Validation(ValidationFailure),
}

impl CycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } | Self::RateLimited { .. } => ErrorKind::Connection,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Validation(_) => ErrorKind::Validation,
        }
    }

    /// Minimum wait the device asked for, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// The first offending field, for validation failures.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation(failure) => Some(failure.field()),
            _ => None,
        }
    }
}

impl From<TransportError> for CycleError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout { timeout } => Self::Timeout { timeout },
            TransportError::Connection { reason } => Self::Connection { reason },
            TransportError::Malformed { reason } => Self::Connection {
                reason: format!("malformed response: {reason}"),
            },
            TransportError::RateLimited { retry_after } => Self::RateLimited { retry_after },
        }
    }
}

/// Failure category published alongside the snapshot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    Timeout,
    Validation,
}

/// The most recent cycle failure, as readers see it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    /// Offending field for validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub at: DateTime<Utc>,
    /// Consecutive failures including this one.
    pub attempt: u32,
}

impl ErrorInfo {
    pub fn from_cycle(err: &CycleError, at: DateTime<Utc>, attempt: u32) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            field: err.field().map(str::to_owned),
            at,
            attempt,
        }
    }
}

// ── Logging ──────────────────────────────────────────────────────────

/// Sink failures. These never escape the logging layer: the writer
/// reports them on stderr and keeps going.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("cannot open log file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot rotate log file {}: {source}", path.display())]
    Rotate {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot write log file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}
