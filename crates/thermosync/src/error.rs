//! CLI error types with miette diagnostics.
//!
//! Maps config and core errors into user-facing errors with help text.

use std::fmt::Write as _;

use miette::Diagnostic;
use thiserror::Error;

use thermosync_config::ConfigError;
use thermosync_core::{ConfigurationError, CoreError, ErrorKind};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const CONFIG: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const INVALID_DATA: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(thermosync::config),
        help("Point --config (or THERMOSYNC_CONFIG) at a TOML file with a [devices.<name>] table.")
    )]
    Config(#[from] ConfigError),

    #[error("{count} device configuration(s) rejected")]
    #[diagnostic(code(thermosync::invalid_config), help("{details}"))]
    InvalidConfiguration { count: usize, details: String },

    #[error("Cannot build client for '{device_id}': {message}")]
    #[diagnostic(code(thermosync::client))]
    Client { device_id: String, message: String },

    #[error("Device '{name}' is not configured")]
    #[diagnostic(code(thermosync::unknown_device), help("Configured devices: {available}"))]
    UnknownDevice { name: String, available: String },

    // ── Cycles ───────────────────────────────────────────────────────
    #[error("{failed} of {total} device(s) failed to update")]
    #[diagnostic(code(thermosync::poll_failed), help("First failure ({device}): {message}"))]
    PollFailed {
        failed: usize,
        total: usize,
        device: String,
        kind: ErrorKind,
        message: String,
    },

    #[error("{0}")]
    #[diagnostic(code(thermosync::lifecycle))]
    Lifecycle(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Cannot encode output: {0}")]
    #[diagnostic(code(thermosync::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::InvalidConfiguration { .. } | Self::Client { .. } => {
                exit_code::CONFIG
            }
            Self::UnknownDevice { .. } => exit_code::NOT_FOUND,
            Self::PollFailed { kind, .. } => match kind {
                ErrorKind::Connection => exit_code::CONNECTION,
                ErrorKind::Timeout => exit_code::TIMEOUT,
                ErrorKind::Validation => exit_code::INVALID_DATA,
            },
            Self::Io(_) | Self::Json(_) | Self::Lifecycle(_) => exit_code::GENERAL,
        }
    }
}

/// One `device.field: reason` line per rejected field.
fn describe(rejected: &[ConfigurationError]) -> String {
    let mut out = String::new();
    for rejection in rejected {
        for error in rejection.failure.errors() {
            if !out.is_empty() {
                out.push('\n');
            }
            let _ = write!(out, "{}.{}: {}", rejection.device, error.field, error.reason);
        }
    }
    out
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Configuration(rejection) => CliError::InvalidConfiguration {
                count: 1,
                details: describe(std::slice::from_ref(&rejection)),
            },
            CoreError::Configurations(rejected) => CliError::InvalidConfiguration {
                count: rejected.len(),
                details: describe(&rejected),
            },
            CoreError::Client { device_id, message } => CliError::Client { device_id, message },
            CoreError::AlreadyRunning { .. } => CliError::Lifecycle(err.to_string()),
        }
    }
}
