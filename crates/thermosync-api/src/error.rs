use std::time::Duration;

use thiserror::Error;

/// Top-level error type for the `thermosync-api` crate.
///
/// Covers every failure mode of a single device fetch: transport, TLS,
/// HTTP status, and payload decoding. `thermosync-core` folds these into
/// its connection/timeout taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request did not complete within the allotted time.
    #[error("Request timed out after {}ms", timeout.as_millis())]
    Timeout { timeout: Duration },

    /// TLS handshake, certificate, or client-construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── HTTP ────────────────────────────────────────────────────────
    /// Rate limited by the device API. Includes retry-after in seconds.
    #[error("Rate limited -- retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Non-success status from the device API.
    #[error("Device API returned HTTP {status}")]
    Status { status: u16, body: String },

    // ── Data ────────────────────────────────────────────────────────
    /// The response body was not valid JSON, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Whether this error is a timeout, at either our layer or reqwest's.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Whether the failure happened before a response was received.
    pub fn is_connect(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_connect(),
            Self::Tls(_) => true,
            _ => false,
        }
    }
}
