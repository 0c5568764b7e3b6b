// Device state HTTP client
//
// Wraps `reqwest::Client` with per-fetch timeouts, basic auth and the
// status/body handling every poll needs. The client knows nothing about
// the payload shape: it hands raw JSON back to the caller.

use std::time::Duration;

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Longest body excerpt carried inside an error.
const BODY_EXCERPT_LEN: usize = 512;

/// Username/password pair sent as HTTP basic auth on every fetch.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// Raw HTTP client for a device state endpoint.
///
/// One instance per device. Cheap to clone: the inner `reqwest::Client`
/// is reference-counted.
#[derive(Debug, Clone)]
pub struct HttpDeviceClient {
    http: reqwest::Client,
    endpoint: Url,
    credentials: Option<Credentials>,
}

impl HttpDeviceClient {
    /// Create a client for `endpoint` from a `TransportConfig`.
    pub fn new(
        endpoint: Url,
        credentials: Option<Credentials>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            endpoint,
            credentials,
        })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, endpoint: &str) -> Result<Self, Error> {
        Ok(Self {
            http,
            endpoint: Url::parse(endpoint)?,
            credentials: None,
        })
    }

    /// Attach basic-auth credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Fetch the device state document, bounded by `timeout`.
    ///
    /// Returns the decoded JSON body. Non-2xx statuses, undecodable bodies
    /// and timeouts all surface as [`Error`] variants.
    pub async fn fetch_json(&self, timeout: Duration) -> Result<serde_json::Value, Error> {
        debug!(url = %self.endpoint, timeout_ms = timeout.as_millis(), "fetching device state");

        let mut request = self.http.get(self.endpoint.clone()).timeout(timeout);
        if let Some(ref creds) = self.credentials {
            request = request.basic_auth(&creds.username, Some(creds.password.expose_secret()));
        }

        let response = request.send().await.map_err(|e| map_send_error(e, timeout))?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(60);
            return Err(Error::RateLimited { retry_after_secs });
        }

        let body = response.text().await.map_err(|e| map_send_error(e, timeout))?;

        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        trace!(bytes = body.len(), "device state received");

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: excerpt(&body),
        })
    }
}

fn map_send_error(err: reqwest::Error, timeout: Duration) -> Error {
    if err.is_timeout() {
        Error::Timeout { timeout }
    } else {
        Error::Transport(err)
    }
}

fn excerpt(body: &str) -> String {
    match body.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_owned(),
    }
}
