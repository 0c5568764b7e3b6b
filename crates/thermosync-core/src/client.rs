// ── Device client seam ──
//
// The coordinator only needs "fetch raw state within this timeout". Real
// deployments use `thermosync_api::HttpDeviceClient`; tests script their
// own implementations.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thermosync_api::{Credentials, HttpDeviceClient, TlsMode, TransportConfig};

use crate::config::ConfigEntry;
use crate::error::{CoreError, TransportError};

/// Undecoded device response.
pub type RawPayload = serde_json::Value;

/// Performs the network call for one device.
pub trait DeviceClient: Send + Sync + 'static {
    fn fetch(
        &self,
        timeout: Duration,
    ) -> impl Future<Output = Result<RawPayload, TransportError>> + Send;
}

impl DeviceClient for HttpDeviceClient {
    async fn fetch(&self, timeout: Duration) -> Result<RawPayload, TransportError> {
        Ok(self.fetch_json(timeout).await?)
    }
}

impl<C: DeviceClient> DeviceClient for Arc<C> {
    fn fetch(
        &self,
        timeout: Duration,
    ) -> impl Future<Output = Result<RawPayload, TransportError>> + Send {
        (**self).fetch(timeout)
    }
}

/// Build the HTTP client for a validated entry.
pub fn http_client_for(entry: &ConfigEntry) -> Result<HttpDeviceClient, CoreError> {
    let tls = if entry.insecure {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref path) = entry.ca_cert {
        TlsMode::CustomCa(path.clone())
    } else {
        TlsMode::System
    };
    let transport = TransportConfig {
        tls,
        timeout: entry.timeout,
        user_agent: entry.user_agent.clone(),
    };
    let credentials = Credentials {
        username: entry.username.clone(),
        password: entry.password.clone(),
    };
    HttpDeviceClient::new(entry.host.clone(), Some(credentials), &transport).map_err(|e| {
        CoreError::Client {
            device_id: entry.device_id.clone(),
            message: e.to_string(),
        }
    })
}
