// ── Validated device configuration ──
//
// A `ConfigEntry` only exists once the raw device table has passed
// `validate_config_entry`. It is never mutated: reconfiguration swaps in a
// whole new entry.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::Serialize;
use strum::{Display, EnumString, IntoStaticStr, VariantNames};
use url::Url;

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(180);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRY_BASE: Duration = Duration::from_secs(1);
pub const DEFAULT_RETRY_MAX: Duration = Duration::from_secs(60);
pub const DEFAULT_MIN_CALL_INTERVAL: Duration = Duration::from_secs(1);

/// Display unit for temperatures. Readings are always stored as reported.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Display,
    EnumString,
    IntoStaticStr,
    VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

/// Retry timing for failed cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Spread retries of many devices apart. Never exceeds `max_delay`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_RETRY_BASE,
            max_delay: DEFAULT_RETRY_MAX,
            jitter: false,
        }
    }
}

/// Connection parameters for one device.
#[derive(Debug, Clone)]
pub struct ConfigEntry {
    pub device_id: String,
    /// Friendly name, defaults to `device_id`.
    pub name: String,
    /// Device state endpoint.
    pub host: Url,
    pub username: String,
    pub password: SecretString,
    /// Delay between successful cycles.
    pub scan_interval: Duration,
    /// Zones this device may report. Empty accepts any zone.
    pub zones: Vec<u8>,
    pub target_temperature: Option<f64>,
    pub unit: TemperatureUnit,
    pub user_agent: Option<String>,
    /// Upper bound on one device fetch.
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Floor between the starts of two fetches, whatever triggered them.
    pub min_call_interval: Duration,
    /// Accept self-signed device certificates.
    pub insecure: bool,
    /// PEM bundle trusted for the device endpoint. Ignored when `insecure`.
    pub ca_cert: Option<PathBuf>,
}

impl ConfigEntry {
    pub fn accepts_zone(&self, zone: u8) -> bool {
        self.zones.is_empty() || self.zones.contains(&zone)
    }
}
