// ── Device snapshot model ──

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{Display, EnumString, IntoStaticStr, VariantNames};

/// Operating mode reported for a zone.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString, IntoStaticStr, VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ZoneMode {
    Off,
    Heating,
    Cooling,
    Auto,
}

/// One validated zone reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneReading {
    pub zone: u8,
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ZoneMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heating_active: Option<bool>,
}

/// The latest fully validated state of one device.
///
/// Immutable once built; the coordinator replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub device_id: String,
    pub readings: Vec<ZoneReading>,
    pub fetched_at: DateTime<Utc>,
}

impl DeviceSnapshot {
    pub fn zone(&self, zone: u8) -> Option<&ZoneReading> {
        self.readings.iter().find(|r| r.zone == zone)
    }
}
