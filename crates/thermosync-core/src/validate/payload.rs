// Device response schema. Fail-fast: the first bad field rejects the whole
// payload and the previous snapshot stays in place.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use serde_json::Value;
use strum::VariantNames;

use super::{FieldSpec, Policy, Record, Rule, Schema, ValidationFailure, validate_at};
use crate::config::ConfigEntry;
use crate::model::{DeviceSnapshot, ZoneMode, ZoneReading};

pub(crate) static READING_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        FieldSpec::required("zone", Rule::Integer { min: 0, max: 10 }),
        FieldSpec::required("temperature", Rule::Float { min: -50.0, max: 100.0 }),
        FieldSpec::optional("target_temperature", Rule::Float { min: -50.0, max: 100.0 }),
        FieldSpec::optional("mode", Rule::OneOf(ZoneMode::VARIANTS)),
        FieldSpec::optional("heating_active", Rule::Bool),
    ])
});

/// Validate a raw device payload into a snapshot for `entry`'s device.
///
/// Accepts a single zone reading object or an array of them.
pub fn validate_device_payload(
    raw: &Value,
    entry: &ConfigEntry,
    fetched_at: DateTime<Utc>,
) -> Result<DeviceSnapshot, ValidationFailure> {
    let readings = match raw {
        Value::Object(_) => vec![reading(raw, entry, "")?],
        Value::Array(items) if items.is_empty() => {
            return Err(ValidationFailure::single("$", "payload contains no readings"));
        }
        Value::Array(items) => {
            let mut readings: Vec<ZoneReading> = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let prefix = format!("[{index}].");
                let parsed = reading(item, entry, &prefix)?;
                if readings.iter().any(|r| r.zone == parsed.zone) {
                    return Err(ValidationFailure::single(
                        format!("{prefix}zone"),
                        format!("duplicate reading for zone {}", parsed.zone),
                    ));
                }
                readings.push(parsed);
            }
            readings
        }
        _ => {
            return Err(ValidationFailure::single(
                "$",
                "expected an object or a list of zone readings",
            ));
        }
    };

    Ok(DeviceSnapshot {
        device_id: entry.device_id.clone(),
        readings,
        fetched_at,
    })
}

fn reading(raw: &Value, entry: &ConfigEntry, prefix: &str) -> Result<ZoneReading, ValidationFailure> {
    let record = validate_at(raw, &READING_SCHEMA, Policy::FailFast, prefix)?;
    let zone = zone(&record, prefix)?;
    if !entry.accepts_zone(zone) {
        return Err(ValidationFailure::single(
            format!("{prefix}zone"),
            format!("zone {zone} is not configured for this device"),
        ));
    }
    let Some(temperature) = record.float("temperature") else {
        return Err(ValidationFailure::single(
            format!("{prefix}temperature"),
            "required field is missing",
        ));
    };

    Ok(ZoneReading {
        zone,
        temperature,
        target_temperature: record.float("target_temperature"),
        mode: record.choice("mode").and_then(|m| m.parse().ok()),
        heating_active: record.boolean("heating_active"),
    })
}

fn zone(record: &Record, prefix: &str) -> Result<u8, ValidationFailure> {
    record
        .integer("zone")
        .and_then(|z| u8::try_from(z).ok())
        .ok_or_else(|| ValidationFailure::single(format!("{prefix}zone"), "required field is missing"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::validate::validate_config_entry;

    fn entry() -> ConfigEntry {
        validate_config_entry(&json!({
            "device_id": "boiler",
            "host": "http://boiler.local/state",
            "username": "owner@example.com",
            "password": "hunter22",
            "zones": [1, 2],
        }))
        .unwrap()
    }

    #[test]
    fn single_reading_is_accepted() {
        let now = Utc::now();
        let snapshot =
            validate_device_payload(&json!({ "zone": 1, "temperature": 21.5 }), &entry(), now)
                .unwrap();
        assert_eq!(snapshot.device_id, "boiler");
        assert_eq!(snapshot.fetched_at, now);
        assert_eq!(
            snapshot.readings,
            vec![ZoneReading {
                zone: 1,
                temperature: 21.5,
                target_temperature: None,
                mode: None,
                heating_active: None,
            }]
        );
    }

    #[test]
    fn array_payload_with_optional_fields() {
        let raw = json!([
            { "zone": 1, "temperature": "20.0", "mode": "Heating", "heating_active": true },
            { "zone": 2, "temperature": 18, "target_temperature": 19.5, "mode": "off" },
        ]);
        let snapshot = validate_device_payload(&raw, &entry(), Utc::now()).unwrap();
        assert_eq!(snapshot.readings.len(), 2);
        assert_eq!(snapshot.zone(1).unwrap().mode, Some(ZoneMode::Heating));
        assert_eq!(snapshot.zone(2).unwrap().target_temperature, Some(19.5));
    }

    #[test]
    fn out_of_range_temperature_fails_fast() {
        let raw = json!({ "zone": 1, "temperature": 140, "mode": "turbo" });
        let failure = validate_device_payload(&raw, &entry(), Utc::now()).unwrap_err();
        assert_eq!(failure.errors().len(), 1);
        assert_eq!(failure.field(), "temperature");
    }

    #[test]
    fn element_failures_carry_their_index() {
        let raw = json!([
            { "zone": 1, "temperature": 20 },
            { "zone": 2, "temperature": "warm" },
        ]);
        let failure = validate_device_payload(&raw, &entry(), Utc::now()).unwrap_err();
        assert_eq!(failure.field(), "[1].temperature");
    }

    #[test]
    fn unconfigured_zone_is_rejected() {
        let failure =
            validate_device_payload(&json!({ "zone": 7, "temperature": 20 }), &entry(), Utc::now())
                .unwrap_err();
        assert_eq!(failure.field(), "zone");
        assert!(failure.reason().contains("not configured"));
    }

    #[test]
    fn duplicate_zone_and_empty_payloads_are_rejected() {
        let dup = json!([{ "zone": 1, "temperature": 20 }, { "zone": 1, "temperature": 21 }]);
        let failure = validate_device_payload(&dup, &entry(), Utc::now()).unwrap_err();
        assert_eq!(failure.field(), "[1].zone");

        let failure = validate_device_payload(&json!([]), &entry(), Utc::now()).unwrap_err();
        assert_eq!(failure.field(), "$");

        let failure = validate_device_payload(&json!(42), &entry(), Utc::now()).unwrap_err();
        assert_eq!(failure.field(), "$");
    }

    #[test]
    fn non_object_element_is_named_by_index() {
        let failure =
            validate_device_payload(&json!([{ "zone": 1, "temperature": 20 }, "x"]), &entry(), Utc::now())
                .unwrap_err();
        assert_eq!(failure.field(), "[1]");
    }
}
