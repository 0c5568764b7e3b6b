//! Readers that substitute a default instead of failing.
//!
//! For consumers reading loose values outside a schema, such as a setpoint
//! typed by a user, where a bad value should not sink the whole read. Each
//! substitution is logged as a warning on the given logger.

use std::time::Duration;

use serde_json::Value;

use super::{Normalized, Rule, check};
use crate::logging::Logger;

pub fn temperature_or(value: &Value, default: f64, log: &Logger) -> f64 {
    let rule = Rule::Float {
        min: -50.0,
        max: 100.0,
    };
    match read(value, &rule, "temperature", &default, log) {
        Some(Normalized::Float(t)) => t,
        _ => default,
    }
}

pub fn zone_or(value: &Value, default: u8, log: &Logger) -> u8 {
    match read(value, &Rule::Integer { min: 0, max: 10 }, "zone", &default, log) {
        Some(Normalized::Integer(z)) => u8::try_from(z).unwrap_or(default),
        _ => default,
    }
}

pub fn scan_interval_or(value: &Value, default: Duration, log: &Logger) -> Duration {
    let shown = humantime::format_duration(default);
    match read(value, &Rule::Integer { min: 30, max: 3600 }, "scan_interval", &shown, log) {
        Some(Normalized::Integer(secs)) => u64::try_from(secs).map_or(default, Duration::from_secs),
        _ => default,
    }
}

pub fn device_name_or(value: &Value, default: &str, log: &Logger) -> String {
    let rule = Rule::Text {
        min_len: 1,
        max_len: 50,
        pattern: None,
    };
    match read(value, &rule, "name", &default, log) {
        Some(Normalized::Text(name)) => name,
        _ => default.to_owned(),
    }
}

fn read(
    value: &Value,
    rule: &Rule,
    field: &str,
    default: &dyn std::fmt::Display,
    log: &Logger,
) -> Option<Normalized> {
    if value.is_null() {
        return None;
    }
    match check(rule, value) {
        Ok(normalized) => Some(normalized),
        Err(reason) => {
            log.with_context("field", field)
                .warning(format!("{reason}; using default {default}"));
            None
        }
    }
}
