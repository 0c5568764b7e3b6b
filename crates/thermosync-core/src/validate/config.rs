// Configuration entry schema. Accumulates every failure so a user fixing
// a config file sees all problems at once.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use secrecy::SecretString;
use serde_json::Value;
use strum::VariantNames;

use super::{
    FieldError, FieldSpec, Normalized, Pattern, Policy, Record, Rule, Schema, ValidationFailure,
    check, validate,
};
use crate::config::{
    ConfigEntry, DEFAULT_MIN_CALL_INTERVAL, DEFAULT_RETRY_BASE, DEFAULT_RETRY_MAX,
    DEFAULT_SCAN_INTERVAL, DEFAULT_TIMEOUT, RetryPolicy, TemperatureUnit,
};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
});
static DEVICE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("device id pattern compiles"));
static DEVICE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9 _-]+$").expect("device name pattern compiles"));

const RETRY_BASE_RULE: Rule = Rule::Integer { min: 1, max: 300 };
const RETRY_MAX_RULE: Rule = Rule::Integer { min: 1, max: 3600 };

pub(crate) static CONFIG_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        FieldSpec::required(
            "device_id",
            Rule::Text {
                min_len: 1,
                max_len: 64,
                pattern: Some(Pattern::new(
                    &DEVICE_ID,
                    "may only contain letters, digits, '-' and '_'",
                )),
            },
        ),
        FieldSpec::optional(
            "name",
            Rule::Text {
                min_len: 1,
                max_len: 50,
                pattern: Some(Pattern::new(
                    &DEVICE_NAME,
                    "may only contain letters, digits, spaces, '-' and '_'",
                )),
            },
        ),
        FieldSpec::required("host", Rule::HttpUrl),
        FieldSpec::required(
            "username",
            Rule::Text {
                min_len: 3,
                max_len: 100,
                pattern: Some(Pattern::new(&EMAIL, "must be an email address")),
            },
        ),
        FieldSpec::required(
            "password",
            Rule::Secret {
                min_len: 6,
                max_len: 100,
            },
        ),
        FieldSpec::optional("scan_interval", Rule::Integer { min: 30, max: 3600 }),
        FieldSpec::optional("zones", Rule::IntegerList { min: 0, max: 10 }),
        FieldSpec::optional("target_temperature", Rule::Float { min: 5.0, max: 90.0 }),
        FieldSpec::optional("unit", Rule::OneOf(TemperatureUnit::VARIANTS)),
        FieldSpec::optional(
            "user_agent",
            Rule::Text {
                min_len: 10,
                max_len: 200,
                pattern: None,
            },
        ),
        FieldSpec::optional("timeout", Rule::Integer { min: 1, max: 120 }),
        FieldSpec::optional("retry_base_delay", RETRY_BASE_RULE),
        FieldSpec::optional("retry_max_delay", RETRY_MAX_RULE),
        FieldSpec::optional("jitter", Rule::Bool),
        FieldSpec::optional("min_call_interval", Rule::Integer { min: 0, max: 60 }),
        FieldSpec::optional("insecure", Rule::Bool),
        FieldSpec::optional(
            "ca_cert",
            Rule::Text {
                min_len: 1,
                max_len: 4096,
                pattern: None,
            },
        ),
    ])
});

/// Validate a raw device table into a [`ConfigEntry`].
pub fn validate_config_entry(raw: &Value) -> Result<ConfigEntry, ValidationFailure> {
    let order = retry_order(raw);
    let record = match validate(raw, &CONFIG_SCHEMA, Policy::Accumulate) {
        Ok(record) => record,
        Err(failure) => return Err(order.into_iter().fold(failure, ValidationFailure::with)),
    };
    if let Some(error) = order {
        return Err(ValidationFailure::single(error.field, error.reason));
    }

    let retry = RetryPolicy {
        base_delay: seconds(&record, "retry_base_delay", DEFAULT_RETRY_BASE),
        max_delay: seconds(&record, "retry_max_delay", DEFAULT_RETRY_MAX),
        jitter: record.boolean("jitter").unwrap_or(false),
    };

    let device_id = required(record.text("device_id"), "device_id")?.to_owned();
    let unit = record
        .choice("unit")
        .and_then(|u| u.parse().ok())
        .unwrap_or_default();

    Ok(ConfigEntry {
        name: record.text("name").unwrap_or(&device_id).to_owned(),
        host: required(record.url("host"), "host")?.clone(),
        username: required(record.text("username"), "username")?.to_owned(),
        password: SecretString::from(required(record.text("password"), "password")?.to_owned()),
        scan_interval: seconds(&record, "scan_interval", DEFAULT_SCAN_INTERVAL),
        zones: record
            .integers("zones")
            .unwrap_or_default()
            .iter()
            .filter_map(|z| u8::try_from(*z).ok())
            .collect(),
        target_temperature: record.float("target_temperature"),
        unit,
        user_agent: record.text("user_agent").map(str::to_owned),
        timeout: seconds(&record, "timeout", DEFAULT_TIMEOUT),
        retry,
        min_call_interval: seconds(&record, "min_call_interval", DEFAULT_MIN_CALL_INTERVAL),
        insecure: record.boolean("insecure").unwrap_or(false),
        ca_cert: record.text("ca_cert").map(PathBuf::from),
        device_id,
    })
}

/// `retry_max_delay` may not undercut `retry_base_delay`. Checked on the
/// raw table so it is reported together with per-field failures; skipped
/// when either delay is itself invalid.
fn retry_order(raw: &Value) -> Option<FieldError> {
    let base = raw_seconds(raw, "retry_base_delay", &RETRY_BASE_RULE, DEFAULT_RETRY_BASE)?;
    let max = raw_seconds(raw, "retry_max_delay", &RETRY_MAX_RULE, DEFAULT_RETRY_MAX)?;
    (max < base).then(|| {
        FieldError::new(
            "retry_max_delay",
            format!(
                "must be at least retry_base_delay ({}s), got {}s",
                base.as_secs(),
                max.as_secs()
            ),
        )
    })
}

fn raw_seconds(raw: &Value, field: &str, rule: &Rule, default: Duration) -> Option<Duration> {
    match raw.get(field) {
        None | Some(Value::Null) => Some(default),
        Some(value) => match check(rule, value) {
            Ok(Normalized::Integer(n)) => u64::try_from(n).ok().map(Duration::from_secs),
            _ => None,
        },
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, ValidationFailure> {
    value.ok_or_else(|| ValidationFailure::single(field, "required field is missing"))
}

fn seconds(record: &Record, field: &str, default: Duration) -> Duration {
    record
        .integer(field)
        .and_then(|n| u64::try_from(n).ok())
        .map_or(default, Duration::from_secs)
}
