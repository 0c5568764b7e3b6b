//! Service-call arguments (setpoint changes and similar writes).
//!
//! The engine never issues writes itself; whatever routes service calls to
//! a device validates the arguments here first.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use super::{FieldSpec, Pattern, Policy, Rule, Schema, ValidationFailure, validate};

static ITEM_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("item id pattern compiles"));

pub(crate) static SERVICE_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        FieldSpec::required(
            "device_id",
            Rule::Text {
                min_len: 1,
                max_len: 64,
                pattern: None,
            },
        ),
        FieldSpec::required(
            "item_id",
            Rule::Text {
                min_len: 1,
                max_len: 50,
                pattern: Some(Pattern::new(
                    &ITEM_ID,
                    "may only contain letters, digits and '_'",
                )),
            },
        ),
        FieldSpec::required("zone", Rule::Integer { min: 0, max: 10 }),
        FieldSpec::required(
            "value",
            Rule::Float {
                min: -1000.0,
                max: 1000.0,
            },
        ),
    ])
});

/// A validated request to write `value` to `item_id` on one zone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceCall {
    pub device_id: String,
    pub item_id: String,
    pub zone: u8,
    pub value: f64,
}

pub fn validate_service_call(raw: &Value) -> Result<ServiceCall, ValidationFailure> {
    let record = validate(raw, &SERVICE_SCHEMA, Policy::Accumulate)?;
    let missing = |field: &str| ValidationFailure::single(field, "required field is missing");

    Ok(ServiceCall {
        device_id: record.text("device_id").ok_or_else(|| missing("device_id"))?.to_owned(),
        item_id: record.text("item_id").ok_or_else(|| missing("item_id"))?.to_owned(),
        zone: record
            .integer("zone")
            .and_then(|z| u8::try_from(z).ok())
            .ok_or_else(|| missing("zone"))?,
        value: record.float("value").ok_or_else(|| missing("value"))?,
    })
}
