// ── Schema validation ──
//
// Declarative field rules applied to untrusted JSON. A `Schema` lists
// named fields; `validate` checks each one and returns either a normalized
// `Record` or every violation found (or only the first, under
// `Policy::FailFast`). Numeric strings are coerced to numbers.

mod config;
mod lenient;
mod payload;
mod service;

use std::fmt;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use url::Url;

pub use config::validate_config_entry;
pub use lenient::{device_name_or, scan_interval_or, temperature_or, zone_or};
pub use payload::validate_device_payload;
pub use service::{ServiceCall, validate_service_call};

// ── Failures ─────────────────────────────────────────────────────────

/// One field that failed its rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Input rejected by a schema. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", summarize(.errors))]
pub struct ValidationFailure {
    errors: Vec<FieldError>,
}

fn summarize(errors: &[FieldError]) -> String {
    match errors {
        [single] => single.to_string(),
        many => {
            let parts: Vec<String> = many.iter().map(ToString::to_string).collect();
            format!("{} fields invalid: {}", many.len(), parts.join("; "))
        }
    }
}

impl ValidationFailure {
    pub fn single(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError::new(field, reason)],
        }
    }

    /// Build from collected errors. `None` when there is nothing to report.
    pub fn from_errors(errors: Vec<FieldError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Name of the first offending field.
    pub fn field(&self) -> &str {
        self.errors.first().map_or("", |e| e.field.as_str())
    }

    /// Reason attached to the first offending field.
    pub fn reason(&self) -> &str {
        self.errors.first().map_or("", |e| e.reason.as_str())
    }

    pub fn mentions(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// Append a failure found outside the schema pass.
    pub(crate) fn with(mut self, error: FieldError) -> Self {
        self.errors.push(error);
        self
    }

    /// Prefix every field name, e.g. `[2].` for array elements.
    fn prefixed(mut self, prefix: &str) -> Self {
        if !prefix.is_empty() {
            for error in &mut self.errors {
                error.field = format!("{prefix}{}", error.field);
            }
        }
        self
    }
}

// ── Rules ────────────────────────────────────────────────────────────

/// A compiled pattern plus the message shown when it does not match.
pub struct Pattern {
    regex: &'static LazyLock<Regex>,
    hint: &'static str,
}

impl Pattern {
    pub const fn new(regex: &'static LazyLock<Regex>, hint: &'static str) -> Self {
        Self { regex, hint }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("regex", &self.regex.as_str())
            .field("hint", &self.hint)
            .finish()
    }
}

/// How a single field is checked and normalized.
#[derive(Debug)]
pub enum Rule {
    /// Finite number within `[min, max]`.
    Float { min: f64, max: f64 },
    /// Whole number within `[min, max]`.
    Integer { min: i64, max: i64 },
    /// Non-empty list of distinct whole numbers, each within `[min, max]`.
    IntegerList { min: i64, max: i64 },
    /// String whose trimmed length is within `[min_len, max_len]`.
    Text {
        min_len: usize,
        max_len: usize,
        pattern: Option<Pattern>,
    },
    /// String checked for length only and kept verbatim.
    Secret { min_len: usize, max_len: usize },
    /// One of a fixed set of names, compared case-insensitively.
    OneOf(&'static [&'static str]),
    Bool,
    /// Absolute `http` or `https` URL.
    HttpUrl,
}

#[derive(Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub rule: Rule,
    pub required: bool,
}

impl FieldSpec {
    pub fn required(name: &'static str, rule: Rule) -> Self {
        Self {
            name,
            rule,
            required: true,
        }
    }

    pub fn optional(name: &'static str, rule: Rule) -> Self {
        Self {
            name,
            rule,
            required: false,
        }
    }
}

/// Ordered list of field rules. Unknown input fields are ignored.
#[derive(Debug)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }
}

/// Whether to stop at the first violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Report every violation (configuration).
    Accumulate,
    /// Stop at the first violation (device payloads).
    FailFast,
}

// ── Normalized output ────────────────────────────────────────────────

/// A validated, normalized field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Float(f64),
    Integer(i64),
    IntegerList(Vec<i64>),
    Text(String),
    Choice(&'static str),
    Bool(bool),
    Url(Url),
}

/// Validated fields in schema order. Absent optional fields are missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: IndexMap<&'static str, Normalized>,
}

impl Record {
    pub fn get(&self, name: &str) -> Option<&Normalized> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        match self.values.get(name)? {
            Normalized::Float(v) => Some(*v),
            #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
            Normalized::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.values.get(name)? {
            Normalized::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn integers(&self, name: &str) -> Option<&[i64]> {
        match self.values.get(name)? {
            Normalized::IntegerList(v) => Some(v),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name)? {
            Normalized::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn choice(&self, name: &str) -> Option<&'static str> {
        match self.values.get(name)? {
            Normalized::Choice(v) => Some(v),
            _ => None,
        }
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.values.get(name)? {
            Normalized::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn url(&self, name: &str) -> Option<&Url> {
        match self.values.get(name)? {
            Normalized::Url(v) => Some(v),
            _ => None,
        }
    }
}

// ── Engine ───────────────────────────────────────────────────────────

/// Check `input` against `schema`.
pub fn validate(input: &Value, schema: &Schema, policy: Policy) -> Result<Record, ValidationFailure> {
    validate_at(input, schema, policy, "")
}

/// Like [`validate`], with every reported field name prefixed.
pub(crate) fn validate_at(
    input: &Value,
    schema: &Schema,
    policy: Policy,
    prefix: &str,
) -> Result<Record, ValidationFailure> {
    let Some(object) = input.as_object() else {
        let field = if prefix.is_empty() { "$" } else { prefix.trim_end_matches('.') };
        return Err(ValidationFailure::single(
            field,
            format!("expected an object, got {}", type_name(input)),
        ));
    };

    let mut record = Record::default();
    let mut errors = Vec::new();

    for spec in &schema.fields {
        match object.get(spec.name) {
            None | Some(Value::Null) => {
                if spec.required {
                    errors.push(FieldError::new(spec.name, "required field is missing"));
                }
            }
            Some(value) => match check(&spec.rule, value) {
                Ok(normalized) => {
                    record.values.insert(spec.name, normalized);
                }
                Err(reason) => errors.push(FieldError::new(spec.name, reason)),
            },
        }
        if policy == Policy::FailFast && !errors.is_empty() {
            break;
        }
    }

    match ValidationFailure::from_errors(errors) {
        None => Ok(record),
        Some(failure) => Err(failure.prefixed(prefix)),
    }
}

/// Apply one rule to one value. The error is a human-readable reason.
pub fn check(rule: &Rule, value: &Value) -> Result<Normalized, String> {
    match rule {
        Rule::Float { min, max } => {
            let n = coerce_f64(value).ok_or_else(|| expected("a number", value))?;
            if n < *min || n > *max {
                return Err(format!("must be between {min} and {max}, got {n}"));
            }
            Ok(Normalized::Float(n))
        }
        Rule::Integer { min, max } => {
            let n = coerce_i64(value).ok_or_else(|| expected("a whole number", value))?;
            in_range(n, *min, *max)?;
            Ok(Normalized::Integer(n))
        }
        Rule::IntegerList { min, max } => {
            let items = value.as_array().ok_or_else(|| expected("a list", value))?;
            if items.is_empty() {
                return Err("must not be empty".into());
            }
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let n = coerce_i64(item).ok_or_else(|| expected("whole numbers", item))?;
                in_range(n, *min, *max)?;
                if out.contains(&n) {
                    return Err(format!("contains {n} more than once"));
                }
                out.push(n);
            }
            Ok(Normalized::IntegerList(out))
        }
        Rule::Text {
            min_len,
            max_len,
            pattern,
        } => {
            let raw = value.as_str().ok_or_else(|| expected("a string", value))?;
            let text = raw.trim();
            let len = text.chars().count();
            if len < *min_len || len > *max_len {
                return Err(format!(
                    "length must be between {min_len} and {max_len} characters, got {len}"
                ));
            }
            if let Some(pattern) = pattern {
                if !pattern.regex.is_match(text) {
                    return Err(pattern.hint.to_owned());
                }
            }
            Ok(Normalized::Text(text.to_owned()))
        }
        Rule::Secret { min_len, max_len } => {
            let raw = value.as_str().ok_or_else(|| expected("a string", value))?;
            let len = raw.chars().count();
            if len < *min_len || len > *max_len {
                return Err(format!(
                    "length must be between {min_len} and {max_len} characters"
                ));
            }
            Ok(Normalized::Text(raw.to_owned()))
        }
        Rule::OneOf(choices) => {
            let raw = value.as_str().ok_or_else(|| expected("a string", value))?;
            choices
                .iter()
                .find(|c| c.eq_ignore_ascii_case(raw.trim()))
                .copied()
                .map(Normalized::Choice)
                .ok_or_else(|| format!("must be one of {}, got '{raw}'", choices.join(", ")))
        }
        Rule::Bool => match value {
            Value::Bool(b) => Ok(Normalized::Bool(*b)),
            other => Err(expected("true or false", other)),
        },
        Rule::HttpUrl => {
            let raw = value.as_str().ok_or_else(|| expected("a URL string", value))?;
            let url = Url::parse(raw.trim()).map_err(|e| format!("invalid URL: {e}"))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(format!("scheme must be http or https, got '{}'", url.scheme()));
            }
            if url.host_str().is_none_or(str::is_empty) {
                return Err("URL has no host".into());
            }
            Ok(Normalized::Url(url))
        }
    }
}

fn in_range(n: i64, min: i64, max: i64) -> Result<(), String> {
    if n < min || n > max {
        Err(format!("must be between {min} and {max}, got {n}"))
    } else {
        Ok(())
    }
}

fn coerce_f64(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn expected(what: &str, got: &Value) -> String {
    format!("expected {what}, got {}", type_name(got))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    static WORD: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[a-z]+$").expect("word pattern compiles"));

    fn schema() -> Schema {
        Schema::new(vec![
            FieldSpec::required("zone", Rule::Integer { min: 0, max: 10 }),
            FieldSpec::required("temperature", Rule::Float { min: -50.0, max: 100.0 }),
            FieldSpec::optional(
                "label",
                Rule::Text {
                    min_len: 1,
                    max_len: 8,
                    pattern: Some(Pattern::new(&WORD, "must be lowercase letters")),
                },
            ),
        ])
    }

    #[test]
    fn accepts_valid_input_and_ignores_unknown_fields() {
        let record = validate(
            &json!({ "zone": 1, "temperature": 21.5, "firmware": "2.4" }),
            &schema(),
            Policy::Accumulate,
        )
        .unwrap();
        assert_eq!(record.integer("zone"), Some(1));
        assert_eq!(record.float("temperature"), Some(21.5));
        assert!(!record.contains("label"));
    }

    #[test]
    fn coerces_numeric_strings() {
        let record = validate(
            &json!({ "zone": " 3 ", "temperature": "19.25" }),
            &schema(),
            Policy::FailFast,
        )
        .unwrap();
        assert_eq!(record.integer("zone"), Some(3));
        assert_eq!(record.float("temperature"), Some(19.25));
    }

    #[test]
    fn accumulate_reports_every_field() {
        let failure = validate(
            &json!({ "zone": 11, "temperature": "hot", "label": "UPPER" }),
            &schema(),
            Policy::Accumulate,
        )
        .unwrap_err();
        let fields: Vec<&str> = failure.errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["zone", "temperature", "label"]);
        assert_eq!(failure.reason(), "must be between 0 and 10, got 11");
    }

    #[test]
    fn fail_fast_stops_at_first_violation() {
        let failure = validate(
            &json!({ "temperature": 500 }),
            &schema(),
            Policy::FailFast,
        )
        .unwrap_err();
        assert_eq!(failure.errors().len(), 1);
        assert_eq!(failure.field(), "zone");
        assert_eq!(failure.reason(), "required field is missing");
    }

    #[test]
    fn null_counts_as_missing() {
        let failure = validate(&json!({ "zone": null, "temperature": 20 }), &schema(), Policy::FailFast)
            .unwrap_err();
        assert!(failure.mentions("zone"));
    }

    #[test]
    fn non_object_input_is_rejected_at_root() {
        let failure = validate(&json!("nope"), &schema(), Policy::Accumulate).unwrap_err();
        assert_eq!(failure.field(), "$");
        assert_eq!(failure.reason(), "expected an object, got a string");
    }

    #[test]
    fn non_finite_and_fractional_numbers_are_rejected() {
        assert!(check(&Rule::Float { min: 0.0, max: 1.0 }, &json!("NaN")).is_err());
        assert!(check(&Rule::Integer { min: 0, max: 10 }, &json!(2.5)).is_err());
    }

    #[test]
    fn integer_list_rejects_duplicates_and_empty() {
        let rule = Rule::IntegerList { min: 0, max: 10 };
        assert_eq!(
            check(&rule, &json!([1, 2, 1])).unwrap_err(),
            "contains 1 more than once"
        );
        assert_eq!(check(&rule, &json!([])).unwrap_err(), "must not be empty");
        assert_eq!(
            check(&rule, &json!([0, "4"])).unwrap(),
            Normalized::IntegerList(vec![0, 4])
        );
    }

    #[test]
    fn one_of_is_case_insensitive_and_canonicalizes() {
        let rule = Rule::OneOf(&["celsius", "fahrenheit"]);
        assert_eq!(check(&rule, &json!("Celsius")).unwrap(), Normalized::Choice("celsius"));
        assert!(check(&rule, &json!("kelvin")).unwrap_err().contains("celsius, fahrenheit"));
    }

    #[test]
    fn url_requires_http_scheme() {
        assert!(check(&Rule::HttpUrl, &json!("https://boiler.local/api")).is_ok());
        assert!(
            check(&Rule::HttpUrl, &json!("ftp://boiler.local"))
                .unwrap_err()
                .contains("http or https")
        );
    }

    #[test]
    fn multiple_errors_render_as_summary() {
        let failure = ValidationFailure::from_errors(vec![
            FieldError::new("a", "bad"),
            FieldError::new("b", "worse"),
        ])
        .unwrap();
        assert_eq!(failure.to_string(), "2 fields invalid: a: bad; b: worse");
        assert!(ValidationFailure::from_errors(Vec::new()).is_none());
    }
}
