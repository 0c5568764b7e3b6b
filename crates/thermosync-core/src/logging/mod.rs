// ── Context-carrying logger facade ──
//
// `Logger` handles are immutable: `with_context` returns a child carrying
// the merged tags, `without_context` returns the bare handle. Every call
// becomes a `tracing` event with `logger` and `context` fields, so sink
// configuration stays entirely in the subscriber (see `sink`).

mod rotate;
mod sink;

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::level_filters::LevelFilter;

pub use rotate::RotatingFileWriter;
pub use sink::{
    BoxedLayer, ConsoleSink, FileSink, LogFormat, LogGuard, LoggingConfig, build_layers, install,
};

/// `tracing` target shared by every logger handle.
pub const LOG_TARGET: &str = "thermosync";

// ── Severity ─────────────────────────────────────────────────────────

/// Sink threshold and event severity.
///
/// `Critical` is emitted as an `ERROR` event tagged `critical = true`.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Severity {
    #[strum(serialize = "DEBUG")]
    Debug,
    #[default]
    #[strum(serialize = "INFO")]
    Info,
    #[strum(to_string = "WARNING", serialize = "WARN")]
    Warning,
    #[strum(serialize = "ERROR")]
    Error,
    #[strum(serialize = "CRITICAL")]
    Critical,
}

impl Severity {
    pub fn level_filter(self) -> LevelFilter {
        match self {
            Self::Debug => LevelFilter::DEBUG,
            Self::Info => LevelFilter::INFO,
            Self::Warning => LevelFilter::WARN,
            Self::Error | Self::Critical => LevelFilter::ERROR,
        }
    }
}

impl TryFrom<String> for Severity {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, strum::ParseError> {
        value.trim().parse()
    }
}

// ── Context ──────────────────────────────────────────────────────────

/// Ordered key/value tags, rendered as `key=value key=value`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogContext(IndexMap<String, String>);

impl LogContext {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

// ── Logger ───────────────────────────────────────────────────────────

/// Named logging handle with attached context. Cheap to clone.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

struct LoggerInner {
    name: String,
    context: LogContext,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.inner.name)
            .field("context", &self.inner.context)
            .finish()
    }
}

macro_rules! emit {
    ($level:ident, $inner:expr, $message:expr) => {{
        let inner = $inner;
        if inner.context.is_empty() {
            tracing::$level!(target: LOG_TARGET, logger = %inner.name, "{}", $message);
        } else {
            tracing::$level!(
                target: LOG_TARGET,
                logger = %inner.name,
                context = %inner.context,
                "{}",
                $message
            );
        }
    }};
}

impl Logger {
    fn new(name: &str) -> Self {
        Self {
            inner: Arc::new(LoggerInner {
                name: name.to_owned(),
                context: LogContext::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn context(&self) -> &LogContext {
        &self.inner.context
    }

    /// Child handle with `key` set to `value`. An existing key keeps its
    /// position and takes the new value.
    pub fn with_context(&self, key: impl Into<String>, value: impl fmt::Display) -> Logger {
        self.with_fields([(key.into(), value.to_string())])
    }

    /// Child handle with several tags merged in.
    pub fn with_fields<K, V, I>(&self, fields: I) -> Logger
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut context = self.inner.context.clone();
        for (key, value) in fields {
            context.0.insert(key.into(), value.into());
        }
        Logger {
            inner: Arc::new(LoggerInner {
                name: self.inner.name.clone(),
                context,
            }),
        }
    }

    /// Same logger name, no context.
    pub fn without_context(&self) -> Logger {
        Logger::new(&self.inner.name)
    }

    /// Whether both handles are the same shared instance.
    pub fn is_same(&self, other: &Logger) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn log(&self, severity: Severity, message: impl fmt::Display) {
        match severity {
            Severity::Debug => emit!(debug, &self.inner, message),
            Severity::Info => emit!(info, &self.inner, message),
            Severity::Warning => emit!(warn, &self.inner, message),
            Severity::Error => emit!(error, &self.inner, message),
            Severity::Critical => tracing::error!(
                target: LOG_TARGET,
                logger = %self.inner.name,
                context = %self.inner.context,
                critical = true,
                "{message}"
            ),
        }
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.log(Severity::Debug, message);
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.log(Severity::Info, message);
    }

    pub fn warning(&self, message: impl fmt::Display) {
        self.log(Severity::Warning, message);
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.log(Severity::Error, message);
    }

    pub fn critical(&self, message: impl fmt::Display) {
        self.log(Severity::Critical, message);
    }
}

// ── Registry ─────────────────────────────────────────────────────────

/// Hands out one shared [`Logger`] per name.
///
/// Owned by the composition root and passed to whatever needs a logger.
/// Clones share the same table.
#[derive(Clone, Default)]
pub struct LoggerRegistry {
    loggers: Arc<DashMap<String, Logger>>,
}

impl LoggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Logger {
        if let Some(existing) = self.loggers.get(name) {
            return existing.value().clone();
        }
        self.loggers
            .entry(name.to_owned())
            .or_insert_with(|| Logger::new(name))
            .value()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }
}

impl fmt::Debug for LoggerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerRegistry")
            .field("loggers", &self.loggers.len())
            .finish()
    }
}
