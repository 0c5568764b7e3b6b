// Subscriber assembly: one boxed `fmt` layer per sink, each behind its own
// reloadable `LevelFilter` so thresholds can change while running.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{Layer, Registry, fmt, reload};

use super::{RotatingFileWriter, Severity};

pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

type LevelHandle = reload::Handle<LevelFilter, Registry>;

const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_FILES: usize = 5;

// ── Configuration ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// `[logging]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub console: ConsoleSink,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileSink>,
}

/// Console sink. Writes to stderr.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleSink {
    pub enabled: bool,
    pub level: Severity,
    pub ansi: bool,
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self {
            enabled: true,
            level: Severity::Info,
            ansi: true,
        }
    }
}

/// Rotating file sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSink {
    pub path: PathBuf,
    #[serde(default = "default_file_level")]
    pub level: Severity,
    /// Rotate once the file would grow past this many bytes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    /// Rotated files kept next to the live one.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default)]
    pub format: LogFormat,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            level: default_file_level(),
            max_bytes: DEFAULT_MAX_BYTES,
            max_files: DEFAULT_MAX_FILES,
            format: LogFormat::Compact,
        }
    }
}

fn default_file_level() -> Severity {
    Severity::Debug
}

fn default_max_bytes() -> u64 {
    DEFAULT_MAX_BYTES
}

fn default_max_files() -> usize {
    DEFAULT_MAX_FILES
}

// ── Guard ────────────────────────────────────────────────────────────

/// Keeps the file sink's background writer alive and exposes the
/// per-sink level switches. Dropping it flushes pending file output.
pub struct LogGuard {
    console: Option<LevelHandle>,
    file: Option<LevelHandle>,
    _worker: Option<WorkerGuard>,
}

impl LogGuard {
    /// Change the console threshold. `false` when there is no console sink.
    pub fn set_console_level(&self, level: Severity) -> bool {
        set_level(self.console.as_ref(), level)
    }

    /// Change the file threshold. `false` when there is no file sink.
    pub fn set_file_level(&self, level: Severity) -> bool {
        set_level(self.file.as_ref(), level)
    }

    pub fn has_file_sink(&self) -> bool {
        self.file.is_some()
    }
}

fn set_level(handle: Option<&LevelHandle>, level: Severity) -> bool {
    handle.is_some_and(|h| h.modify(|filter| *filter = level.level_filter()).is_ok())
}

// ── Assembly ─────────────────────────────────────────────────────────

/// Build the sink layers without installing them.
///
/// Sink failures are reported on stderr and the sink is skipped; building
/// never fails.
pub fn build_layers<W>(config: &LoggingConfig, console_writer: W) -> (Vec<BoxedLayer>, LogGuard)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = LogGuard {
        console: None,
        file: None,
        _worker: None,
    };

    if config.console.enabled {
        let (filter, handle) = reload::Layer::new(config.console.level.level_filter());
        layers.push(
            fmt::layer()
                .compact()
                .with_ansi(config.console.ansi)
                .with_writer(console_writer)
                .with_filter(filter)
                .boxed(),
        );
        guard.console = Some(handle);
    }

    if let Some(sink) = &config.file {
        match RotatingFileWriter::open(&sink.path, sink.max_bytes, sink.max_files) {
            Ok(writer) => {
                let (writer, worker) = tracing_appender::non_blocking(writer);
                let (filter, handle) = reload::Layer::new(sink.level.level_filter());
                let layer = match sink.format {
                    LogFormat::Compact => fmt::layer()
                        .compact()
                        .with_ansi(false)
                        .with_writer(writer)
                        .with_filter(filter)
                        .boxed(),
                    LogFormat::Json => fmt::layer()
                        .json()
                        .with_writer(writer)
                        .with_filter(filter)
                        .boxed(),
                };
                layers.push(layer);
                guard.file = Some(handle);
                guard._worker = Some(worker);
            }
            Err(err) => eprintln!("thermosync: {err}; file logging disabled"),
        }
    }

    (layers, guard)
}

/// Install the sinks as the global subscriber, with the console on stderr.
///
/// A second install (or any other global subscriber) is reported and
/// ignored.
pub fn install(config: &LoggingConfig) -> LogGuard {
    let (layers, guard) = build_layers(config, std::io::stderr);
    if let Err(err) = tracing_subscriber::registry().with(layers).try_init() {
        eprintln!("thermosync: logging already initialized: {err}");
    }
    guard
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;
    use crate::logging::LoggerRegistry;
    use crate::logging::tests::Capture;

    #[test]
    fn console_threshold_changes_at_runtime() {
        let capture = Capture::default();
        let config = LoggingConfig::default();
        let (layers, guard) = build_layers(&config, capture.clone());
        let log = LoggerRegistry::new().get("coordinator");

        tracing::subscriber::with_default(tracing_subscriber::registry().with(layers), || {
            log.debug("hidden detail");
            assert!(guard.set_console_level(Severity::Debug));
            log.debug("visible detail");
        });

        let out = capture.contents();
        assert!(!out.contains("hidden detail"), "{out}");
        assert!(out.contains("visible detail"), "{out}");
        assert!(!guard.set_file_level(Severity::Error));
    }

    #[test]
    fn file_and_console_filter_independently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("thermosync.log");
        let capture = Capture::default();
        let config = LoggingConfig {
            console: ConsoleSink {
                level: Severity::Warning,
                ansi: false,
                ..ConsoleSink::default()
            },
            file: Some(FileSink::new(&path)),
        };
        let (layers, guard) = build_layers(&config, capture.clone());
        assert!(guard.has_file_sink());
        let log = LoggerRegistry::new().get("coordinator").with_context("zone", 1);

        tracing::subscriber::with_default(tracing_subscriber::registry().with(layers), || {
            log.debug("poll started");
            log.warning("poll failed");
        });
        drop(guard);

        let console = capture.contents();
        let file = fs::read_to_string(&path).unwrap();
        assert!(!console.contains("poll started"));
        assert!(console.contains("poll failed"));
        assert!(file.contains("poll started"));
        assert!(file.contains("poll failed"));
        assert!(file.contains("context=zone=1"));
    }

    #[test]
    fn unusable_file_sink_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let config = LoggingConfig {
            console: ConsoleSink {
                enabled: false,
                ..ConsoleSink::default()
            },
            file: Some(FileSink::new(blocker.join("thermosync.log"))),
        };

        let (layers, guard) = build_layers(&config, Capture::default());
        assert!(layers.is_empty());
        assert!(!guard.has_file_sink());
        assert!(!guard.set_console_level(Severity::Debug));
    }

    #[test]
    fn file_sink_fills_in_defaults() {
        let config: LoggingConfig = from_json(r#"{ "file": { "path": "/var/log/thermosync.log" } }"#);
        let file = config.file.unwrap();
        assert_eq!(file.level, Severity::Debug);
        assert_eq!(file.max_bytes, 10 * 1024 * 1024);
        assert_eq!(file.max_files, 5);
        assert!(config.console.enabled);
    }

    fn from_json(json: &str) -> LoggingConfig {
        serde_json::from_str(json).unwrap()
    }
}
