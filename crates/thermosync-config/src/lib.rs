//! Configuration for the thermosync daemon.
//!
//! One TOML file with a `[logging]` table, optional `[defaults]` shared by
//! every device, and one `[devices.<name>]` table per device, overlaid by
//! `THERMOSYNC_`-prefixed environment variables. Device tables stay raw
//! JSON here: `thermosync_core` validates them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use thermosync_core::LoggingConfig;

/// Environment prefix; `__` separates nesting levels.
pub const ENV_PREFIX: &str = "THERMOSYNC_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no devices configured")]
    NoDevices,

    #[error("device '{device}': environment variable {variable} is not set")]
    MissingSecret { device: String, variable: String },

    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Config structs ──────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Keys applied to every device table unless the device sets them.
    #[serde(default)]
    pub defaults: Map<String, Value>,

    /// Raw device tables keyed by device name.
    #[serde(default)]
    pub devices: BTreeMap<String, Value>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "thermosync", "thermosync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("thermosync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load from the platform config path. A missing file yields the
/// environment-only configuration.
pub fn load_config() -> Result<Config, ConfigError> {
    extract(&config_path())
}

/// Load from an explicit path, which must exist.
pub fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    extract(path)
}

fn extract(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    Ok(figment.extract()?)
}

// ── Device entries ──────────────────────────────────────────────────

/// Raw device entries ready for validation, with defaults applied,
/// `device_id` defaulted to the table name and `password_env` resolved
/// from the process environment.
pub fn device_entries(config: &Config) -> Result<Vec<(String, Value)>, ConfigError> {
    device_entries_with(config, |name| std::env::var(name).ok())
}

/// Like [`device_entries`], resolving `password_env` through `lookup`.
pub fn device_entries_with<F>(
    config: &Config,
    lookup: F,
) -> Result<Vec<(String, Value)>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if config.devices.is_empty() {
        return Err(ConfigError::NoDevices);
    }

    config
        .devices
        .iter()
        .map(|(name, raw)| {
            let Value::Object(table) = raw else {
                return Err(ConfigError::Validation {
                    field: format!("devices.{name}"),
                    reason: "expected a table".into(),
                });
            };

            let mut entry = config.defaults.clone();
            entry.extend(table.clone());
            entry
                .entry("device_id")
                .or_insert_with(|| Value::String(name.clone()));
            resolve_password(name, &mut entry, &lookup)?;
            Ok((name.clone(), Value::Object(entry)))
        })
        .collect()
}

/// `password_env` wins over a plaintext `password` when the variable is set.
fn resolve_password<F>(device: &str, entry: &mut Map<String, Value>, lookup: &F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(variable) = entry.remove("password_env") else {
        return Ok(());
    };
    let Value::String(variable) = variable else {
        return Err(ConfigError::Validation {
            field: format!("devices.{device}.password_env"),
            reason: "expected an environment variable name".into(),
        });
    };

    match lookup(&variable) {
        Some(secret) => {
            entry.insert("password".into(), Value::String(secret));
            Ok(())
        }
        None if entry.contains_key("password") => Ok(()),
        None => Err(ConfigError::MissingSecret {
            device: device.to_owned(),
            variable,
        }),
    }
}
