// File + environment loading, isolated with figment's Jail.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use figment::Jail;
use serde_json::json;

use thermosync_config::{ConfigError, device_entries, load_config_file};
use thermosync_core::Severity;

const CONFIG: &str = r#"
[logging.console]
level = "warning"

[logging.file]
path = "logs/thermosync.log"
max_files = 3

[defaults]
scan_interval = 300

[devices.boiler]
host = "https://boiler.local/api/v1/state"
username = "owner@example.com"
password_env = "BOILER_PASSWORD"
zones = [1, 2]
"#;

fn to_figment(err: ConfigError) -> figment::Error {
    figment::Error::from(err.to_string())
}

#[test]
fn loads_toml_with_logging_and_devices() {
    Jail::expect_with(|jail| {
        jail.create_file("thermosync.toml", CONFIG)?;
        jail.set_env("BOILER_PASSWORD", "hunter22");

        let config = load_config_file(Path::new("thermosync.toml")).map_err(to_figment)?;
        assert_eq!(config.logging.console.level, Severity::Warning);
        let file = config.logging.file.as_ref().unwrap();
        assert_eq!(file.max_files, 3);
        assert_eq!(file.max_bytes, 10 * 1024 * 1024);

        let entries = device_entries(&config).map_err(to_figment)?;
        assert_eq!(entries.len(), 1);
        let (name, entry) = &entries[0];
        assert_eq!(name, "boiler");
        assert_eq!(entry["device_id"], json!("boiler"));
        assert_eq!(entry["password"], json!("hunter22"));
        assert_eq!(entry["scan_interval"], json!(300));
        assert_eq!(entry["zones"], json!([1, 2]));
        Ok(())
    });
}

#[test]
fn environment_overrides_file_values() {
    Jail::expect_with(|jail| {
        jail.create_file("thermosync.toml", CONFIG)?;
        jail.set_env("BOILER_PASSWORD", "hunter22");
        jail.set_env("THERMOSYNC_DEVICES__BOILER__SCAN_INTERVAL", 45);
        jail.set_env("THERMOSYNC_LOGGING__CONSOLE__LEVEL", "debug");

        let config = load_config_file(Path::new("thermosync.toml")).map_err(to_figment)?;
        assert_eq!(config.logging.console.level, Severity::Debug);
        assert_eq!(config.devices["boiler"]["scan_interval"], json!(45));
        Ok(())
    });
}

#[test]
fn explicit_missing_file_is_reported() {
    Jail::expect_with(|_jail| {
        let err = load_config_file(Path::new("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }), "got {err:?}");
        Ok(())
    });
}

#[test]
fn malformed_toml_is_a_figment_error() {
    Jail::expect_with(|jail| {
        jail.create_file("thermosync.toml", "[devices.boiler\nhost = 1")?;
        let err = load_config_file(Path::new("thermosync.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Figment(_)), "got {err:?}");
        Ok(())
    });
}
