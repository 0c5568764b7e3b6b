use thermosync_config::Config;
use thermosync_core::LoggerRegistry;

use super::build_group;
use crate::error::CliError;

/// Validate every device entry; rejected entries surface as one error
/// listing each offending field.
pub fn handle(config: &Config, registry: &LoggerRegistry) -> Result<(), CliError> {
    let group = build_group(config, registry)?;

    for (_, coordinator) in group.iter() {
        let entry = coordinator.entry();
        let zones = if entry.zones.is_empty() {
            "any zone".to_owned()
        } else {
            format!("{} zone(s)", entry.zones.len())
        };
        println!(
            "{}: ok ({}, {zones}, every {}s)",
            entry.name,
            entry.device_id,
            entry.scan_interval.as_secs()
        );
    }
    Ok(())
}
