//! Command dispatch. Every command builds the coordinator group from the
//! same validated device set.

mod check;
mod poll;
mod run;

use thermosync_api::HttpDeviceClient;
use thermosync_config::{Config, device_entries};
use thermosync_core::{CoordinatorGroup, LoggerRegistry, http_client_for};

use crate::cli::Command;
use crate::error::CliError;

pub type Group = CoordinatorGroup<HttpDeviceClient>;

pub async fn dispatch(command: Command, config: &Config) -> Result<(), CliError> {
    let registry = LoggerRegistry::new();
    match command {
        Command::Check => check::handle(config, &registry),
        Command::Poll(args) => poll::handle(args, config, &registry).await,
        Command::Run => run::handle(config, &registry).await,
        // Completions are handled before dispatch
        Command::Completions(_) => unreachable!(),
    }
}

/// Validate every device entry and build one HTTP-backed coordinator each.
fn build_group(config: &Config, registry: &LoggerRegistry) -> Result<Group, CliError> {
    let entries = device_entries(config)?;
    Ok(CoordinatorGroup::build(entries, registry, http_client_for)?)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
