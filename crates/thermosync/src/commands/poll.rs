use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;

use thermosync_config::Config;
use thermosync_core::{CycleOutcome, LoggerRegistry, Published};

use super::{build_group, print_json};
use crate::cli::PollArgs;
use crate::error::CliError;

#[derive(Serialize)]
struct PollResult<'a> {
    device: &'a str,
    outcome: &'a CycleOutcome,
    published: Arc<Published>,
}

/// Run one cycle per selected device, concurrently, and print one JSON
/// line per device. Fails if any cycle failed.
pub async fn handle(
    args: PollArgs,
    config: &Config,
    registry: &LoggerRegistry,
) -> Result<(), CliError> {
    let group = build_group(config, registry)?;

    let selected: Vec<_> = match args.device {
        Some(ref name) => {
            let coordinator = group.get(name).ok_or_else(|| CliError::UnknownDevice {
                name: name.clone(),
                available: group.iter().map(|(n, _)| n).collect::<Vec<_>>().join(", "),
            })?;
            vec![(name.as_str(), coordinator)]
        }
        None => group.iter().collect(),
    };

    let outcomes = join_all(selected.iter().map(|(_, c)| c.run_cycle())).await;

    let mut first_failure = None;
    for ((name, coordinator), outcome) in selected.iter().zip(&outcomes) {
        print_json(&PollResult {
            device: name,
            outcome,
            published: coordinator.published(),
        })?;
        if first_failure.is_none() {
            first_failure = outcome.error.as_ref().map(|e| (*name, e));
        }
    }

    match first_failure {
        None => Ok(()),
        Some((device, error)) => Err(CliError::PollFailed {
            failed: outcomes.iter().filter(|o| !o.is_success()).count(),
            total: outcomes.len(),
            device: device.to_owned(),
            kind: error.kind,
            message: error.message.clone(),
        }),
    }
}
