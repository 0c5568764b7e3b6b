use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::select_all;
use serde::Serialize;

use thermosync_config::Config;
use thermosync_core::{DeviceSnapshot, LoggerRegistry};

use super::{build_group, print_json};
use crate::error::CliError;

#[derive(Serialize)]
struct Update<'a> {
    device: &'a str,
    snapshot: &'a DeviceSnapshot,
}

/// Start every coordinator and print each published snapshot until
/// Ctrl-C, then shut the group down.
pub async fn handle(config: &Config, registry: &LoggerRegistry) -> Result<(), CliError> {
    let group = build_group(config, registry)?;
    let log = registry.get("cli");

    let mut updates = select_all(group.iter().map(|(name, coordinator)| {
        let name: Arc<str> = Arc::from(name);
        coordinator
            .subscribe()
            .into_stream()
            .map(move |snapshot| (Arc::clone(&name), snapshot))
    }));

    group.start_all().await?;
    log.info(format!("polling {} device(s), Ctrl-C to stop", group.len()));

    let result = loop {
        tokio::select! {
            biased;
            signal = tokio::signal::ctrl_c() => break signal.map_err(CliError::from),
            Some((device, snapshot)) = updates.next() => {
                let update = Update { device: &device, snapshot: &snapshot };
                if let Err(err) = print_json(&update) {
                    break Err(err);
                }
            }
        }
    };

    log.info("shutting down");
    group.shutdown_all().await;
    result
}
