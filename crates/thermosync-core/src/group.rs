// ── Coordinator group ──
//
// One coordinator per configured device. The whole set is validated up
// front: if any entry is rejected, nothing is built and every device's
// failures are reported together.

use std::collections::HashSet;

use futures_util::future::join_all;
use indexmap::IndexMap;
use serde_json::Value;

use crate::client::DeviceClient;
use crate::config::ConfigEntry;
use crate::coordinator::Coordinator;
use crate::error::{ConfigurationError, CoreError};
use crate::logging::LoggerRegistry;
use crate::validate::{ValidationFailure, validate_config_entry};

pub struct CoordinatorGroup<C: DeviceClient> {
    coordinators: IndexMap<String, Coordinator<C>>,
}

impl<C: DeviceClient> CoordinatorGroup<C> {
    /// Validate every `(name, raw entry)` pair and build one coordinator
    /// each, with a client from `make_client`.
    pub fn build<I, F>(devices: I, registry: &LoggerRegistry, mut make_client: F) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = (String, Value)>,
        F: FnMut(&ConfigEntry) -> Result<C, CoreError>,
    {
        let log = registry.get("config");
        let mut entries = Vec::new();
        let mut rejected = Vec::new();
        let mut seen = HashSet::new();

        for (name, raw) in devices {
            match validate_config_entry(&raw) {
                Ok(entry) if !seen.insert(entry.device_id.clone()) => {
                    rejected.push(ConfigurationError {
                        failure: ValidationFailure::single(
                            "device_id",
                            format!("'{}' is already used by another device", entry.device_id),
                        ),
                        device: name,
                    });
                }
                Ok(entry) => entries.push((name, entry)),
                Err(failure) => rejected.push(ConfigurationError {
                    device: name,
                    failure,
                }),
            }
        }

        if !rejected.is_empty() {
            for rejection in &rejected {
                let log = log.with_context("device", &rejection.device);
                for error in rejection.failure.errors() {
                    log.with_context("field", &error.field)
                        .error(format!("invalid configuration: {}", error.reason));
                }
            }
            return Err(CoreError::Configurations(rejected));
        }

        let mut coordinators = IndexMap::with_capacity(entries.len());
        for (name, entry) in entries {
            let client = make_client(&entry)?;
            coordinators.insert(name, Coordinator::from_entry(entry, client, registry));
        }
        log.info(format!("{} device(s) configured", coordinators.len()));
        Ok(Self { coordinators })
    }

    pub async fn start_all(&self) -> Result<(), CoreError> {
        for coordinator in self.coordinators.values() {
            coordinator.start().await?;
        }
        Ok(())
    }

    /// Stop every poll loop and wait for all of them.
    pub async fn shutdown_all(&self) {
        join_all(self.coordinators.values().map(|c| c.shutdown())).await;
    }

    pub fn get(&self, name: &str) -> Option<&Coordinator<C>> {
        self.coordinators.get(name)
    }

    /// Coordinators in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Coordinator<C>)> {
        self.coordinators.iter().map(|(name, c)| (name.as_str(), c))
    }

    pub fn len(&self) -> usize {
        self.coordinators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinators.is_empty()
    }
}
