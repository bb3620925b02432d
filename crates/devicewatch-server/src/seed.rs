//! Populate the in-memory store from the `inventory` config section.

use crate::config::InventorySettings;
use inventory::{ConfigVersionManager, MemoryStore, VersionError};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("device {device}: {source}")]
    Version {
        device: String,
        #[source]
        source: VersionError,
    },

    #[error("device {device}: no configuration with version {version}")]
    UnknownVersion { device: String, version: u32 },
}

/// Register every seed device and replay its configuration history.
///
/// Histories go through the version manager so the single-current
/// invariant holds before the first sweep. Returns the number of devices added.
pub async fn seed_inventory(
    settings: &InventorySettings,
    store: &MemoryStore,
    versions: &ConfigVersionManager,
) -> Result<usize, SeedError> {
    for seed in &settings.devices {
        let device = store.add_device(seed.name.clone(), seed.address.clone());
        let wrap = |source| SeedError::Version {
            device: seed.name.clone(),
            source,
        };

        let mut pushed = Vec::with_capacity(seed.configurations.len());
        for configuration in &seed.configurations {
            let created = versions
                .push_configuration(
                    device.id,
                    configuration.content.clone(),
                    configuration.pushed_by.as_deref(),
                )
                .await
                .map_err(wrap)?;
            pushed.push(created);
        }

        if let Some(version) = seed.current_version {
            let target = pushed
                .iter()
                .find(|c| c.version == version)
                .ok_or_else(|| SeedError::UnknownVersion {
                    device: seed.name.clone(),
                    version,
                })?;
            versions
                .set_current(device.id, target.id)
                .await
                .map_err(wrap)?;
        }

        debug!(
            device_id = device.id,
            name = %seed.name,
            configurations = pushed.len(),
            "Seeded device"
        );
    }

    info!(devices = settings.devices.len(), "Inventory seeded");
    Ok(settings.devices.len())
}
