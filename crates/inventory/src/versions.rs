//! Configuration version history with a single current version per device.

use crate::model::{Configuration, ConfigurationId, Device, DeviceId, NewConfiguration};
use crate::repository::{ConfigurationRepository, DeviceRepository, RepositoryError};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Author recorded when a push does not name one.
pub const DEFAULT_PUSHED_BY: &str = "System";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("device {0} not found")]
    DeviceNotFound(DeviceId),

    #[error("configuration {0} not found for this device")]
    ConfigurationNotFound(ConfigurationId),

    #[error("version {version} already exists for device {device_id}")]
    Conflict { device_id: DeviceId, version: u32 },

    #[error("configuration content cannot be empty")]
    EmptyContent,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl VersionError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            VersionError::DeviceNotFound(_) | VersionError::ConfigurationNotFound(_)
        )
    }
}

/// Maintains each device's append-only configuration history.
///
/// Versions run 1..N without gaps and exactly one configuration of a device
/// with history is current, matching `Device::current_configuration`.
/// Mutations of the same device are serialized by a per-device lock held
/// across the whole read-then-write sequence.
pub struct ConfigVersionManager {
    devices: Arc<dyn DeviceRepository>,
    configurations: Arc<dyn ConfigurationRepository>,
    locks: DashMap<DeviceId, Arc<Mutex<()>>>,
}

impl ConfigVersionManager {
    pub fn new(
        devices: Arc<dyn DeviceRepository>,
        configurations: Arc<dyn ConfigurationRepository>,
    ) -> Self {
        Self {
            devices,
            configurations,
            locks: DashMap::new(),
        }
    }

    async fn find_device(&self, device_id: DeviceId) -> Result<Device, VersionError> {
        self.devices
            .find_by_id(device_id)
            .await
            .map_err(|e| device_error(e, device_id))
    }

    /// Only called for devices known to exist, so the map stays bounded by
    /// the inventory.
    fn lock_for(&self, device_id: DeviceId) -> Arc<Mutex<()>> {
        self.locks.entry(device_id).or_default().clone()
    }

    /// Append a new version and make it current.
    pub async fn push_configuration(
        &self,
        device_id: DeviceId,
        content: impl Into<String>,
        pushed_by: Option<&str>,
    ) -> Result<Configuration, VersionError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(VersionError::EmptyContent);
        }

        self.find_device(device_id).await?;
        let lock = self.lock_for(device_id);
        let _guard = lock.lock().await;

        let version = self
            .configurations
            .find_latest_version(device_id)
            .await?
            .map_or(1, |latest| latest + 1);
        let previous = self.configurations.find_current(device_id).await?;

        // Demote first: a failed create must never leave two current rows
        if let Some(prev) = &previous {
            self.configurations
                .save(Configuration {
                    is_current: false,
                    ..prev.clone()
                })
                .await?;
        }

        let new_configuration = NewConfiguration {
            device_id,
            version,
            content,
            is_current: true,
            pushed_by: pushed_by
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .unwrap_or(DEFAULT_PUSHED_BY)
                .to_string(),
            created_at: SystemTime::now(),
        };

        let created = match self.configurations.create(new_configuration).await {
            Ok(created) => created,
            Err(e) => {
                self.restore(previous.as_ref(), true).await;
                return Err(match e {
                    RepositoryError::Conflict(_) => VersionError::Conflict { device_id, version },
                    other => other.into(),
                });
            }
        };

        if let Err(e) = self
            .devices
            .set_current_configuration(device_id, Some(created.id))
            .await
        {
            self.restore(Some(&created), false).await;
            self.restore(previous.as_ref(), true).await;
            return Err(e.into());
        }

        info!(
            device_id,
            version,
            configuration_id = created.id,
            pushed_by = %created.pushed_by,
            "Configuration pushed"
        );
        Ok(created)
    }

    /// Make an existing version of the device current again.
    pub async fn set_current(
        &self,
        device_id: DeviceId,
        configuration_id: ConfigurationId,
    ) -> Result<Configuration, VersionError> {
        self.find_device(device_id).await?;
        let lock = self.lock_for(device_id);
        let _guard = lock.lock().await;

        // Re-read under the lock; a concurrent push may have moved the pointer
        let device = self.find_device(device_id).await?;

        let target = match self.configurations.find_by_id(configuration_id).await {
            Ok(found) if found.device_id == device_id => found,
            Ok(_) | Err(RepositoryError::NotFound) => {
                return Err(VersionError::ConfigurationNotFound(configuration_id));
            }
            Err(e) => return Err(e.into()),
        };

        let previous = self.configurations.find_current(device_id).await?;
        let already_current = previous.as_ref().is_some_and(|prev| prev.id == target.id);

        if !already_current {
            if let Some(prev) = &previous {
                self.configurations
                    .save(Configuration {
                        is_current: false,
                        ..prev.clone()
                    })
                    .await?;
            }

            let promoted = Configuration {
                is_current: true,
                ..target.clone()
            };
            if let Err(e) = self.configurations.save(promoted).await {
                self.restore(previous.as_ref(), true).await;
                return Err(e.into());
            }
        }

        if device.current_configuration != Some(target.id) {
            if let Err(e) = self
                .devices
                .set_current_configuration(device_id, Some(target.id))
                .await
            {
                if !already_current {
                    self.restore(Some(&target), false).await;
                    self.restore(previous.as_ref(), true).await;
                }
                return Err(e.into());
            }
        }

        info!(
            device_id,
            version = target.version,
            configuration_id = target.id,
            previous = ?previous.as_ref().map(|p| p.version),
            "Configuration set as current"
        );
        Ok(Configuration {
            is_current: true,
            ..target
        })
    }

    /// Full history of a device, newest version first.
    pub async fn list_configurations(
        &self,
        device_id: DeviceId,
    ) -> Result<Vec<Configuration>, VersionError> {
        self.find_device(device_id).await?;

        let mut history = self.configurations.list_for_device(device_id).await?;
        history.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(history)
    }

    pub async fn get_configuration(
        &self,
        configuration_id: ConfigurationId,
    ) -> Result<Configuration, VersionError> {
        match self.configurations.find_by_id(configuration_id).await {
            Ok(found) => Ok(found),
            Err(RepositoryError::NotFound) => {
                Err(VersionError::ConfigurationNotFound(configuration_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort compensation after a failed write.
    async fn restore(&self, configuration: Option<&Configuration>, is_current: bool) {
        let Some(configuration) = configuration else {
            return;
        };

        let restored = Configuration {
            is_current,
            ..configuration.clone()
        };
        match self.configurations.save(restored).await {
            Ok(()) => warn!(
                device_id = configuration.device_id,
                version = configuration.version,
                is_current,
                "Rolled back configuration flag"
            ),
            Err(e) => error!(
                device_id = configuration.device_id,
                version = configuration.version,
                error = %e,
                "Failed to roll back configuration flag"
            ),
        }
    }
}

fn device_error(e: RepositoryError, device_id: DeviceId) -> VersionError {
    match e {
        RepositoryError::NotFound => VersionError::DeviceNotFound(device_id),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::repository::{MockConfigurationRepository, MockDeviceRepository};

    fn stored(id: ConfigurationId, version: u32, is_current: bool) -> Configuration {
        Configuration {
            id,
            device_id: 1,
            version,
            content: format!("v{}", version),
            is_current,
            pushed_by: DEFAULT_PUSHED_BY.to_string(),
            created_at: SystemTime::now(),
        }
    }

    fn device_with_pointer(pointer: Option<ConfigurationId>) -> Device {
        Device {
            current_configuration: pointer,
            ..Device::new(1, "core-rtr")
        }
    }

    #[tokio::test]
    async fn test_empty_content_rejected() {
        let manager = ConfigVersionManager::new(
            Arc::new(MockDeviceRepository::new()),
            Arc::new(MockConfigurationRepository::new()),
        );

        let err = manager.push_configuration(1, "   ", None).await.unwrap_err();
        assert_eq!(err, VersionError::EmptyContent);
    }

    #[tokio::test]
    async fn test_conflict_restores_previous_current() {
        let mut devices = MockDeviceRepository::new();
        devices
            .expect_find_by_id()
            .returning(|_| Ok(device_with_pointer(Some(10))));
        devices.expect_set_current_configuration().never();

        let mut configs = MockConfigurationRepository::new();
        configs.expect_find_latest_version().returning(|_| Ok(Some(1)));
        configs
            .expect_find_current()
            .returning(|_| Ok(Some(stored(10, 1, true))));
        configs
            .expect_create()
            .returning(|_| Err(RepositoryError::Conflict("duplicate".into())));

        // Demote, then put the flag back after the failed create
        let mut seq = mockall::Sequence::new();
        configs
            .expect_save()
            .withf(|c| c.id == 10 && !c.is_current)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        configs
            .expect_save()
            .withf(|c| c.id == 10 && c.is_current)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let manager = ConfigVersionManager::new(Arc::new(devices), Arc::new(configs));
        let err = manager
            .push_configuration(1, "hostname core", Some("alice"))
            .await
            .unwrap_err();

        assert_eq!(err, VersionError::Conflict { device_id: 1, version: 2 });
    }

    #[tokio::test]
    async fn test_unavailable_device_repository_is_surfaced() {
        let mut devices = MockDeviceRepository::new();
        devices
            .expect_find_by_id()
            .returning(|_| Err(RepositoryError::Unavailable("db down".into())));

        let manager =
            ConfigVersionManager::new(Arc::new(devices), Arc::new(MockConfigurationRepository::new()));
        let err = manager.set_current(1, 10).await.unwrap_err();

        assert_eq!(
            err,
            VersionError::Repository(RepositoryError::Unavailable("db down".into()))
        );
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_pointer_save_failure_rolls_back_flags() {
        let mut devices = MockDeviceRepository::new();
        devices
            .expect_find_by_id()
            .returning(|_| Ok(device_with_pointer(Some(10))));
        devices
            .expect_set_current_configuration()
            .returning(|_, _| Err(RepositoryError::Unavailable("write failed".into())));

        let mut configs = MockConfigurationRepository::new();
        configs
            .expect_find_by_id()
            .returning(|_| Ok(stored(11, 2, false)));
        configs
            .expect_find_current()
            .returning(|_| Ok(Some(stored(10, 1, true))));

        let mut seq = mockall::Sequence::new();
        for (id, current) in [(10, false), (11, true), (11, false), (10, true)] {
            configs
                .expect_save()
                .withf(move |c| c.id == id && c.is_current == current)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
        }

        let manager = ConfigVersionManager::new(Arc::new(devices), Arc::new(configs));
        let err = manager.set_current(1, 11).await.unwrap_err();
        assert!(matches!(err, VersionError::Repository(_)));
    }

    #[tokio::test]
    async fn test_set_current_on_current_is_noop() {
        let mut devices = MockDeviceRepository::new();
        devices
            .expect_find_by_id()
            .returning(|_| Ok(device_with_pointer(Some(10))));
        devices.expect_set_current_configuration().never();

        let mut configs = MockConfigurationRepository::new();
        configs
            .expect_find_by_id()
            .returning(|_| Ok(stored(10, 1, true)));
        configs
            .expect_find_current()
            .returning(|_| Ok(Some(stored(10, 1, true))));
        configs.expect_save().never();

        let manager = ConfigVersionManager::new(Arc::new(devices), Arc::new(configs));
        let current = manager.set_current(1, 10).await.unwrap();
        assert!(current.is_current);
        assert_eq!(current.version, 1);
    }

    #[tokio::test]
    async fn test_unknown_device_leaves_no_lock_behind() {
        let store = Arc::new(MemoryStore::new());
        let known = store.add_device("core-rtr", None).id;
        let manager = ConfigVersionManager::new(store.clone(), store);

        for id in 900..950 {
            assert_eq!(
                manager.set_current(id, 1).await.unwrap_err(),
                VersionError::DeviceNotFound(id)
            );
            assert_eq!(
                manager.push_configuration(id, "hostname ghost", None).await.unwrap_err(),
                VersionError::DeviceNotFound(id)
            );
        }
        assert_eq!(manager.locks.len(), 0);

        manager.push_configuration(known, "hostname core", None).await.unwrap();
        assert_eq!(manager.locks.len(), 1);
    }
}
