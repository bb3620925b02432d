//! In-memory implementation of the repository ports.

use crate::model::{
    Configuration, ConfigurationId, Device, DeviceId, NewConfiguration, Reachability,
};
use crate::repository::{
    ConfigurationRepository, DeviceRepository, RepositoryError, RepositoryResult,
};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU64, Ordering};

/// Device and configuration tables held in concurrent maps.
///
/// `(device_id, version)` is unique, mirroring the compound index a real
/// database would carry.
#[derive(Default)]
pub struct MemoryStore {
    devices: DashMap<DeviceId, Device>,
    configurations: DashMap<ConfigurationId, Configuration>,
    versions: DashMap<(DeviceId, u32), ConfigurationId>,
    next_device_id: AtomicU64,
    next_configuration_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new device and return it.
    pub fn add_device(&self, name: impl Into<String>, address: Option<String>) -> Device {
        let id = self.next_device_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut device = Device::new(id, name);
        device.address = address;
        self.devices.insert(id, device.clone());
        device
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

#[async_trait]
impl DeviceRepository for MemoryStore {
    async fn list_all(&self) -> RepositoryResult<Vec<Device>> {
        let mut devices: Vec<Device> = self.devices.iter().map(|e| e.value().clone()).collect();
        devices.sort_by_key(|d| d.id);
        Ok(devices)
    }

    async fn find_by_id(&self, id: DeviceId) -> RepositoryResult<Device> {
        self.devices
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(RepositoryError::NotFound)
    }

    async fn save(&self, device: Device) -> RepositoryResult<()> {
        self.devices.insert(device.id, device);
        Ok(())
    }

    async fn update_reachability(
        &self,
        id: DeviceId,
        reachability: Reachability,
    ) -> RepositoryResult<Device> {
        let mut entry = self.devices.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        let previous = entry.value().clone();
        reachability.apply_to(entry.value_mut());
        Ok(previous)
    }

    async fn set_current_configuration(
        &self,
        id: DeviceId,
        configuration: Option<ConfigurationId>,
    ) -> RepositoryResult<()> {
        let mut entry = self.devices.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        entry.current_configuration = configuration;
        Ok(())
    }
}

#[async_trait]
impl ConfigurationRepository for MemoryStore {
    async fn find_latest_version(&self, device_id: DeviceId) -> RepositoryResult<Option<u32>> {
        Ok(self
            .configurations
            .iter()
            .filter(|e| e.device_id == device_id)
            .map(|e| e.version)
            .max())
    }

    async fn create(&self, configuration: NewConfiguration) -> RepositoryResult<Configuration> {
        let key = (configuration.device_id, configuration.version);

        match self.versions.entry(key) {
            Entry::Occupied(_) => Err(RepositoryError::Conflict(format!(
                "device {} already has version {}",
                key.0, key.1
            ))),
            Entry::Vacant(slot) => {
                let id = self.next_configuration_id.fetch_add(1, Ordering::Relaxed) + 1;
                let stored = configuration.into_configuration(id);
                self.configurations.insert(id, stored.clone());
                slot.insert(id);
                Ok(stored)
            }
        }
    }

    async fn find_current(&self, device_id: DeviceId) -> RepositoryResult<Option<Configuration>> {
        Ok(self
            .configurations
            .iter()
            .find(|e| e.device_id == device_id && e.is_current)
            .map(|e| e.value().clone()))
    }

    async fn find_by_id(&self, id: ConfigurationId) -> RepositoryResult<Configuration> {
        self.configurations
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(RepositoryError::NotFound)
    }

    async fn save(&self, configuration: Configuration) -> RepositoryResult<()> {
        match self.configurations.get_mut(&configuration.id) {
            Some(mut existing) => {
                *existing = configuration;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn list_for_device(&self, device_id: DeviceId) -> RepositoryResult<Vec<Configuration>> {
        Ok(self
            .configurations
            .iter()
            .filter(|e| e.device_id == device_id)
            .map(|e| e.value().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;
    use tokio_test::{assert_err, assert_ok, block_on};

    fn new_config(device_id: DeviceId, version: u32) -> NewConfiguration {
        NewConfiguration {
            device_id,
            version,
            content: format!("hostname r{}", version),
            is_current: false,
            pushed_by: "System".to_string(),
            created_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn test_add_and_find_device() {
        let store = MemoryStore::new();
        let device = store.add_device("core-rtr", Some("10.0.0.1".to_string()));

        let found = DeviceRepository::find_by_id(&store, device.id).await.unwrap();
        assert_eq!(found, device);
        assert_eq!(store.device_count(), 1);
        assert_eq!(
            DeviceRepository::find_by_id(&store, 99).await,
            Err(RepositoryError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_list_all_is_ordered() {
        let store = MemoryStore::new();
        for name in ["a", "b", "c"] {
            store.add_device(name, None);
        }

        let names: Vec<_> = store.list_all().await.unwrap().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_field_scoped_device_writes() {
        let store = MemoryStore::new();
        let id = store.add_device("core-rtr", Some("10.0.0.1".to_string())).id;

        store.set_current_configuration(id, Some(3)).await.unwrap();
        let previous = store
            .update_reachability(
                id,
                Reachability {
                    online: true,
                    last_probe_time: Some(SystemTime::now()),
                    last_latency_ms: Some(1.5),
                },
            )
            .await
            .unwrap();
        assert!(!previous.online);
        assert_eq!(previous.current_configuration, Some(3));

        let stored = DeviceRepository::find_by_id(&store, id).await.unwrap();
        assert!(stored.online);
        assert_eq!(stored.last_latency_ms, Some(1.5));
        assert_eq!(stored.current_configuration, Some(3));

        assert_eq!(
            store.set_current_configuration(99, Some(1)).await,
            Err(RepositoryError::NotFound)
        );
    }

    #[test]
    fn test_duplicate_version_conflicts() {
        let store = MemoryStore::new();
        block_on(async {
            assert_ok!(store.create(new_config(1, 1)).await);

            let err = assert_err!(store.create(new_config(1, 1)).await);
            assert!(matches!(err, RepositoryError::Conflict(_)));

            // Same version on another device is fine
            assert_ok!(store.create(new_config(2, 1)).await);
            assert_eq!(assert_ok!(store.find_latest_version(1).await), Some(1));
            assert_eq!(assert_ok!(store.find_latest_version(3).await), None);
        });
    }

    #[test]
    fn test_save_unknown_configuration() {
        let store = MemoryStore::new();
        let ghost = new_config(1, 1).into_configuration(42);
        assert_eq!(
            block_on(ConfigurationRepository::save(&store, ghost)),
            Err(RepositoryError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_find_current() {
        let store = MemoryStore::new();
        let mut first = store.create(new_config(1, 1)).await.unwrap();
        assert_eq!(store.find_current(1).await.unwrap(), None);

        first.is_current = true;
        ConfigurationRepository::save(&store, first.clone()).await.unwrap();
        assert_eq!(store.find_current(1).await.unwrap(), Some(first));
    }
}
