//! Persistence ports consumed by the monitoring and versioning core.

use crate::model::{
    Configuration, ConfigurationId, Device, DeviceId, NewConfiguration, Reachability,
};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,

    #[error("conflicting record: {0}")]
    Conflict(String),

    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// Snapshot of every known device
    async fn list_all(&self) -> RepositoryResult<Vec<Device>>;

    async fn find_by_id(&self, id: DeviceId) -> RepositoryResult<Device>;

    /// Insert or overwrite
    async fn save(&self, device: Device) -> RepositoryResult<()>;

    /// Atomically overwrite only the reachability fields.
    ///
    /// Returns the record as it was just before the write.
    async fn update_reachability(
        &self,
        id: DeviceId,
        reachability: Reachability,
    ) -> RepositoryResult<Device>;

    /// Atomically overwrite only the configuration pointer
    async fn set_current_configuration(
        &self,
        id: DeviceId,
        configuration: Option<ConfigurationId>,
    ) -> RepositoryResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigurationRepository: Send + Sync {
    /// Highest stored version for the device, if any
    async fn find_latest_version(&self, device_id: DeviceId) -> RepositoryResult<Option<u32>>;

    /// Store a new configuration; `Conflict` if the version already exists
    async fn create(&self, configuration: NewConfiguration) -> RepositoryResult<Configuration>;

    async fn find_current(&self, device_id: DeviceId) -> RepositoryResult<Option<Configuration>>;

    async fn find_by_id(&self, id: ConfigurationId) -> RepositoryResult<Configuration>;

    /// Overwrite an existing configuration; `NotFound` if it was never created
    async fn save(&self, configuration: Configuration) -> RepositoryResult<()>;

    /// Every configuration of the device, in no particular order
    async fn list_for_device(&self, device_id: DeviceId) -> RepositoryResult<Vec<Configuration>>;
}
