//! Device inventory and configuration history.
//!
//! - [`model`]: device and configuration records
//! - [`repository`]: persistence ports the core depends on
//! - [`memory`]: in-memory store implementing both ports
//! - [`versions`]: [`ConfigVersionManager`], the push / revert state machine

pub mod memory;
pub mod model;
pub mod repository;
pub mod versions;

pub use memory::MemoryStore;
pub use model::{
    Configuration, ConfigurationId, Device, DeviceId, NewConfiguration, Reachability,
};
pub use repository::{ConfigurationRepository, DeviceRepository, RepositoryError, RepositoryResult};
pub use versions::{ConfigVersionManager, DEFAULT_PUSHED_BY, VersionError};
