//! Devicewatch server
//!
//! Periodically probes every device in the inventory and tells subscribers
//! when a device goes online or offline.
//!
//! # Components
//!
//! - **Scheduler**: fires a sweep at startup and on a fixed interval, one at a time
//! - **Detector**: applies probe outcomes and spots online/offline transitions
//! - **Broadcaster**: fans transition events out to subscribers
//! - **Subscribers**: streams events as JSON lines over a Unix socket
//!
//! Configuration history lives in the `inventory` crate; the server only
//! shares its repositories with a [`inventory::ConfigVersionManager`].

pub mod broadcaster;
pub mod config;
pub mod detector;
pub mod http_server;
pub mod metrics;
pub mod scheduler;
pub mod seed;
pub mod server;
#[cfg(unix)]
pub mod subscribers;
pub mod types;

pub use broadcaster::{Broadcaster, ChannelBroadcaster};
pub use config::{Config, ConfigError};
pub use detector::StatusChangeDetector;
pub use http_server::MetricsServer;
pub use metrics::MetricsRegistry;
pub use scheduler::{HealthCheckScheduler, SchedulerHandle, SweepError, SweepOutcome, SweepReport};
pub use seed::{SeedError, seed_inventory};
pub use server::{DeviceWatchServer, RunningServer};
pub use types::{DeviceStatusChanged, ServerConfig};
