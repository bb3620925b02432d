//! Runtime configuration and event types for the devicewatch server.

use inventory::DeviceId;
use reachability::ProbeSettings;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Time between sweeps
    pub sweep_interval: Duration,

    /// Sweep once immediately at startup
    pub run_on_startup: bool,

    /// Probe mechanism and per-attempt timeout
    pub probe: ProbeSettings,

    /// Maximum probes in flight during a sweep
    pub probe_concurrency: usize,

    /// Broadcast channel buffer size
    pub broadcast_capacity: usize,

    /// Unix socket for JSON-lines event subscribers
    pub subscriber_socket: Option<String>,

    /// Serve Prometheus metrics
    pub metrics_enabled: bool,

    /// Metrics listen address
    pub metrics_listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(300),
            run_on_startup: true,
            probe: ProbeSettings::default(),
            probe_concurrency: 10,
            broadcast_capacity: 1024,
            subscriber_socket: None,
            metrics_enabled: false,
            metrics_listen_addr: "127.0.0.1:9477".to_string(),
        }
    }
}

/// Emitted when a device flips between online and offline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatusChanged {
    pub device_id: DeviceId,
    pub online: bool,
    #[serde(with = "humantime_serde")]
    pub last_probe_time: SystemTime,
    pub latency_ms: Option<f64>,
}
