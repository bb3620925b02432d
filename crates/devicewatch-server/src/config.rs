//! Configuration loading and validation for the devicewatch server

use crate::types::ServerConfig;
use reachability::{ProbeKind, ProbeSettings};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub probe: ProbeSection,

    #[serde(default)]
    pub broadcast: BroadcastSettings,

    #[serde(default)]
    pub metrics: MetricsSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub inventory: InventorySettings,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        self.scheduler.validate()?;
        self.probe.validate()?;
        self.broadcast.validate()?;
        self.metrics.validate()?;
        self.logging.validate()?;
        self.inventory.validate()?;
        Ok(())
    }
}

/// Sweep cadence
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SchedulerSettings {
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_sweep_interval")]
    pub interval: Duration,

    pub run_on_startup: bool,
}

/// Probe mechanism and concurrency limit
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ProbeSection {
    pub kind: ProbeKind,

    /// TCP port; ignored for ICMP
    #[validate(range(min = 1))]
    pub port: u16,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_probe_timeout")]
    pub timeout: Duration,

    #[validate(range(min = 0, max = 5))]
    pub retries: u32,

    #[validate(range(min = 1, max = 1000))]
    pub concurrency: usize,
}

/// Event delivery settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BroadcastSettings {
    #[validate(range(min = 1, max = 100000))]
    pub capacity: usize,

    #[validate(custom = "validate_socket_path")]
    pub socket: Option<String>,
}

/// Prometheus endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,

    #[validate(custom = "validate_listen_addr")]
    pub listen_addr: String,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct LoggingSettings {
    pub level: Option<String>,

    #[validate(custom = "validate_log_format")]
    pub format: Option<String>,
}

/// Devices loaded into the in-memory store at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct InventorySettings {
    #[serde(default)]
    #[validate]
    pub devices: Vec<SeedDevice>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SeedDevice {
    #[validate(length(min = 1))]
    pub name: String,

    #[serde(default)]
    pub address: Option<String>,

    /// Pushed in order, so the last entry ends up current
    #[serde(default)]
    #[validate]
    pub configurations: Vec<SeedConfiguration>,

    /// Revert to this version after pushing the history
    #[serde(default)]
    #[validate(range(min = 1))]
    pub current_version: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SeedConfiguration {
    #[validate(length(min = 1))]
    pub content: String,

    #[serde(default)]
    pub pushed_by: Option<String>,
}

// Default implementations

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            run_on_startup: true,
        }
    }
}

impl Default for ProbeSection {
    fn default() -> Self {
        let settings = ProbeSettings::default();
        Self {
            kind: settings.kind,
            port: settings.port,
            timeout: settings.timeout,
            retries: settings.retries,
            concurrency: 10,
        }
    }
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            capacity: 1024,
            socket: None,
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1:9477".to_string(),
        }
    }
}

// Custom validators

fn validate_sweep_interval(interval: &Duration) -> Result<(), ValidationError> {
    let secs = interval.as_secs();
    if secs < 1 || secs > 24 * 60 * 60 {
        return Err(ValidationError::new("sweep_interval_out_of_range"));
    }
    Ok(())
}

fn validate_probe_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    let millis = timeout.as_millis();
    if millis < 10 || millis > 60_000 {
        return Err(ValidationError::new("probe_timeout_out_of_range"));
    }
    Ok(())
}

fn validate_socket_path(path: &str) -> Result<(), ValidationError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("socket_path_empty"));
    }

    // Must be absolute path or relative (starting with ./)
    if !trimmed.starts_with('/') && !trimmed.starts_with("./") {
        return Err(ValidationError::new("socket_path_invalid_format"));
    }

    Ok(())
}

fn validate_listen_addr(addr: &str) -> Result<(), ValidationError> {
    addr.parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("listen_addr_invalid"))
}

fn validate_log_format(format: &str) -> Result<(), ValidationError> {
    match format {
        "text" | "json" => Ok(()),
        _ => Err(ValidationError::new("log_format_unknown")),
    }
}

// Configuration loading implementation

impl Config {
    /// Load configuration from default search paths
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)
            }
            None => {
                tracing::info!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load from an explicit path, which must exist
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        Self::load_from_file(path)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/devicewatch/devicewatch.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./devicewatch.yaml"));

        paths.into_iter().find(|p| p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/devicewatch/devicewatch.yaml"))
    }

    /// Convert to the runtime ServerConfig
    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig {
            sweep_interval: self.scheduler.interval,
            run_on_startup: self.scheduler.run_on_startup,
            probe: ProbeSettings {
                kind: self.probe.kind,
                port: self.probe.port,
                timeout: self.probe.timeout,
                retries: self.probe.retries,
            },
            probe_concurrency: self.probe.concurrency,
            broadcast_capacity: self.broadcast.capacity,
            subscriber_socket: self.broadcast.socket.clone(),
            metrics_enabled: self.metrics.enabled,
            metrics_listen_addr: self.metrics.listen_addr.clone(),
        }
    }
}
