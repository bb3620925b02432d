//! Device and configuration records.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Device ID
pub type DeviceId = u64;

/// Configuration ID
pub type ConfigurationId = u64;

/// A managed network device.
///
/// Only the reachability fields and the configuration pointer are written
/// by devicewatch; everything else belongs to device management.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub address: Option<String>,
    pub online: bool,
    #[serde(default, with = "humantime_serde")]
    pub last_probe_time: Option<SystemTime>,
    pub last_latency_ms: Option<f64>,
    pub current_configuration: Option<ConfigurationId>,
}

impl Device {
    /// Create an offline device with no address and no history
    pub fn new(id: DeviceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            address: None,
            online: false,
            last_probe_time: None,
            last_latency_ms: None,
            current_configuration: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Address to probe, if the device has a non-blank one
    pub fn probe_address(&self) -> Option<&str> {
        self.address
            .as_deref()
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
    }
}

/// Result of one reachability check, as stored on the device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reachability {
    pub online: bool,
    pub last_probe_time: Option<SystemTime>,
    pub last_latency_ms: Option<f64>,
}

impl Reachability {
    pub fn apply_to(&self, device: &mut Device) {
        device.online = self.online;
        device.last_probe_time = self.last_probe_time;
        device.last_latency_ms = self.last_latency_ms;
    }
}

/// One version of a device's configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub id: ConfigurationId,
    pub device_id: DeviceId,
    pub version: u32,
    pub content: String,
    pub is_current: bool,
    pub pushed_by: String,
    #[serde(with = "humantime_serde")]
    pub created_at: SystemTime,
}

/// A configuration that has not been stored yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewConfiguration {
    pub device_id: DeviceId,
    pub version: u32,
    pub content: String,
    pub is_current: bool,
    pub pushed_by: String,
    pub created_at: SystemTime,
}

impl NewConfiguration {
    pub fn into_configuration(self, id: ConfigurationId) -> Configuration {
        Configuration {
            id,
            device_id: self.device_id,
            version: self.version,
            content: self.content,
            is_current: self.is_current,
            pushed_by: self.pushed_by,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_address() {
        assert_eq!(Device::new(1, "core-sw").probe_address(), None);
        assert_eq!(Device::new(1, "core-sw").with_address("").probe_address(), None);
        assert_eq!(Device::new(1, "core-sw").with_address("  ").probe_address(), None);
        assert_eq!(
            Device::new(1, "core-sw").with_address(" 10.0.0.1 ").probe_address(),
            Some("10.0.0.1")
        );
    }

    #[test]
    fn test_reachability_leaves_pointer_alone() {
        let mut device = Device {
            current_configuration: Some(4),
            ..Device::new(1, "core-sw")
        };
        let at = SystemTime::now();
        Reachability {
            online: true,
            last_probe_time: Some(at),
            last_latency_ms: Some(2.5),
        }
        .apply_to(&mut device);

        assert!(device.online);
        assert_eq!(device.last_probe_time, Some(at));
        assert_eq!(device.last_latency_ms, Some(2.5));
        assert_eq!(device.current_configuration, Some(4));
    }

    #[test]
    fn test_device_json() {
        let device = Device::new(7, "edge-fw").with_address("10.0.0.7");
        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["address"], "10.0.0.7");
        assert_eq!(json["online"], false);
        assert!(json["last_probe_time"].is_null());

        let back: Device = serde_json::from_value(json).unwrap();
        assert_eq!(back, device);
    }
}
