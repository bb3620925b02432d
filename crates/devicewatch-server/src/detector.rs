//! Online/offline transition detection.

use crate::types::DeviceStatusChanged;
use inventory::{Device, DeviceId, Reachability};
use reachability::ProbeOutcome;
use std::time::SystemTime;

/// Decides whether a probe result is a notifiable transition.
pub struct StatusChangeDetector;

impl StatusChangeDetector {
    /// A transition exists iff the online flag differs. Latency changes alone
    /// never count.
    pub fn is_transition(previous: bool, observed: bool) -> bool {
        previous != observed
    }

    /// Reachability fields to store for a probe outcome
    pub fn observe(outcome: ProbeOutcome, at: SystemTime) -> Reachability {
        Reachability {
            online: outcome.reachable,
            last_probe_time: Some(at),
            last_latency_ms: if outcome.reachable {
                outcome.latency_ms
            } else {
                None
            },
        }
    }

    /// Event to publish when `observed` flips the stored online flag.
    ///
    /// `previous` must be the record the write replaced, not an earlier
    /// snapshot.
    pub fn transition(
        device_id: DeviceId,
        previous: &Device,
        observed: &Reachability,
    ) -> Option<DeviceStatusChanged> {
        let last_probe_time = observed.last_probe_time?;
        Self::is_transition(previous.online, observed.online).then(|| DeviceStatusChanged {
            device_id,
            online: observed.online,
            last_probe_time,
            latency_ms: observed.last_latency_ms,
        })
    }

    /// Whether an unaddressed device still needs to be written as offline.
    pub fn needs_offline_write(device: &Device) -> bool {
        device.online || device.last_latency_ms.is_some()
    }
}
