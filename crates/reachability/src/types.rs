//! Probe types and settings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Result of a single reachability probe.
///
/// Probes never fail: transport errors, DNS failures and timeouts all
/// collapse into an unreachable outcome with no latency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    /// Whether the address answered
    pub reachable: bool,

    /// Round-trip time in milliseconds, when one could be measured
    pub latency_ms: Option<f64>,
}

impl ProbeOutcome {
    /// Create a reachable outcome
    pub fn reachable(latency_ms: Option<f64>) -> Self {
        Self {
            reachable: true,
            latency_ms,
        }
    }

    /// Create an unreachable outcome (latency is always absent)
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            latency_ms: None,
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.reachable, self.latency_ms) {
            (true, Some(ms)) => write!(f, "ONLINE ({:.1} ms)", ms),
            (true, None) => write!(f, "ONLINE"),
            (false, _) => write!(f, "OFFLINE"),
        }
    }
}

/// Probe mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// ICMP echo via the system `ping` binary
    Icmp,

    /// TCP connect to a fixed port
    Tcp,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeKind::Icmp => write!(f, "icmp"),
            ProbeKind::Tcp => write!(f, "tcp"),
        }
    }
}

/// Probe settings shared by every probe of a sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Probe mechanism
    pub kind: ProbeKind,

    /// Target port for TCP probes
    pub port: u16,

    /// Timeout for a single attempt
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Extra attempts after a failed one
    pub retries: u32,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            kind: ProbeKind::Icmp,
            port: 22,
            timeout: Duration::from_secs(2),
            retries: 1,
        }
    }
}
