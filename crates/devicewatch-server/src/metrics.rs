//! Prometheus metrics for the devicewatch server.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::time::Duration;

/// Labels for sweep metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SweepLabels {
    /// Result (completed, skipped, failed)
    pub result: String,
}

/// Labels for probe result metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ProbeLabels {
    /// Result (reachable, unreachable)
    pub result: String,
}

/// Labels for transition metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TransitionLabels {
    /// New state (online, offline)
    pub to: String,
}

/// Labels for device count metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DeviceStateLabels {
    /// State (online, offline, unaddressed)
    pub state: String,
}

/// Metrics registry with all devicewatch metrics
pub struct MetricsRegistry {
    registry: Registry,

    sweeps_total: Family<SweepLabels, Counter>,
    sweep_duration_seconds: Histogram,
    probes_total: Family<ProbeLabels, Counter>,
    probe_latency_seconds: Histogram,
    transitions_total: Family<TransitionLabels, Counter>,
    persist_failures_total: Counter,
    devices: Family<DeviceStateLabels, Gauge>,
    events_published_total: Counter,
    subscribers: Gauge,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let sweeps_total = Family::<SweepLabels, Counter>::default();
        registry.register(
            "devicewatch_sweeps",
            "Sweeps by result",
            sweeps_total.clone(),
        );

        // 10ms to ~20min
        let sweep_duration_seconds = Histogram::new(exponential_buckets(0.01, 2.0, 18));
        registry.register(
            "devicewatch_sweep_duration_seconds",
            "Duration of completed sweeps",
            sweep_duration_seconds.clone(),
        );

        let probes_total = Family::<ProbeLabels, Counter>::default();
        registry.register(
            "devicewatch_probes",
            "Probes performed by result",
            probes_total.clone(),
        );

        // 1ms to ~16s
        let probe_latency_seconds = Histogram::new(exponential_buckets(0.001, 2.0, 15));
        registry.register(
            "devicewatch_probe_latency_seconds",
            "Wall time of individual probes",
            probe_latency_seconds.clone(),
        );

        let transitions_total = Family::<TransitionLabels, Counter>::default();
        registry.register(
            "devicewatch_transitions",
            "Online/offline transitions",
            transitions_total.clone(),
        );

        let persist_failures_total = Counter::default();
        registry.register(
            "devicewatch_persist_failures",
            "Device writes that failed during a sweep",
            persist_failures_total.clone(),
        );

        let devices = Family::<DeviceStateLabels, Gauge>::default();
        registry.register(
            "devicewatch_devices",
            "Devices by state after the last sweep",
            devices.clone(),
        );

        let events_published_total = Counter::default();
        registry.register(
            "devicewatch_events_published",
            "Status change events handed to the broadcaster",
            events_published_total.clone(),
        );

        let subscribers = Gauge::default();
        registry.register(
            "devicewatch_subscribers",
            "Connected event subscribers",
            subscribers.clone(),
        );

        Self {
            registry,
            sweeps_total,
            sweep_duration_seconds,
            probes_total,
            probe_latency_seconds,
            transitions_total,
            persist_failures_total,
            devices,
            events_published_total,
            subscribers,
        }
    }

    /// Count a sweep attempt; `duration` is observed for completed sweeps
    /// Prometheus text exposition of every metric
    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }

    pub fn record_sweep(&self, result: &str, duration: Option<Duration>) {
        self.sweeps_total
            .get_or_create(&SweepLabels {
                result: result.to_string(),
            })
            .inc();

        if let Some(duration) = duration {
            self.sweep_duration_seconds.observe(duration.as_secs_f64());
        }
    }

    pub fn record_probe(&self, reachable: bool, elapsed: Duration) {
        let result = if reachable { "reachable" } else { "unreachable" };
        self.probes_total
            .get_or_create(&ProbeLabels {
                result: result.to_string(),
            })
            .inc();
        self.probe_latency_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn record_transition(&self, online: bool) {
        let to = if online { "online" } else { "offline" };
        self.transitions_total
            .get_or_create(&TransitionLabels { to: to.to_string() })
            .inc();
    }

    pub fn record_persist_failure(&self) {
        self.persist_failures_total.inc();
    }

    pub fn set_device_counts(&self, online: usize, offline: usize, unaddressed: usize) {
        for (state, count) in [
            ("online", online),
            ("offline", offline),
            ("unaddressed", unaddressed),
        ] {
            self.devices
                .get_or_create(&DeviceStateLabels {
                    state: state.to_string(),
                })
                .set(count as i64);
        }
    }

    pub fn record_event_published(&self) {
        self.events_published_total.inc();
    }

    pub fn set_subscribers(&self, count: usize) {
        self.subscribers.set(count as i64);
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
