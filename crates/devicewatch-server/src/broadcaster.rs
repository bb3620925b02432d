//! Fan-out of device status changes to real-time subscribers.

use crate::metrics::MetricsRegistry;
use crate::types::DeviceStatusChanged;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Publishes status change events.
///
/// Fire-and-forget: implementations must not block the sweep and have no
/// way to report failure back to it.
pub trait Broadcaster: Send + Sync {
    fn publish(&self, event: DeviceStatusChanged);
}

/// Broadcaster backed by a `tokio::sync::broadcast` channel.
///
/// Slow subscribers lose the oldest events once the buffer is full.
pub struct ChannelBroadcaster {
    sender: broadcast::Sender<DeviceStatusChanged>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize, metrics: Option<Arc<MetricsRegistry>>) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, metrics }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceStatusChanged> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn publish(&self, event: DeviceStatusChanged) {
        let device_id = event.device_id;
        let online = event.online;

        if let Some(ref m) = self.metrics {
            m.record_event_published();
        }

        match self.sender.send(event) {
            Ok(receivers) => debug!(device_id, online, receivers, "Published status change"),
            // Only means nobody is listening right now
            Err(_) => debug!(device_id, online, "No subscribers for status change"),
        }
    }
}
