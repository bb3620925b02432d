//! Unix-socket delivery of status change events as JSON lines.

use crate::broadcaster::ChannelBroadcaster;
use crate::metrics::MetricsRegistry;
use crate::types::DeviceStatusChanged;
use futures::SinkExt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::codec::{FramedWrite, LinesCodec};
use tracing::{debug, info, warn};

/// Accepts subscriber connections and streams every event to each of them
pub struct SubscriberSocket {
    socket_path: String,
    broadcaster: Arc<ChannelBroadcaster>,
    metrics: Option<Arc<MetricsRegistry>>,
    connected: Arc<AtomicUsize>,
}

impl SubscriberSocket {
    pub fn new(
        socket_path: String,
        broadcaster: Arc<ChannelBroadcaster>,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> Self {
        Self {
            socket_path,
            broadcaster,
            metrics,
            connected: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Bind the socket and serve clients until the task is dropped
    pub async fn run(self) -> common::Result<()> {
        // Stale socket from a previous run
        if Path::new(&self.socket_path).exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        info!(socket = %self.socket_path, "Subscriber socket listening");

        loop {
            let (stream, _) = listener.accept().await?;
            // Subscribe before spawning so no event published after accept is missed
            let events = self.broadcaster.subscribe();

            let total = self.connected.fetch_add(1, Ordering::SeqCst) + 1;
            self.report_subscribers(total);
            info!(subscribers = total, "Subscriber connected");

            let connected = self.connected.clone();
            let metrics = self.metrics.clone();
            tokio::spawn(async move {
                serve_client(stream, events).await;

                let total = connected.fetch_sub(1, Ordering::SeqCst) - 1;
                if let Some(ref m) = metrics {
                    m.set_subscribers(total);
                }
                info!(subscribers = total, "Subscriber disconnected");
            });
        }
    }

    fn report_subscribers(&self, count: usize) {
        if let Some(ref m) = self.metrics {
            m.set_subscribers(count);
        }
    }
}

async fn serve_client(stream: UnixStream, mut events: broadcast::Receiver<DeviceStatusChanged>) {
    let mut lines = FramedWrite::new(stream, LinesCodec::new());

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Subscriber lagging, events dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, device_id = event.device_id, "Failed to encode event");
                continue;
            }
        };

        if let Err(e) = lines.send(line).await {
            debug!(error = %e, "Subscriber write failed, dropping client");
            break;
        }
    }
}
