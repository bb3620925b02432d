//! Main devicewatch server implementation.

use crate::broadcaster::ChannelBroadcaster;
use crate::http_server::MetricsServer;
use crate::metrics::MetricsRegistry;
use crate::scheduler::{HealthCheckScheduler, SchedulerHandle};
use crate::types::ServerConfig;
use common::Error;
use inventory::{ConfigVersionManager, ConfigurationRepository, DeviceRepository};
use reachability::{Probe, ProbeRunner};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Devicewatch server
pub struct DeviceWatchServer {
    config: ServerConfig,
    devices: Arc<dyn DeviceRepository>,
    versions: Arc<ConfigVersionManager>,
    probe: Option<Arc<dyn Probe>>,
}

/// Tasks of a started server
pub struct RunningServer {
    scheduler: Arc<HealthCheckScheduler>,
    handle: SchedulerHandle,
    broadcaster: Arc<ChannelBroadcaster>,
    metrics: Option<Arc<MetricsRegistry>>,
    metrics_addr: Option<SocketAddr>,
    metrics_task: Option<JoinHandle<()>>,
    stop: CancellationToken,
    background: Vec<JoinHandle<()>>,
}

impl RunningServer {
    pub fn scheduler(&self) -> &Arc<HealthCheckScheduler> {
        &self.scheduler
    }

    pub fn broadcaster(&self) -> &Arc<ChannelBroadcaster> {
        &self.broadcaster
    }

    pub fn metrics(&self) -> Option<&Arc<MetricsRegistry>> {
        self.metrics.as_ref()
    }

    /// Bound address of the metrics endpoint, when enabled
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    /// Stop the scheduler, drain the metrics endpoint, drop socket clients
    pub async fn shutdown(self) {
        self.handle.shutdown().await;
        self.stop.cancel();
        if let Some(task) = self.metrics_task {
            if let Err(e) = task.await {
                warn!(error = %e, "Metrics endpoint ended abnormally");
            }
        }
        for task in self.background {
            task.abort();
        }
        info!("Devicewatch server stopped");
    }
}

impl DeviceWatchServer {
    pub fn new(
        config: ServerConfig,
        devices: Arc<dyn DeviceRepository>,
        configurations: Arc<dyn ConfigurationRepository>,
    ) -> Self {
        let versions = Arc::new(ConfigVersionManager::new(devices.clone(), configurations));
        Self {
            config,
            devices,
            versions,
            probe: None,
        }
    }

    /// Use this probe instead of the one named by the configuration
    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Push / revert entry point sharing this server's repositories
    pub fn versions(&self) -> Arc<ConfigVersionManager> {
        self.versions.clone()
    }

    /// Verify the repository, wire the components and start every task.
    ///
    /// An unreachable device repository aborts startup.
    pub async fn start(&self) -> common::Result<RunningServer> {
        info!("Starting devicewatch server");

        if self.config.probe_concurrency == 0 || self.config.broadcast_capacity == 0 {
            return Err(Error::config(
                "probe concurrency and broadcast capacity must be at least 1",
            ));
        }

        let known = self
            .devices
            .list_all()
            .await
            .map_err(|e| Error::repository(format!("device repository unavailable: {e}")))?;
        info!(devices = known.len(), "Device repository reachable");

        let metrics = if self.config.metrics_enabled {
            info!("Metrics enabled on {}", self.config.metrics_listen_addr);
            Some(Arc::new(MetricsRegistry::new()))
        } else {
            info!("Metrics disabled");
            None
        };

        let broadcaster = Arc::new(ChannelBroadcaster::new(
            self.config.broadcast_capacity,
            metrics.clone(),
        ));

        let probe = match self.probe {
            Some(ref probe) => probe.clone(),
            None => reachability::probes::from_settings(&self.config.probe),
        };
        let runner = ProbeRunner::new(probe, self.config.probe_concurrency);

        let mut scheduler = HealthCheckScheduler::new(
            self.devices.clone(),
            runner,
            broadcaster.clone(),
            self.config.sweep_interval,
        );
        if let Some(ref registry) = metrics {
            scheduler = scheduler.with_metrics(registry.clone());
        }
        let scheduler = Arc::new(scheduler);

        let stop = CancellationToken::new();
        let mut background = Vec::new();

        let (metrics_addr, metrics_task) = match metrics {
            Some(ref registry) => {
                let server =
                    MetricsServer::bind(registry.clone(), &self.config.metrics_listen_addr).await?;
                let addr = server.local_addr()?;
                let shutdown = stop.clone();
                let task = tokio::spawn(async move {
                    if let Err(e) = server.serve(shutdown).await {
                        warn!(error = %e, "Metrics endpoint error");
                    }
                });
                (Some(addr), Some(task))
            }
            None => (None, None),
        };

        // Spawn subscriber socket (if configured)
        if let Some(ref path) = self.config.subscriber_socket {
            background.push(spawn_subscriber_socket(
                path.clone(),
                broadcaster.clone(),
                metrics.clone(),
            ));
        }

        let handle = scheduler.clone().start(self.config.run_on_startup);
        info!("All tasks spawned, server running");

        Ok(RunningServer {
            scheduler,
            handle,
            broadcaster,
            metrics,
            metrics_addr,
            metrics_task,
            stop,
            background,
        })
    }

    /// Run until ctrl-c
    pub async fn run(self) -> common::Result<()> {
        let running = self.start().await?;

        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");

        running.shutdown().await;
        Ok(())
    }
}

#[cfg(unix)]
fn spawn_subscriber_socket(
    path: String,
    broadcaster: Arc<ChannelBroadcaster>,
    metrics: Option<Arc<MetricsRegistry>>,
) -> JoinHandle<()> {
    let socket = crate::subscribers::SubscriberSocket::new(path, broadcaster, metrics);
    tokio::spawn(async move {
        if let Err(e) = socket.run().await {
            warn!(error = %e, "Subscriber socket error");
        }
    })
}

#[cfg(not(unix))]
fn spawn_subscriber_socket(
    path: String,
    _broadcaster: Arc<ChannelBroadcaster>,
    _metrics: Option<Arc<MetricsRegistry>>,
) -> JoinHandle<()> {
    warn!(socket = %path, "Subscriber sockets need Unix domain sockets, ignoring");
    tokio::spawn(async {})
}
