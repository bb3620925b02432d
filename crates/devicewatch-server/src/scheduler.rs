//! Periodic reachability sweeps over the whole device inventory.

use crate::broadcaster::Broadcaster;
use crate::detector::StatusChangeDetector;
use crate::metrics::MetricsRegistry;
use inventory::{Device, DeviceId, DeviceRepository, RepositoryError};
use reachability::{ProbeOutcome, ProbeRunner, ProbeTarget};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("device {0} not found")]
    DeviceNotFound(DeviceId),

    #[error("device {0} has no network address")]
    NoAddress(DeviceId),
}

/// Counts for one completed sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub devices: usize,
    pub probed: usize,
    pub unaddressed: usize,
    /// Probed devices found reachable
    pub online: usize,
    /// Probed devices found unreachable
    pub offline: usize,
    pub transitions: usize,
    pub persist_failures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    Completed(SweepReport),
    /// Another sweep held the lock
    Skipped,
}

/// Drives sweeps on a fixed interval, never more than one at a time.
pub struct HealthCheckScheduler {
    devices: Arc<dyn DeviceRepository>,
    runner: ProbeRunner,
    broadcaster: Arc<dyn Broadcaster>,
    interval: Duration,
    sweep_lock: Arc<Mutex<()>>,
    metrics: Option<Arc<MetricsRegistry>>,
}

/// Running scheduler loop
pub struct SchedulerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    sweep_lock: Arc<Mutex<()>>,
}

impl SchedulerHandle {
    /// Stop ticking and wait for an in-flight sweep to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Scheduler loop ended abnormally");
        }
        let _idle = self.sweep_lock.lock().await;
        info!("Scheduler stopped");
    }
}

impl HealthCheckScheduler {
    pub fn new(
        devices: Arc<dyn DeviceRepository>,
        runner: ProbeRunner,
        broadcaster: Arc<dyn Broadcaster>,
        interval: Duration,
    ) -> Self {
        Self {
            devices,
            runner,
            broadcaster,
            interval,
            sweep_lock: Arc::new(Mutex::new(())),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Start the tick loop. With `run_on_startup` the first sweep fires
    /// immediately, otherwise after one interval.
    pub fn start(self: Arc<Self>, run_on_startup: bool) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let sweep_lock = self.sweep_lock.clone();

        let task = tokio::spawn(async move {
            let first = if run_on_startup {
                Instant::now()
            } else {
                Instant::now() + self.interval
            };
            let mut ticker = tokio::time::interval_at(first, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                interval_secs = self.interval.as_secs_f64(),
                run_on_startup,
                concurrency = self.runner.concurrency(),
                probe = self.runner.probe_name(),
                "Scheduler started"
            );

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => self.clone().on_tick(),
                }
            }
        });

        SchedulerHandle {
            cancel,
            task,
            sweep_lock,
        }
    }

    fn on_tick(self: Arc<Self>) {
        let Ok(guard) = self.sweep_lock.clone().try_lock_owned() else {
            warn!("Previous sweep still running, skipping tick");
            self.record_sweep("skipped", None);
            return;
        };

        tokio::spawn(async move {
            // Errors are logged inside; the next tick retries
            let _ = self.sweep().await;
            drop(guard);
        });
    }

    /// Run a sweep now unless one is already in progress.
    pub async fn sweep_now(&self) -> Result<SweepOutcome, SweepError> {
        let Ok(_guard) = self.sweep_lock.try_lock() else {
            debug!("Sweep requested while another is running");
            self.record_sweep("skipped", None);
            return Ok(SweepOutcome::Skipped);
        };

        self.sweep().await.map(SweepOutcome::Completed)
    }

    /// Probe a single device immediately and record the result.
    ///
    /// Runs outside the sweep lock; a concurrent sweep result for the same
    /// device is announced at most once.
    pub async fn probe_device(&self, device_id: DeviceId) -> Result<Device, SweepError> {
        let device = match self.devices.find_by_id(device_id).await {
            Ok(device) => device,
            Err(RepositoryError::NotFound) => return Err(SweepError::DeviceNotFound(device_id)),
            Err(e) => return Err(e.into()),
        };

        let address = device
            .probe_address()
            .ok_or(SweepError::NoAddress(device_id))?
            .to_string();

        let started = std::time::Instant::now();
        let outcome = self.runner.probe_one(&address).await;
        if let Some(ref m) = self.metrics {
            m.record_probe(outcome.reachable, started.elapsed());
        }
        debug!(device_id, address = %address, %outcome, "On-demand probe finished");

        let (device, _) = self.record(device_id, outcome, SystemTime::now()).await?;
        Ok(device)
    }

    async fn sweep(&self) -> Result<SweepReport, SweepError> {
        let started = std::time::Instant::now();

        let devices = match self.devices.list_all().await {
            Ok(devices) => devices,
            Err(e) => {
                error!(error = %e, "Failed to list devices, sweep aborted");
                self.record_sweep("failed", None);
                return Err(e.into());
            }
        };

        info!(devices = devices.len(), "Sweep started");

        let mut report = SweepReport {
            devices: devices.len(),
            ..SweepReport::default()
        };
        let mut targets = Vec::new();

        for device in devices {
            match device.probe_address() {
                Some(address) => targets.push(ProbeTarget::new(device.id, address)),
                None => {
                    report.unaddressed += 1;
                    if !StatusChangeDetector::needs_offline_write(&device) {
                        continue;
                    }
                    match self
                        .record(device.id, ProbeOutcome::unreachable(), SystemTime::now())
                        .await
                    {
                        Ok((_, true)) => report.transitions += 1,
                        Ok((_, false)) => {}
                        Err(_) => report.persist_failures += 1,
                    }
                }
            }
        }

        report.probed = targets.len();
        let tally = StdMutex::new(report);
        let tally = &tally;

        let summary = self
            .runner
            .run(targets, |probe| async move {
                if let Some(ref m) = self.metrics {
                    m.record_probe(probe.outcome.reachable, probe.elapsed);
                }
                debug!(
                    device_id = probe.key,
                    address = %probe.address,
                    outcome = %probe.outcome,
                    "Probe finished"
                );

                let reachable = probe.outcome.reachable;
                let recorded = self
                    .record(probe.key, probe.outcome, SystemTime::now())
                    .await;

                update(tally, |report| {
                    if reachable {
                        report.online += 1;
                    } else {
                        report.offline += 1;
                    }
                    match recorded {
                        Ok((_, true)) => report.transitions += 1,
                        Ok((_, false)) => {}
                        Err(_) => report.persist_failures += 1,
                    }
                });
            })
            .await;

        if summary.lost > 0 {
            warn!(lost = summary.lost, "Some probes did not report back");
        }

        let report = *tally.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = started.elapsed();

        if let Some(ref m) = self.metrics {
            m.set_device_counts(report.online, report.offline, report.unaddressed);
        }
        self.record_sweep("completed", Some(elapsed));

        info!(
            devices = report.devices,
            probed = report.probed,
            online = report.online,
            offline = report.offline,
            unaddressed = report.unaddressed,
            transitions = report.transitions,
            persist_failures = report.persist_failures,
            elapsed_ms = elapsed.as_millis() as u64,
            "Sweep finished"
        );

        Ok(report)
    }

    /// Store an outcome and publish on transition.
    ///
    /// The transition is decided against the record the write replaced, so
    /// overlapping writers for one device announce a flip once. Returns the
    /// stored device and whether an event was published. Nothing is
    /// published when the write fails.
    async fn record(
        &self,
        device_id: DeviceId,
        outcome: ProbeOutcome,
        at: SystemTime,
    ) -> Result<(Device, bool), RepositoryError> {
        let observed = StatusChangeDetector::observe(outcome, at);

        let mut device = match self.devices.update_reachability(device_id, observed).await {
            Ok(previous) => previous,
            Err(e) => {
                warn!(device_id, error = %e, "Failed to persist probe result");
                if let Some(ref m) = self.metrics {
                    m.record_persist_failure();
                }
                return Err(e);
            }
        };
        let event = StatusChangeDetector::transition(device_id, &device, &observed);
        observed.apply_to(&mut device);

        let Some(event) = event else {
            return Ok((device, false));
        };

        info!(
            device_id,
            name = %device.name,
            online = event.online,
            latency_ms = ?event.latency_ms,
            "Device status changed"
        );
        if let Some(ref m) = self.metrics {
            m.record_transition(event.online);
        }
        self.broadcaster.publish(event);
        Ok((device, true))
    }

    fn record_sweep(&self, result: &str, duration: Option<Duration>) {
        if let Some(ref m) = self.metrics {
            m.record_sweep(result, duration);
        }
    }
}

fn update(tally: &StdMutex<SweepReport>, f: impl FnOnce(&mut SweepReport)) {
    let mut report = tally.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut report);
}
