//! Concurrency-limited probe runner.

use crate::probes::Probe;
use crate::types::ProbeOutcome;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// A device (or anything else) to probe, identified by `key`
#[derive(Debug, Clone)]
pub struct ProbeTarget<K> {
    pub key: K,
    pub address: String,
}

impl<K> ProbeTarget<K> {
    pub fn new(key: K, address: impl Into<String>) -> Self {
        Self {
            key,
            address: address.into(),
        }
    }
}

/// Result of probing one target
#[derive(Debug, Clone)]
pub struct ProbeReport<K> {
    pub key: K,
    pub address: String,
    pub outcome: ProbeOutcome,
    pub elapsed: Duration,
}

/// Counters for one runner pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub dispatched: usize,
    pub reachable: usize,
    pub unreachable: usize,
    /// Tasks whose report could not be recovered (runtime shutdown)
    pub lost: usize,
}

/// Runs probes over a target list with at most `concurrency` in flight.
///
/// Every target gets its own task, gated by a fair semaphore so dispatch
/// follows list order and a freed slot is taken by the next pending target
/// immediately. Reports are handed to the caller as each probe completes.
#[derive(Clone)]
pub struct ProbeRunner {
    probe: Arc<dyn Probe>,
    concurrency: usize,
}

impl ProbeRunner {
    /// Create a runner; a concurrency of zero is raised to one.
    pub fn new(probe: Arc<dyn Probe>, concurrency: usize) -> Self {
        Self {
            probe,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn probe_name(&self) -> &str {
        self.probe.name()
    }

    /// Probe every target, calling `on_report` for each completed probe.
    ///
    /// Returns once all dispatched probes have completed and their reports
    /// have been handled. Probe failures (including panics) become
    /// unreachable outcomes and are never propagated.
    pub async fn run<K, F, Fut>(&self, targets: Vec<ProbeTarget<K>>, mut on_report: F) -> RunSummary
    where
        K: Send + 'static,
        F: FnMut(ProbeReport<K>) -> Fut,
        Fut: Future<Output = ()>,
    {
        let slots = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut summary = RunSummary {
            dispatched: targets.len(),
            ..RunSummary::default()
        };

        debug!(
            targets = targets.len(),
            concurrency = self.concurrency,
            probe = self.probe.name(),
            "Dispatching probes"
        );

        for target in targets {
            let slots = slots.clone();
            let probe = self.probe.clone();

            tasks.spawn(async move {
                // The semaphore is never closed, so this only fails on shutdown
                let _slot = slots.acquire_owned().await.ok();
                let start = Instant::now();
                let outcome = guarded_probe(probe.as_ref(), &target.address).await;

                ProbeReport {
                    key: target.key,
                    address: target.address,
                    outcome,
                    elapsed: start.elapsed(),
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => {
                    if report.outcome.reachable {
                        summary.reachable += 1;
                    } else {
                        summary.unreachable += 1;
                    }
                    on_report(report).await;
                }
                Err(e) => {
                    error!(error = %e, "Probe task did not complete");
                    summary.lost += 1;
                }
            }
        }

        summary
    }

    /// Probe a single address outside of any sweep.
    pub async fn probe_one(&self, address: &str) -> ProbeOutcome {
        guarded_probe(self.probe.as_ref(), address).await
    }
}

async fn guarded_probe(probe: &dyn Probe, address: &str) -> ProbeOutcome {
    match AssertUnwindSafe(probe.probe(address)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(address, probe = probe.name(), "Probe panicked, treating as offline");
            ProbeOutcome::unreachable()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedProbe(ProbeOutcome);

    #[async_trait]
    impl Probe for FixedProbe {
        async fn probe(&self, _address: &str) -> ProbeOutcome {
            self.0
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[test]
    fn test_zero_concurrency_is_raised() {
        let runner = ProbeRunner::new(Arc::new(FixedProbe(ProbeOutcome::unreachable())), 0);
        assert_eq!(runner.concurrency(), 1);
    }

    #[tokio::test]
    async fn test_empty_target_list() {
        let runner = ProbeRunner::new(Arc::new(FixedProbe(ProbeOutcome::unreachable())), 4);
        let mut calls = 0;
        let summary = runner
            .run(Vec::<ProbeTarget<u64>>::new(), |_| {
                calls += 1;
                async {}
            })
            .await;

        assert_eq!(summary, RunSummary::default());
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn test_summary_counts() {
        let runner = ProbeRunner::new(Arc::new(FixedProbe(ProbeOutcome::reachable(Some(1.0)))), 2);
        let targets = (0..5u64)
            .map(|i| ProbeTarget::new(i, format!("10.0.0.{}", i)))
            .collect();

        let mut keys = Vec::new();
        let summary = runner
            .run(targets, |report| {
                keys.push(report.key);
                async {}
            })
            .await;

        keys.sort_unstable();
        assert_eq!(keys, vec![0, 1, 2, 3, 4]);
        assert_eq!(summary.dispatched, 5);
        assert_eq!(summary.reachable, 5);
        assert_eq!(summary.unreachable, 0);
    }
}
