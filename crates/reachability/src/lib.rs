//! Network reachability probing for devicewatch.
//!
//! This crate provides the probe side of device monitoring:
//! - ICMP checks through the system `ping` binary
//! - TCP connect checks against a fixed port
//! - A runner that drives many probes with a hard cap on concurrency
//!
//! Probes never return errors. Timeouts, DNS failures and transport errors
//! all become [`ProbeOutcome::unreachable`].
//!
//! # Example
//!
//! ```no_run
//! use reachability::{PingProbe, ProbeRunner, ProbeTarget};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let probe = Arc::new(PingProbe::new(Duration::from_secs(2), 1));
//! let runner = ProbeRunner::new(probe, 10);
//!
//! let targets = vec![
//!     ProbeTarget::new(1u64, "10.0.0.1"),
//!     ProbeTarget::new(2u64, "10.0.0.2"),
//! ];
//!
//! runner
//!     .run(targets, |report| async move {
//!         println!("{} -> {}", report.address, report.outcome);
//!     })
//!     .await;
//! # }
//! ```

pub mod probes;
pub mod runner;
pub mod types;

pub use probes::{PingProbe, Probe, TcpProbe};
pub use runner::{ProbeReport, ProbeRunner, ProbeTarget, RunSummary};
pub use types::{ProbeKind, ProbeOutcome, ProbeSettings};
