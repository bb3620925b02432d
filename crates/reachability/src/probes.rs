//! Reachability probe implementations.

use crate::types::{ProbeKind, ProbeOutcome, ProbeSettings};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Extra time granted to the `ping` process on top of its own deadline.
const PING_GRACE: Duration = Duration::from_millis(500);

/// Reachability probe trait
///
/// Implementations must not panic or return errors: every failure is an
/// unreachable outcome.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Probe a single network address
    async fn probe(&self, address: &str) -> ProbeOutcome;

    /// Get the name of this probe
    fn name(&self) -> &str;
}

/// Build the probe described by `settings`.
pub fn from_settings(settings: &ProbeSettings) -> Arc<dyn Probe> {
    match settings.kind {
        ProbeKind::Icmp => Arc::new(PingProbe::new(settings.timeout, settings.retries)),
        ProbeKind::Tcp => Arc::new(TcpProbe::new(settings.port, settings.timeout, settings.retries)),
    }
}

/// Reject addresses that would be parsed as `ping` flags or are blank.
pub fn validate_address(address: &str) -> common::Result<()> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(common::Error::probe("empty address"));
    }
    if trimmed.starts_with('-') || trimmed.chars().any(char::is_whitespace) {
        return Err(common::Error::probe(format!("malformed address {:?}", address)));
    }
    Ok(())
}

/// ICMP probe backed by the system `ping` binary
pub struct PingProbe {
    program: String,
    timeout_duration: Duration,
    retries: u32,
}

impl PingProbe {
    /// Create a new ICMP probe
    pub fn new(timeout_duration: Duration, retries: u32) -> Self {
        Self {
            program: "ping".to_string(),
            timeout_duration,
            retries,
        }
    }

    /// Use a different `ping` executable
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    async fn attempt(&self, address: &str) -> ProbeOutcome {
        let mut command = Command::new(&self.program);
        command
            .args(ping_args(address, self.timeout_duration))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match timeout(self.timeout_duration + PING_GRACE, command.output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                if output.status.success() && has_echo_reply(&stdout) {
                    ProbeOutcome::reachable(parse_latency(&stdout))
                } else {
                    ProbeOutcome::unreachable()
                }
            }
            Ok(Err(e)) => {
                warn!(address, program = %self.program, error = %e, "Failed to run ping");
                ProbeOutcome::unreachable()
            }
            Err(_) => {
                debug!(address, "Ping timed out");
                ProbeOutcome::unreachable()
            }
        }
    }
}

#[async_trait]
impl Probe for PingProbe {
    async fn probe(&self, address: &str) -> ProbeOutcome {
        if let Err(e) = validate_address(address) {
            warn!(address, error = %e, "Refusing to ping address");
            return ProbeOutcome::unreachable();
        }

        for attempt in 0..=self.retries {
            let outcome = self.attempt(address).await;
            if outcome.reachable {
                debug!(address, attempt, latency_ms = ?outcome.latency_ms, "Ping successful");
                return outcome;
            }
        }

        debug!(address, attempts = self.retries + 1, "Ping failed");
        ProbeOutcome::unreachable()
    }

    fn name(&self) -> &str {
        "icmp"
    }
}

/// Command line for a single echo request with a per-attempt deadline.
fn ping_args(address: &str, deadline: Duration) -> Vec<String> {
    if cfg!(windows) {
        let millis = deadline.as_millis().max(1);
        vec!["-n".into(), "1".into(), "-w".into(), millis.to_string(), address.into()]
    } else if cfg!(target_os = "macos") {
        let millis = deadline.as_millis().max(1);
        vec!["-c".into(), "1".into(), "-W".into(), millis.to_string(), address.into()]
    } else {
        // iputils only accepts whole seconds here
        let secs = deadline.as_secs_f64().ceil().max(1.0) as u64;
        vec!["-c".into(), "1".into(), "-W".into(), secs.to_string(), address.into()]
    }
}

fn has_echo_reply(stdout: &str) -> bool {
    stdout.contains("bytes from") || stdout.contains("TTL=") || stdout.contains("ttl=")
}

/// Extract a round-trip time in milliseconds from `ping` output.
///
/// Reads the first `time=<n> ms` (or `time<n ms`) field, then falls back to
/// the average of a `min/avg/max` summary line.
pub fn parse_latency(stdout: &str) -> Option<f64> {
    for marker in ["time=", "time<"] {
        if let Some(idx) = stdout.find(marker) {
            if let Some(value) = leading_number(&stdout[idx + marker.len()..]) {
                return Some(value);
            }
        }
    }

    stdout
        .lines()
        .find(|line| line.contains("min/avg/max"))
        .and_then(|line| line.split('=').nth(1))
        .and_then(|values| values.trim().split('/').nth(1))
        .and_then(leading_number)
}

fn leading_number(text: &str) -> Option<f64> {
    let text = text.trim_start();
    let end = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    text[..end].parse().ok()
}

/// TCP connect probe
pub struct TcpProbe {
    port: u16,
    timeout_duration: Duration,
    retries: u32,
}

impl TcpProbe {
    /// Create a new TCP probe
    pub fn new(port: u16, timeout_duration: Duration, retries: u32) -> Self {
        Self {
            port,
            timeout_duration,
            retries,
        }
    }

    async fn attempt(&self, address: &str) -> ProbeOutcome {
        let start = Instant::now();

        match timeout(self.timeout_duration, TcpStream::connect((address, self.port))).await {
            Ok(Ok(_stream)) => {
                let latency = start.elapsed().as_secs_f64() * 1000.0;
                ProbeOutcome::reachable(Some(latency))
            }
            Ok(Err(e)) => {
                debug!(address, port = self.port, error = %e, "TCP connect failed");
                ProbeOutcome::unreachable()
            }
            Err(_) => {
                debug!(address, port = self.port, "TCP connect timed out");
                ProbeOutcome::unreachable()
            }
        }
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn probe(&self, address: &str) -> ProbeOutcome {
        for _ in 0..=self.retries {
            let outcome = self.attempt(address).await;
            if outcome.reachable {
                return outcome;
            }
        }
        ProbeOutcome::unreachable()
    }

    fn name(&self) -> &str {
        "tcp"
    }
}
