use rand::Rng;
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

use crate::scheduler::transfer::{TransferOutcome, TransferRequest};

/// The worker invocation boundary: one call per admitted transfer.
///
/// The exact argument format and protocol handling belong to the external
/// url-copy executable; the core only passes the transfer coordinates and
/// reads back an outcome.
pub trait UrlCopyRunner: Send + Sync {
    fn run_transfer(&self, request: &TransferRequest) -> TransferOutcome;
}

/// Spawns the configured url-copy executable per transfer.
#[derive(Debug, Clone)]
pub struct ProcessUrlCopy {
    binary: String,
}

impl ProcessUrlCopy {
    pub fn new(binary: impl Into<String>) -> Self {
        ProcessUrlCopy { binary: binary.into() }
    }
}

impl UrlCopyRunner for ProcessUrlCopy {
    fn run_transfer(&self, request: &TransferRequest) -> TransferOutcome {
        let started = Instant::now();

        let mut command = Command::new(&self.binary);
        command
            .arg("--job-id")
            .arg(&request.job_id.id)
            .arg("--file-id")
            .arg(&request.file_id.id)
            .arg("--source")
            .arg(&request.source_url)
            .arg("--destination")
            .arg(&request.dest_url);

        if let Some(checksum) = &request.checksum {
            command.arg("--checksum").arg(checksum);
        }
        if let Some(token) = &request.source_space_token {
            command.arg("--source-space-token").arg(token);
        }
        if let Some(token) = &request.dest_space_token {
            command.arg("--dest-space-token").arg(token);
        }

        let output = match command.output() {
            Ok(output) => output,
            Err(e) => {
                return TransferOutcome::failed(started.elapsed(), format!("Could not spawn url-copy '{}': {}", self.binary, e));
            }
        };

        let duration = started.elapsed();

        if output.status.success() {
            // The executable reports observed throughput on its last stdout
            // line as "throughput=<MB/s>"; absence just means no sample.
            let throughput = String::from_utf8_lossy(&output.stdout)
                .lines()
                .rev()
                .find_map(|line| line.strip_prefix("throughput=").and_then(|v| v.trim().parse::<f64>().ok()))
                .unwrap_or(0.0);

            TransferOutcome::succeeded(duration, throughput)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.lines().last().unwrap_or("url-copy exited with failure").to_string();
            TransferOutcome::failed(duration, reason)
        }
    }
}

/// In-process stand-in for the url-copy executable, used by the demo binary
/// and the integration tests.
///
/// Outcomes are deterministic when `failure_rate` is zero: a transfer fails
/// exactly when its source URL contains `fail_marker`.
#[derive(Debug, Clone)]
pub struct MockUrlCopy {
    pub delay: Duration,
    pub failure_rate: f64,
    pub fail_marker: Option<String>,
}

impl MockUrlCopy {
    pub fn instant() -> Self {
        MockUrlCopy { delay: Duration::ZERO, failure_rate: 0.0, fail_marker: None }
    }

    pub fn with_delay(delay: Duration) -> Self {
        MockUrlCopy { delay, failure_rate: 0.0, fail_marker: None }
    }

    pub fn failing_on(marker: impl Into<String>) -> Self {
        MockUrlCopy { delay: Duration::ZERO, failure_rate: 0.0, fail_marker: Some(marker.into()) }
    }
}

impl UrlCopyRunner for MockUrlCopy {
    fn run_transfer(&self, request: &TransferRequest) -> TransferOutcome {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        let marker_hit = self.fail_marker.as_deref().is_some_and(|m| request.source_url.contains(m));
        let random_hit = self.failure_rate > 0.0 && rand::rng().random_bool(self.failure_rate.clamp(0.0, 1.0));

        if marker_hit || random_hit {
            TransferOutcome::failed(self.delay, format!("Simulated transfer failure for {}", request.file_id))
        } else {
            // A fixed synthetic rate keeps pair feedback exercised.
            TransferOutcome::succeeded(self.delay.max(Duration::from_millis(1)), 40.0)
        }
    }
}
