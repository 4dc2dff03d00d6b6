use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::scheduler::ids::{ActivityId, FileId, JobId, SeId, VoId};

/// Lifecycle state of a single file transfer.
///
/// The scheduler drives `Submitted -> Ready -> Active`; the worker completion
/// path drives `Active -> Finished | Failed`. `Canceled` and `Staging` are
/// set externally (user cancellation, tape bring-online) and are ignored by
/// the admission path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TransferState {
    Submitted,
    Ready,
    Active,
    Finished,
    Failed,
    Canceled,
    Staging,
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Finished | TransferState::Failed | TransferState::Canceled)
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TransferState::Submitted => "SUBMITTED",
            TransferState::Ready => "READY",
            TransferState::Active => "ACTIVE",
            TransferState::Finished => "FINISHED",
            TransferState::Failed => "FAILED",
            TransferState::Canceled => "CANCELED",
            TransferState::Staging => "STAGING",
        };
        write!(f, "{}", text)
    }
}

/// A single file transfer as the core sees it.
///
/// The durable record lives in persistence; this is the transient in-memory
/// copy held while the transfer is queued or running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub job_id: JobId,
    pub file_id: FileId,
    pub source_url: String,
    pub dest_url: String,
    pub source_se: SeId,
    pub dest_se: SeId,
    pub vo: VoId,
    pub user_dn: String,
    pub activity: ActivityId,
    pub priority: i32,
    pub checksum: Option<String>,
    pub source_space_token: Option<String>,
    pub dest_space_token: Option<String>,
    pub state: TransferState,

    /// Submission timestamp in milliseconds since the epoch; breaks priority
    /// ties oldest-first during admission.
    pub submitted_at: i64,
}

impl TransferRequest {
    pub fn pair(&self) -> (SeId, SeId) {
        (self.source_se.clone(), self.dest_se.clone())
    }

    pub fn composite_id(&self) -> QueueCompositeId {
        QueueCompositeId {
            vo: self.vo.clone(),
            source_se: self.source_se.clone(),
            dest_se: self.dest_se.clone(),
            activity: self.activity.clone(),
            state: self.state,
        }
    }
}

/// Composite identity of a logical per-pair/per-activity/per-state queue.
///
/// Used as a map key for counting pending and active transfers: a pair may
/// not have any persisted queue row yet, so the key is built from the
/// transfer itself rather than looked up.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueCompositeId {
    pub vo: VoId,
    pub source_se: SeId,
    pub dest_se: SeId,
    pub activity: ActivityId,
    pub state: TransferState,
}

/// Weight that controls smoothing of the per-pair success-rate average.
const SUCCESS_RATE_ALPHA: f64 = 0.25;

/// Rolling feedback for one (source, destination) storage pair.
///
/// Mutated only on the scheduler thread between rounds; worker completions
/// arrive as messages and are folded in before the next allocation.
#[derive(Debug, Clone)]
pub struct StoragePairState {
    /// Exponential moving average of transfer success, 0.0..=1.0.
    pub success_rate: f64,

    /// Mean observed throughput in MB/s over the recorded samples.
    pub throughput: f64,

    /// Mean throughput of transfers that succeeded after a failure was seen
    /// on this pair; kept separately so recovery is visible.
    pub retry_throughput: f64,

    /// Transfers currently admitted and not yet completed.
    pub active_count: i64,

    /// Number of throughput samples folded into the mean.
    pub throughput_samples: u64,

    failures_seen: bool,
}

impl Default for StoragePairState {
    fn default() -> Self {
        // A pair without history is trusted until it proves otherwise.
        StoragePairState { success_rate: 1.0, throughput: 0.0, retry_throughput: 0.0, active_count: 0, throughput_samples: 0, failures_seen: false }
    }
}

impl StoragePairState {
    pub fn record_success(&mut self, throughput_mbps: f64) {
        self.success_rate = self.success_rate * (1.0 - SUCCESS_RATE_ALPHA) + SUCCESS_RATE_ALPHA;

        if throughput_mbps > 0.0 {
            let samples = self.throughput_samples as f64;
            self.throughput = (self.throughput * samples + throughput_mbps) / (samples + 1.0);
            self.throughput_samples += 1;

            if self.failures_seen {
                self.retry_throughput = if self.retry_throughput > 0.0 { (self.retry_throughput + throughput_mbps) / 2.0 } else { throughput_mbps };
            }
        }
    }

    pub fn record_failure(&mut self) {
        self.success_rate *= 1.0 - SUCCESS_RATE_ALPHA;
        self.failures_seen = true;
    }

    /// Derates the configured per-pair slot limit by recent success rate.
    ///
    /// A pair below `min_success_rate` keeps a single probe slot so recovery
    /// can be observed; anything else scales linearly. The result never
    /// exceeds `max_slots` and never drops to zero.
    pub fn derated_slots(&self, max_slots: i64, min_success_rate: f64) -> i64 {
        if self.success_rate < min_success_rate {
            return 1;
        }

        let scaled = (max_slots as f64 * self.success_rate).floor() as i64;
        scaled.clamp(1, max_slots)
    }
}

/// Result of one url-copy invocation, reported back to the scheduler.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub success: bool,
    pub duration: Duration,
    pub throughput_mbps: f64,
    pub error: Option<String>,
}

impl TransferOutcome {
    pub fn succeeded(duration: Duration, throughput_mbps: f64) -> Self {
        TransferOutcome { success: true, duration, throughput_mbps, error: None }
    }

    pub fn failed(duration: Duration, error: impl Into<String>) -> Self {
        TransferOutcome { success: false, duration, throughput_mbps: 0.0, error: Some(error.into()) }
    }
}
