use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::scheduler::ids::{FileId, JobId, SeId, VoId};
use crate::scheduler::transfer::{TransferRequest, TransferState};

/// Per-VO fair-share record, scoped to a storage pair or to the `*` -> `*`
/// wildcard pair. Mirrors the share configuration rows the legacy service
/// reads per round.
#[derive(Debug, Clone)]
pub struct ShareConfig {
    pub source: SeId,
    pub dest: SeId,
    pub vo: VoId,
    pub active: i64,
}

impl ShareConfig {
    pub fn wildcard(vo: VoId, active: i64) -> Self {
        ShareConfig { source: SeId::new("*"), dest: SeId::new("*"), vo, active }
    }

    fn matches(&self, source: &SeId, dest: &SeId, vo: &VoId) -> bool {
        if &self.vo != vo {
            return false;
        }
        let source_ok = self.source.id == "*" || &self.source == source;
        let dest_ok = self.dest.id == "*" || &self.dest == dest;
        source_ok && dest_ok
    }
}

/// Resolves the VO slot limit for a pair: a pair-specific share wins over the
/// wildcard share, and a VO without any share falls back to `default_limit`.
pub fn vo_limit(shares: &[ShareConfig], source: &SeId, dest: &SeId, vo: &VoId, default_limit: i64) -> i64 {
    let mut wildcard = None;

    for share in shares {
        if share.matches(source, dest, vo) {
            if share.source.id == "*" && share.dest.id == "*" {
                wildcard = Some(share.active);
            } else {
                return share.active;
            }
        }
    }

    wildcard.unwrap_or(default_limit)
}

/// The persistence boundary consumed by the scheduler core.
///
/// The durable schema is owned elsewhere; the core only needs candidate
/// queries and state-transition writes.
pub trait TransferStore: Send + Sync {
    /// All transfers currently in `SUBMITTED` state, eligible for admission.
    fn submitted_requests(&self) -> Result<Vec<TransferRequest>>;

    /// Every file transfer belonging to the given job.
    fn requests_for_job(&self, job: &JobId) -> Result<Vec<TransferRequest>>;

    /// Persists a state transition, with an optional reason for failures.
    fn update_request_state(&self, file: &FileId, state: TransferState, reason: Option<String>) -> Result<()>;

    /// Per-VO fair-share configuration, re-read each round.
    fn share_configs(&self) -> Result<Vec<ShareConfig>>;

    /// Startup consistency pass over the stored state.
    fn check_sanity(&self) -> Result<()>;
}

/// In-memory store backing the demo binary and the integration tests.
#[derive(Debug, Default)]
pub struct InMemoryTransferStore {
    requests: Mutex<HashMap<FileId, TransferRequest>>,
    shares: Mutex<Vec<ShareConfig>>,
}

impl InMemoryTransferStore {
    pub fn new() -> Self {
        InMemoryTransferStore::default()
    }

    pub fn insert(&self, request: TransferRequest) {
        self.requests.lock().unwrap().insert(request.file_id.clone(), request);
    }

    pub fn set_shares(&self, shares: Vec<ShareConfig>) {
        *self.shares.lock().unwrap() = shares;
    }

    pub fn state_of(&self, file: &FileId) -> Option<TransferState> {
        self.requests.lock().unwrap().get(file).map(|r| r.state)
    }

    /// Snapshot of how many transfers sit in each state, for assertions and
    /// the demo summary.
    pub fn counts_by_state(&self) -> HashMap<TransferState, usize> {
        let mut counts = HashMap::new();
        for request in self.requests.lock().unwrap().values() {
            *counts.entry(request.state).or_insert(0) += 1;
        }
        counts
    }
}

impl TransferStore for InMemoryTransferStore {
    fn submitted_requests(&self) -> Result<Vec<TransferRequest>> {
        let requests = self.requests.lock().unwrap();
        Ok(requests.values().filter(|r| r.state == TransferState::Submitted).cloned().collect())
    }

    fn requests_for_job(&self, job: &JobId) -> Result<Vec<TransferRequest>> {
        let requests = self.requests.lock().unwrap();
        Ok(requests.values().filter(|r| &r.job_id == job).cloned().collect())
    }

    fn update_request_state(&self, file: &FileId, state: TransferState, reason: Option<String>) -> Result<()> {
        let mut requests = self.requests.lock().unwrap();

        match requests.get_mut(file) {
            Some(request) => {
                log::debug!("Transfer {} transitions {} -> {}{}", file, request.state, state, reason.as_deref().map(|r| format!(" ({})", r)).unwrap_or_default());
                request.state = state;
                Ok(())
            }
            None => Err(Error::UnknownTransfer(file.clone())),
        }
    }

    fn share_configs(&self) -> Result<Vec<ShareConfig>> {
        Ok(self.shares.lock().unwrap().clone())
    }

    fn check_sanity(&self) -> Result<()> {
        // A transfer left ACTIVE or READY by a previous incarnation has no
        // worker attached anymore; reset it so it can be re-admitted.
        let mut requests = self.requests.lock().unwrap();
        let mut reset = 0;

        for request in requests.values_mut() {
            let orphaned = !request.state.is_terminal() && !matches!(request.state, TransferState::Submitted | TransferState::Staging);
            if orphaned {
                request.state = TransferState::Submitted;
                reset += 1;
            }
        }

        if reset > 0 {
            log::warn!("Sanity check reset {} orphaned transfer(s) to SUBMITTED", reset);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (SeId, SeId) {
        (SeId::new("se-src"), SeId::new("se-dst"))
    }

    #[test]
    fn pair_specific_share_wins_over_wildcard() {
        let (src, dst) = pair();
        let vo = VoId::new("atlas");

        let shares = vec![
            ShareConfig::wildcard(vo.clone(), 10),
            ShareConfig { source: src.clone(), dest: dst.clone(), vo: vo.clone(), active: 3 },
        ];

        assert_eq!(vo_limit(&shares, &src, &dst, &vo, 50), 3);
    }

    #[test]
    fn wildcard_share_applies_to_unlisted_pairs() {
        let (src, dst) = pair();
        let vo = VoId::new("atlas");

        let shares = vec![ShareConfig::wildcard(vo.clone(), 10)];
        assert_eq!(vo_limit(&shares, &src, &dst, &vo, 50), 10);
    }

    #[test]
    fn unconfigured_vo_falls_back_to_the_default() {
        let (src, dst) = pair();
        let shares = vec![ShareConfig::wildcard(VoId::new("atlas"), 10)];

        assert_eq!(vo_limit(&shares, &src, &dst, &VoId::new("cms"), 50), 50);
    }
}
