use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::flow::graph::{EdgeIndex, FlowGraph};
use crate::flow::solver::MaximumFlowSolver;
use crate::scheduler::ids::{FileId, SeId, VoId};
use crate::scheduler::persistence::{TransferStore, vo_limit};
use crate::scheduler::transfer::{QueueCompositeId, StoragePairState, TransferOutcome, TransferRequest, TransferState};
use crate::scheduler::url_copy::UrlCopyRunner;
use crate::service::base_service::BaseService;
use crate::sync::thread_pool::{PoolTask, ThreadPool};

/// Granularity at which the inter-round sleep re-checks the shutdown flag.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Completion message sent from a worker back to the scheduler thread.
///
/// `StoragePairState` is only ever mutated on the scheduler thread; workers
/// communicate exclusively through these messages.
#[derive(Debug)]
pub struct TransferFeedback {
    pub file_id: FileId,
    pub source_se: SeId,
    pub dest_se: SeId,
    pub outcome: TransferOutcome,
}

/// Private per-worker state built once at worker startup.
#[derive(Debug)]
pub struct WorkerContext {
    pub worker_name: String,
    pub transfers_run: usize,
}

/// One admitted transfer, executed on a pool worker.
pub struct TransferTask {
    request: TransferRequest,
    store: Arc<dyn TransferStore>,
    runner: Arc<dyn UrlCopyRunner>,
    feedback: Sender<TransferFeedback>,
}

impl PoolTask<WorkerContext> for TransferTask {
    fn run(&mut self, ctx: &mut WorkerContext) -> bool {
        ctx.transfers_run += 1;

        if let Err(e) = self.store.update_request_state(&self.request.file_id, TransferState::Active, None) {
            log::error!("{}: could not mark {} ACTIVE, failing the transfer: {}", ctx.worker_name, self.request.file_id, e);

            // The admission slot was already counted against the pair; the
            // transfer must still reach a terminal state and its completion
            // must still reach the scheduler, or the slot stays occupied
            // forever.
            let reason = format!("could not mark the transfer active: {}", e);
            if let Err(e) = self.store.update_request_state(&self.request.file_id, TransferState::Failed, Some(reason.clone())) {
                log::error!("{}: could not persist FAILED for {}: {}", ctx.worker_name, self.request.file_id, e);
            }
            self.send_feedback(TransferOutcome::failed(Duration::ZERO, reason));
            return false;
        }

        log::info!("{}: transferring {} ({} -> {})", ctx.worker_name, self.request.file_id, self.request.source_url, self.request.dest_url);
        let outcome = self.runner.run_transfer(&self.request);

        let final_state = if outcome.success { TransferState::Finished } else { TransferState::Failed };
        if let Err(e) = self.store.update_request_state(&self.request.file_id, final_state, outcome.error.clone()) {
            log::error!("{}: could not persist terminal state {} for {}: {}", ctx.worker_name, final_state, self.request.file_id, e);
        }

        let success = outcome.success;
        self.send_feedback(outcome);
        success
    }
}

impl TransferTask {
    fn send_feedback(&self, outcome: TransferOutcome) {
        let (source_se, dest_se) = self.request.pair();
        let feedback = TransferFeedback { file_id: self.request.file_id.clone(), source_se, dest_se, outcome };

        // The scheduler may already be gone during shutdown; feedback is then moot.
        let _ = self.feedback.send(feedback);
    }
}

/// Summary of one scheduling round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub pending: usize,
    pub admitted: usize,
    pub completed_successes: usize,
    pub completed_failures: usize,
}

/// The orchestrating dispatch loop.
///
/// Per round: fold in completion feedback, query pending transfers, build the
/// capacity graph (source -> VO -> pair -> sink), solve maximum flow, and
/// admit transfers up to each pair's computed slot count. Round-scoped
/// errors abort the round only; the loop keeps ticking.
pub struct Scheduler {
    config: SchedulerConfig,
    store: Arc<dyn TransferStore>,
    runner: Arc<dyn UrlCopyRunner>,
    pool: ThreadPool<TransferTask, WorkerContext>,
    pair_states: HashMap<(SeId, SeId), StoragePairState>,
    feedback_tx: Sender<TransferFeedback>,
    feedback_rx: Receiver<TransferFeedback>,
    shutdown: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, store: Arc<dyn TransferStore>, runner: Arc<dyn UrlCopyRunner>, shutdown: Arc<AtomicBool>) -> Result<Self> {
        config.validate()?;
        store.check_sanity()?;

        let (feedback_tx, feedback_rx) = mpsc::channel();

        let pool = ThreadPool::new(config.worker_count, config.queue_capacity, "url-copy-worker", |index| WorkerContext {
            worker_name: format!("url-copy-worker-{}", index),
            transfers_run: 0,
        })?;

        Ok(Scheduler { config, store, runner, pool, pair_states: HashMap::new(), feedback_tx, feedback_rx, shutdown })
    }

    /// Folds queued worker completions into the per-pair feedback state.
    fn drain_feedback(&mut self) -> (usize, usize) {
        let mut successes = 0;
        let mut failures = 0;

        while let Ok(feedback) = self.feedback_rx.try_recv() {
            let pair_state = self.pair_states.entry((feedback.source_se.clone(), feedback.dest_se.clone())).or_default();

            if feedback.outcome.success {
                pair_state.record_success(feedback.outcome.throughput_mbps);
                successes += 1;
            } else {
                pair_state.record_failure();
                failures += 1;
                log::warn!(
                    "Transfer {} on {} -> {} failed: {}",
                    feedback.file_id,
                    feedback.source_se,
                    feedback.dest_se,
                    feedback.outcome.error.as_deref().unwrap_or("unknown reason")
                );
            }

            pair_state.active_count = (pair_state.active_count - 1).max(0);
        }

        (successes, failures)
    }

    /// Executes one scheduling round. See the struct docs for the phases.
    pub fn run_round(&mut self) -> Result<RoundReport> {
        let (completed_successes, completed_failures) = self.drain_feedback();

        let pending = self.store.submitted_requests()?;
        if pending.is_empty() {
            return Ok(RoundReport { pending: 0, admitted: 0, completed_successes, completed_failures });
        }

        let shares = self.store.share_configs()?;

        // Group candidates by their logical queue. BTreeMap keeps the graph
        // build deterministic across rounds with identical input.
        let mut groups: BTreeMap<QueueCompositeId, Vec<TransferRequest>> = BTreeMap::new();
        for request in pending.iter() {
            groups.entry(request.composite_id()).or_default().push(request.clone());
        }

        // A pair serves several activities; demand in the flow graph is
        // aggregated per (VO, pair) across its queues.
        let mut demand: BTreeMap<(VoId, SeId, SeId), i64> = BTreeMap::new();
        for (queue_id, group) in &groups {
            *demand.entry((queue_id.vo.clone(), queue_id.source_se.clone(), queue_id.dest_se.clone())).or_insert(0) += group.len() as i64;
        }

        let vos: BTreeSet<VoId> = demand.keys().map(|(vo, _, _)| vo.clone()).collect();
        let pairs: BTreeSet<(SeId, SeId)> = demand.keys().map(|(_, src, dst)| (src.clone(), dst.clone())).collect();

        let mut graph = FlowGraph::new();
        let source = graph.add_node();

        let mut vo_nodes = BTreeMap::new();
        for vo in &vos {
            vo_nodes.insert(vo.clone(), graph.add_node());
        }

        let mut pair_nodes = BTreeMap::new();
        for pair in &pairs {
            pair_nodes.insert(pair.clone(), graph.add_node());
        }

        let sink = graph.add_node();

        let wildcard = SeId::new("*");
        for vo in &vos {
            let cap = vo_limit(&shares, &wildcard, &wildcard, vo, self.config.max_active_per_vo);
            graph.add_edge(source, vo_nodes[vo], cap)?;
        }

        let mut admission_edges: Vec<((VoId, SeId, SeId), EdgeIndex)> = Vec::new();
        for ((vo, src, dst), pending_count) in &demand {
            let pair_share = vo_limit(&shares, src, dst, vo, self.config.max_active_per_vo);
            let capacity = (*pending_count).min(pair_share);
            if capacity <= 0 {
                continue;
            }

            let edge = graph.add_edge(vo_nodes[vo], pair_nodes[&(src.clone(), dst.clone())], capacity)?;
            admission_edges.push(((vo.clone(), src.clone(), dst.clone()), edge));
        }

        for pair in &pairs {
            let pair_state = self.pair_states.entry(pair.clone()).or_default();
            let slots = pair_state.derated_slots(self.config.max_active_per_pair, self.config.min_success_rate);
            let remaining = slots - pair_state.active_count;

            // A saturated pair simply gets no sink edge this round.
            if remaining > 0 {
                graph.add_edge(pair_nodes[pair], sink, remaining)?;
            }
        }

        let mut solver = MaximumFlowSolver::new(graph, source, sink)?;
        let total_flow = solver.solve();
        let graph = solver.into_graph();

        let admitted = self.admit(&mut groups, &graph, &admission_edges)?;

        log::info!(
            "Scheduling round: {} pending, flow {}, {} admitted, {} finished, {} failed since last round",
            pending.len(),
            total_flow,
            admitted,
            completed_successes,
            completed_failures
        );

        Ok(RoundReport { pending: pending.len(), admitted, completed_successes, completed_failures })
    }

    /// Hands each (VO, pair) allocation to the worker pool,
    /// oldest/highest-priority first across that pair's activity queues.
    fn admit(
        &mut self,
        groups: &mut BTreeMap<QueueCompositeId, Vec<TransferRequest>>,
        graph: &FlowGraph,
        admission_edges: &[((VoId, SeId, SeId), EdgeIndex)],
    ) -> Result<usize> {
        let mut admitted = 0;

        for (key, edge_index) in admission_edges {
            let slots = graph.edge(*edge_index).flow;
            if slots <= 0 {
                continue;
            }

            let (vo, src, dst) = key;

            // Pull every queue belonging to this (VO, pair), regardless of activity.
            let mut candidates: Vec<TransferRequest> = Vec::new();
            let matching: Vec<QueueCompositeId> = groups
                .keys()
                .filter(|queue_id| &queue_id.vo == vo && &queue_id.source_se == src && &queue_id.dest_se == dst)
                .cloned()
                .collect();
            for queue_id in matching {
                if let Some(group) = groups.remove(&queue_id) {
                    candidates.extend(group);
                }
            }

            candidates.sort_by(|a, b| {
                b.priority.cmp(&a.priority).then(a.submitted_at.cmp(&b.submitted_at)).then(a.file_id.cmp(&b.file_id))
            });

            for mut request in candidates.into_iter().take(slots as usize) {
                self.store.update_request_state(&request.file_id, TransferState::Ready, None)?;
                request.state = TransferState::Ready;

                let task = TransferTask {
                    request,
                    store: Arc::clone(&self.store),
                    runner: Arc::clone(&self.runner),
                    feedback: self.feedback_tx.clone(),
                };

                if let Err(e) = self.pool.start(task) {
                    log::error!("Worker pool rejected an admitted transfer, stopping admissions this round: {}", e);
                    return Ok(admitted);
                }

                let pair_state = self.pair_states.entry((src.clone(), dst.clone())).or_default();
                pair_state.active_count += 1;
                admitted += 1;
            }
        }

        Ok(admitted)
    }

    /// Read access for tests and the demo summary.
    pub fn pair_state(&self, source: &SeId, dest: &SeId) -> Option<&StoragePairState> {
        self.pair_states.get(&(source.clone(), dest.clone()))
    }

    fn sleep_until_next_round(&self) {
        let mut remaining = Duration::from_millis(self.config.scheduling_interval_ms);

        while !remaining.is_zero() && !self.shutdown.load(Ordering::SeqCst) {
            let slice = remaining.min(SHUTDOWN_POLL_INTERVAL);
            thread::sleep(slice);
            remaining -= slice;
        }
    }
}

impl BaseService for Scheduler {
    fn name(&self) -> &str {
        "transfer-scheduler"
    }

    fn run_service(&mut self) -> Result<()> {
        log::info!("Transfer scheduler started with {} worker(s), round interval {} ms", self.config.worker_count, self.config.scheduling_interval_ms);

        while !self.shutdown.load(Ordering::SeqCst) {
            if let Err(e) = self.run_round() {
                // A failed round delays admissions; it never kills the loop.
                log::error!("Scheduling round aborted: {}", e);
            }

            self.sleep_until_next_round();
        }

        log::info!("Shutdown requested, draining worker pool");
        let report = self.pool.join();
        let (successes, failures) = self.drain_feedback();
        log::info!("Worker pool drained: {} succeeded, {} failed ({} / {} in final drain)", report.succeeded, report.failed, successes, failures);

        Ok(())
    }
}
