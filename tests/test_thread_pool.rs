use fts_scheduler::error::Error;
use fts_scheduler::sync::thread_pool::{PoolTask, ThreadPool};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Per-worker context handed to every task a worker runs.
struct WorkerScratch {
    worker_id: usize,
    tasks_seen: usize,
}

struct SleepyTask {
    sleep: Duration,
    completed: Arc<AtomicUsize>,
}

impl PoolTask<WorkerScratch> for SleepyTask {
    fn run(&mut self, _ctx: &mut WorkerScratch) -> bool {
        thread::sleep(self.sleep);
        self.completed.fetch_add(1, Ordering::SeqCst);
        true
    }
}

/// Records (worker id, per-worker task ordinal) so context isolation is
/// observable from outside the pool.
struct ContextProbeTask {
    log: Arc<Mutex<Vec<(usize, usize)>>>,
}

impl PoolTask<WorkerScratch> for ContextProbeTask {
    fn run(&mut self, ctx: &mut WorkerScratch) -> bool {
        ctx.tasks_seen += 1;
        self.log.lock().unwrap().push((ctx.worker_id, ctx.tasks_seen));
        true
    }
}

fn scratch_factory(worker_id: usize) -> WorkerScratch {
    WorkerScratch { worker_id, tasks_seen: 0 }
}

/// Two workers over five 200 ms tasks should finish in about three task
/// lengths, not five: the pool must actually run tasks in parallel.
#[test]
fn test_pool_runs_tasks_in_parallel() {
    const TASK_SLEEP: Duration = Duration::from_millis(200);

    let completed = Arc::new(AtomicUsize::new(0));
    let mut pool = ThreadPool::new(2, 10, "sleepy-pool", scratch_factory).expect("pool must spawn its workers");

    let started = Instant::now();
    for _ in 0..5 {
        pool.start(SleepyTask { sleep: TASK_SLEEP, completed: Arc::clone(&completed) }).unwrap();
    }

    let report = pool.join();
    let elapsed = started.elapsed();

    assert_eq!(report.succeeded, 5, "all five tasks must complete");
    assert_eq!(completed.load(Ordering::SeqCst), 5);

    // Serial execution would need 1000 ms; ceil(5/2) rounds is 600 ms.
    assert!(elapsed < Duration::from_millis(950), "pool took {:?}, which is serial-execution territory", elapsed);
}

#[test]
fn test_worker_contexts_are_not_shared() {
    const WORKERS: usize = 3;
    const TASKS: usize = 30;

    let log = Arc::new(Mutex::new(Vec::new()));
    let mut pool = ThreadPool::new(WORKERS, TASKS, "ctx-pool", scratch_factory).expect("pool must spawn its workers");

    for _ in 0..TASKS {
        pool.start(ContextProbeTask { log: Arc::clone(&log) }).unwrap();
    }
    let report = pool.join();
    assert_eq!(report.succeeded, TASKS);

    // Each worker's ordinals must be the uninterrupted sequence 1..=k: a
    // shared or cross-mutated context would show gaps or duplicates.
    let mut per_worker: std::collections::HashMap<usize, Vec<usize>> = std::collections::HashMap::new();
    for (worker_id, ordinal) in log.lock().unwrap().iter() {
        assert!(*worker_id < WORKERS, "context carried an unknown worker id {}", worker_id);
        per_worker.entry(*worker_id).or_default().push(*ordinal);
    }

    let mut total = 0;
    for (worker_id, ordinals) in per_worker {
        let expected: Vec<usize> = (1..=ordinals.len()).collect();
        assert_eq!(ordinals, expected, "worker {} saw a non-private context", worker_id);
        total += ordinals.len();
    }
    assert_eq!(total, TASKS, "every task must run exactly once");
}

#[test]
fn test_interrupt_abandons_queued_tasks() {
    const TASK_SLEEP: Duration = Duration::from_millis(300);

    let completed = Arc::new(AtomicUsize::new(0));
    let mut pool = ThreadPool::new(1, 10, "interrupt-pool", scratch_factory).expect("pool must spawn its workers");

    for _ in 0..5 {
        pool.start(SleepyTask { sleep: TASK_SLEEP, completed: Arc::clone(&completed) }).unwrap();
    }

    // Let the single worker pick up the first task, then cancel.
    thread::sleep(Duration::from_millis(100));
    pool.interrupt();

    let report = pool.join();

    let executed = completed.load(Ordering::SeqCst);
    assert!(executed >= 1, "the in-flight task must be allowed to finish");
    assert!(executed < 5, "interruption must abandon tasks still in the queue, but all 5 ran");
    assert_eq!(report.succeeded, executed, "join counters must match actual executions");
}

#[test]
fn test_start_after_interrupt_is_rejected() {
    let completed = Arc::new(AtomicUsize::new(0));
    let mut pool = ThreadPool::new(1, 4, "rejecting-pool", scratch_factory).expect("pool must spawn its workers");

    pool.interrupt();

    let result = pool.start(SleepyTask { sleep: Duration::ZERO, completed: Arc::clone(&completed) });
    assert!(matches!(result, Err(Error::PoolInterrupted)), "an interrupted pool must reject new tasks");

    pool.join();
    assert_eq!(completed.load(Ordering::SeqCst), 0);
}

/// `start` must block on a full queue rather than drop work, and every
/// queued task still runs.
#[test]
fn test_backpressure_loses_no_tasks() {
    const TASKS: usize = 8;

    let completed = Arc::new(AtomicUsize::new(0));
    let mut pool = ThreadPool::new(1, 2, "backpressure-pool", scratch_factory).expect("pool must spawn its workers");

    for _ in 0..TASKS {
        // With queue capacity 2 and 50 ms tasks this blocks repeatedly.
        pool.start(SleepyTask { sleep: Duration::from_millis(50), completed: Arc::clone(&completed) }).unwrap();
    }

    let report = pool.join();
    assert_eq!(report.succeeded, TASKS, "backpressure must delay producers, never drop tasks");
    assert_eq!(completed.load(Ordering::SeqCst), TASKS);
}
