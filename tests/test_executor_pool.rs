use fts_scheduler::sync::executor::{Executor, ExecutorPool, ExecutorTask};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// Records which thread executed it and in which order, so shard placement
/// and per-shard FIFO can be asserted after the fact.
struct RecordingTask {
    id: usize,
    succeed: bool,
    log: Arc<Mutex<Vec<(usize, String)>>>,
    counter: Arc<AtomicUsize>,
}

impl RecordingTask {
    fn new(id: usize, log: Arc<Mutex<Vec<(usize, String)>>>, counter: Arc<AtomicUsize>) -> Self {
        RecordingTask { id, succeed: true, log, counter }
    }
}

impl ExecutorTask for RecordingTask {
    fn execute(&mut self) -> bool {
        let thread_name = thread::current().name().unwrap_or("unnamed").to_string();
        self.log.lock().unwrap().push((self.id, thread_name));
        self.counter.fetch_add(1, Ordering::SeqCst);
        self.succeed
    }
}

#[test]
fn test_single_executor_runs_items_in_fifo_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let counter = Arc::new(AtomicUsize::new(0));

    let mut executor = Executor::new("fifo-executor").expect("executor thread must spawn");
    for id in 0..50 {
        executor.put(RecordingTask::new(id, Arc::clone(&log), Arc::clone(&counter))).unwrap();
    }

    let succeeded = executor.join();
    assert_eq!(succeeded, 50, "every item must execute exactly once");

    let executed_ids: Vec<usize> = log.lock().unwrap().iter().map(|(id, _)| *id).collect();
    let expected: Vec<usize> = (0..50).collect();
    assert_eq!(executed_ids, expected, "a single executor must preserve arrival order");
}

#[test]
fn test_pool_round_robin_distribution() {
    const POOL_SIZE: usize = 3;

    let log = Arc::new(Mutex::new(Vec::new()));
    let counter = Arc::new(AtomicUsize::new(0));

    let mut pool = ExecutorPool::new(POOL_SIZE, "rr-pool");
    for id in 0..7 {
        pool.put(RecordingTask::new(id, Arc::clone(&log), Arc::clone(&counter))).unwrap();
    }
    pool.join();

    // Map each item id to the executor thread that ran it.
    let mut shard_of = vec![String::new(); 7];
    for (id, thread_name) in log.lock().unwrap().iter() {
        shard_of[*id] = thread_name.clone();
    }

    assert_ne!(shard_of[0], shard_of[1], "items 0 and 1 must land on distinct executors");
    assert_ne!(shard_of[1], shard_of[2], "items 1 and 2 must land on distinct executors");
    assert_ne!(shard_of[0], shard_of[2], "items 0 and 2 must land on distinct executors");

    assert_eq!(shard_of[3], shard_of[0], "item N must wrap back onto executor 0");
    assert_eq!(shard_of[4], shard_of[1], "round-robin must continue past the wrap");
    assert_eq!(shard_of[6], shard_of[0], "the cursor must keep cycling");
}

#[test]
fn test_pool_loses_no_items_and_runs_none_twice() {
    const ITEMS: usize = 200;

    let log = Arc::new(Mutex::new(Vec::new()));
    let counter = Arc::new(AtomicUsize::new(0));

    let mut pool = ExecutorPool::new(4, "no-loss-pool");
    for id in 0..ITEMS {
        pool.put(RecordingTask::new(id, Arc::clone(&log), Arc::clone(&counter))).unwrap();
    }

    let succeeded = pool.join();

    assert_eq!(succeeded, ITEMS, "join must report every successful item");
    assert_eq!(counter.load(Ordering::SeqCst), ITEMS, "every item must execute exactly once");

    let mut executed_ids: Vec<usize> = log.lock().unwrap().iter().map(|(id, _)| *id).collect();
    executed_ids.sort_unstable();
    let expected: Vec<usize> = (0..ITEMS).collect();
    assert_eq!(executed_ids, expected, "no item may be dropped or duplicated");
}

#[test]
fn test_per_shard_fifo_holds_across_the_pool() {
    const POOL_SIZE: usize = 3;
    const ITEMS: usize = 60;

    let log = Arc::new(Mutex::new(Vec::new()));
    let counter = Arc::new(AtomicUsize::new(0));

    let mut pool = ExecutorPool::new(POOL_SIZE, "shard-fifo-pool");
    for id in 0..ITEMS {
        pool.put(RecordingTask::new(id, Arc::clone(&log), Arc::clone(&counter))).unwrap();
    }
    pool.join();

    // Within each executor thread the recorded ids must be increasing;
    // across threads no ordering is promised.
    let mut per_shard: std::collections::HashMap<String, Vec<usize>> = std::collections::HashMap::new();
    for (id, thread_name) in log.lock().unwrap().iter() {
        per_shard.entry(thread_name.clone()).or_default().push(*id);
    }

    assert_eq!(per_shard.len(), POOL_SIZE, "all executor slots should have been used");
    for (shard, ids) in per_shard {
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted, "shard '{}' executed items out of arrival order", shard);
    }
}

#[test]
fn test_join_tallies_failures_separately() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let counter = Arc::new(AtomicUsize::new(0));

    let mut pool = ExecutorPool::new(2, "tally-pool");
    for id in 0..10 {
        let mut task = RecordingTask::new(id, Arc::clone(&log), Arc::clone(&counter));
        task.succeed = id % 3 != 0; // ids 0, 3, 6, 9 fail
        pool.put(task).unwrap();
    }

    let succeeded = pool.join();

    assert_eq!(succeeded, 6, "only successful items count towards the join total");
    assert_eq!(counter.load(Ordering::SeqCst), 10, "failed items still execute exactly once");
}

#[test]
fn test_put_after_join_is_rejected() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let counter = Arc::new(AtomicUsize::new(0));

    let mut executor = Executor::new("closed-executor").expect("executor thread must spawn");
    executor.put(RecordingTask::new(0, Arc::clone(&log), Arc::clone(&counter))).unwrap();
    executor.join();

    let result = executor.put(RecordingTask::new(1, log, counter));
    assert!(result.is_err(), "an executor marked no-more-data must reject new items");
}
