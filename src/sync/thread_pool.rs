use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::sync::bounded_queue::SynchronizedQueue;

/// How long a worker waits on the shared queue before re-checking the
/// interruption flag.
const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A unit of work accepted by [`ThreadPool`].
///
/// `C` is the per-worker context: built once per worker at startup by the
/// caller-supplied factory and handed to every task that worker runs. It is
/// never shared between workers.
pub trait PoolTask<C>: Send + 'static {
    /// Runs the task. Returns `true` on success; failures are tallied but
    /// never stop the pool.
    fn run(&mut self, ctx: &mut C) -> bool;
}

/// Per-pool counters returned by [`ThreadPool::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// A fixed-size pool of worker threads draining a shared bounded queue.
///
/// `start` applies backpressure through the bounded queue. `interrupt`
/// requests cooperative cancellation: workers check the flag between tasks
/// (never mid-task) and abandon whatever is still queued.
pub struct ThreadPool<T, C>
where
    T: PoolTask<C>,
    C: 'static,
{
    queue: Arc<SynchronizedQueue<T>>,
    workers: Vec<JoinHandle<PoolReport>>,
    interrupted: Arc<AtomicBool>,
    _context: PhantomData<C>,
}

impl<T, C> ThreadPool<T, C>
where
    T: PoolTask<C>,
    C: 'static,
{
    /// Spawns `worker_count` threads. `init` runs once on each worker thread
    /// to build that worker's private context.
    pub fn new<F>(worker_count: usize, queue_capacity: usize, name: impl Into<String>, init: F) -> Result<Self>
    where
        F: Fn(usize) -> C + Send + Sync + 'static,
    {
        assert!(worker_count > 0, "a thread pool needs at least one worker");

        let name = name.into();
        let queue = Arc::new(SynchronizedQueue::new(queue_capacity));
        let interrupted = Arc::new(AtomicBool::new(false));
        let init = Arc::new(init);

        let mut workers = Vec::with_capacity(worker_count);
        for worker_index in 0..worker_count {
            let queue = Arc::clone(&queue);
            let interrupted = Arc::clone(&interrupted);
            let init = Arc::clone(&init);

            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, worker_index))
                .spawn(move || Self::worker_loop(worker_index, queue, interrupted, init))
                .map_err(|e| Error::WorkerSpawnError(e.to_string()))?;

            workers.push(handle);
        }

        Ok(ThreadPool { queue, workers, interrupted, _context: PhantomData })
    }

    fn worker_loop<F>(worker_index: usize, queue: Arc<SynchronizedQueue<T>>, interrupted: Arc<AtomicBool>, init: Arc<F>) -> PoolReport
    where
        F: Fn(usize) -> C + Send + Sync + 'static,
    {
        let mut ctx = init(worker_index);
        let mut report = PoolReport::default();

        loop {
            // Interruption point: queued tasks past this check are abandoned.
            if interrupted.load(Ordering::SeqCst) {
                log::debug!("Worker {} interrupted, exiting with queued work abandoned", worker_index);
                break;
            }

            match queue.pop_timeout(WORKER_POLL_INTERVAL) {
                Some(mut task) => {
                    if task.run(&mut ctx) {
                        report.succeeded += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                None => {
                    // Either the poll timed out (keep looping) or the queue
                    // is closed and drained (work is done).
                    if queue.is_closed() {
                        break;
                    }
                }
            }
        }

        report
    }

    /// Enqueues a task, blocking while the shared queue is full.
    pub fn start(&self, task: T) -> Result<()> {
        if self.interrupted.load(Ordering::SeqCst) {
            return Err(Error::PoolInterrupted);
        }

        self.queue.push(task)
    }

    /// Requests cooperative cancellation. In-flight tasks finish; queued
    /// tasks are abandoned without being run.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        self.queue.close();
    }

    /// Closes the queue, waits for the workers to drain it and exit, and
    /// returns the accumulated success/failure counts.
    pub fn join(&mut self) -> PoolReport {
        self.queue.close();

        let mut total = PoolReport::default();
        for handle in self.workers.drain(..) {
            match handle.join() {
                Ok(report) => {
                    total.succeeded += report.succeeded;
                    total.failed += report.failed;
                }
                Err(_) => log::error!("A pool worker panicked; its counters are lost"),
            }
        }

        total
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

impl<T, C> Drop for ThreadPool<T, C>
where
    T: PoolTask<C>,
    C: 'static,
{
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.join();
        }
    }
}
