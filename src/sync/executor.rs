use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::error::{Error, Result};

/// A unit of work accepted by [`Executor`] and [`ExecutorPool`].
pub trait ExecutorTask: Send + 'static {
    /// Runs the work item. Returns `true` on success; a `false` result is
    /// tallied but never stops the executor.
    fn execute(&mut self) -> bool;
}

#[derive(Debug)]
struct ExecutorState<T> {
    items: VecDeque<T>,
    no_more_data: bool,
}

/// A single-thread work queue: items are executed strictly in arrival order
/// by a dedicated thread, which drains the queue and exits once
/// `no_more_data` is set and nothing is left.
pub struct Executor<T: ExecutorTask> {
    shared: Arc<(Mutex<ExecutorState<T>>, Condvar)>,
    handle: Option<JoinHandle<usize>>,
    name: String,
}

impl<T: ExecutorTask> Executor<T> {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let shared = Arc::new((Mutex::new(ExecutorState { items: VecDeque::new(), no_more_data: false }), Condvar::new()));

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || Self::run_loop(thread_shared))
            .map_err(|e| Error::WorkerSpawnError(e.to_string()))?;

        Ok(Executor { shared, handle: Some(handle), name })
    }

    fn run_loop(shared: Arc<(Mutex<ExecutorState<T>>, Condvar)>) -> usize {
        let (lock, cvar) = &*shared;
        let mut succeeded: usize = 0;

        loop {
            let next_item = {
                let mut state = lock.lock().unwrap();
                while state.items.is_empty() && !state.no_more_data {
                    state = cvar.wait(state).unwrap();
                }
                state.items.pop_front()
            };

            match next_item {
                Some(mut item) => {
                    // Execute outside the lock so producers never wait on a running item.
                    if item.execute() {
                        succeeded += 1;
                    } else {
                        log::warn!("Executor item failed on '{}'", thread::current().name().unwrap_or("executor"));
                    }
                }
                None => break, // no_more_data and drained
            }
        }

        succeeded
    }

    /// Enqueues an item. The private queue is unbounded, so this never blocks.
    pub fn put(&self, item: T) -> Result<()> {
        let (lock, cvar) = &*self.shared;
        let mut state = lock.lock().unwrap();

        if state.no_more_data {
            return Err(Error::QueueClosed);
        }

        state.items.push_back(item);
        cvar.notify_one();
        Ok(())
    }

    /// Signals the executor that no further items will arrive.
    pub fn no_more_data(&self) {
        let (lock, cvar) = &*self.shared;
        lock.lock().unwrap().no_more_data = true;
        cvar.notify_all();
    }

    /// Marks the queue closed, waits for the thread to drain it and returns
    /// the number of successfully executed items.
    pub fn join(&mut self) -> usize {
        self.no_more_data();

        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                log::error!("Executor thread '{}' panicked; its success count is lost", self.name);
                0
            }),
            None => 0,
        }
    }
}

impl<T: ExecutorTask> Drop for Executor<T> {
    fn drop(&mut self) {
        // An executor dropped without join must not strand its thread on the
        // queue wait; the thread is detached, not joined.
        self.no_more_data();
    }
}

/// A fixed set of [`Executor`]s with round-robin item placement.
///
/// Executors (and their threads) are created lazily the first time their
/// slot receives an item, so a pool sized for the worst case costs nothing
/// while the load stays small. Ordering is FIFO per shard only; no global
/// ordering is guaranteed.
pub struct ExecutorPool<T: ExecutorTask> {
    executors: Vec<Option<Executor<T>>>,
    index: usize,
    name: String,
}

impl<T: ExecutorTask> ExecutorPool<T> {
    pub fn new(size: usize, name: impl Into<String>) -> Self {
        assert!(size > 0, "an executor pool needs at least one slot");

        let mut executors = Vec::with_capacity(size);
        executors.resize_with(size, || None);

        ExecutorPool { executors, index: 0, name: name.into() }
    }

    pub fn size(&self) -> usize {
        self.executors.len()
    }

    /// Assigns the item to the current slot and advances the round-robin
    /// cursor. No item is lost and none is handed to two executors.
    pub fn put(&mut self, item: T) -> Result<()> {
        let slot = self.index;
        self.index = (self.index + 1) % self.executors.len();

        if self.executors[slot].is_none() {
            let executor = Executor::new(format!("{}-{}", self.name, slot))?;
            self.executors[slot] = Some(executor);
        }

        self.executors[slot].as_ref().expect("slot was just populated").put(item)
    }

    /// Marks every executor as done, joins all threads and returns the total
    /// number of successfully executed items.
    pub fn join(&mut self) -> usize {
        let mut succeeded = 0;

        for executor in self.executors.iter_mut().flatten() {
            succeeded += executor.join();
        }

        log::debug!("ExecutorPool '{}' joined, {} item(s) executed successfully", self.name, succeeded);
        succeeded
    }
}

