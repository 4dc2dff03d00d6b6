use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// A bounded, blocking double-ended queue used as the handoff point between
/// the scheduler (producer) and the worker pool (consumers).
///
/// `push` blocks while the queue is at capacity, `pop` blocks while it is
/// empty. Closing the queue wakes every blocked thread: producers observe
/// [`Error::QueueClosed`], consumers drain the remaining items and then
/// receive `None` instead of blocking forever.
#[derive(Debug)]
pub struct SynchronizedQueue<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> SynchronizedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "a zero-capacity queue can never accept an item");

        SynchronizedQueue {
            state: Mutex::new(QueueState { items: VecDeque::with_capacity(capacity), closed: false }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Appends an item at the tail, blocking while the queue is full.
    pub fn push(&self, item: T) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        while state.items.len() >= self.capacity && !state.closed {
            state = self.not_full.wait(state).unwrap();
        }

        if state.closed {
            return Err(Error::QueueClosed);
        }

        state.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Inserts an item at the head so it is consumed next. Same admission
    /// rules as [`SynchronizedQueue::push`].
    pub fn push_front(&self, item: T) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        while state.items.len() >= self.capacity && !state.closed {
            state = self.not_full.wait(state).unwrap();
        }

        if state.closed {
            return Err(Error::QueueClosed);
        }

        state.items.push_front(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes the head item, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and fully drained.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap();

        while state.items.is_empty() && !state.closed {
            state = self.not_empty.wait(state).unwrap();
        }

        match state.items.pop_front() {
            Some(item) => {
                self.not_full.notify_one();
                Some(item)
            }
            None => None, // closed and drained
        }
    }

    /// Like [`SynchronizedQueue::pop`], but gives up after `timeout` and
    /// returns `None` instead of blocking further.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();

        while state.items.is_empty() && !state.closed {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }

            let (next_state, wait_result) = self.not_empty.wait_timeout(state, remaining).unwrap();
            state = next_state;

            if wait_result.timed_out() && state.items.is_empty() {
                return None;
            }
        }

        match state.items.pop_front() {
            Some(item) => {
                self.not_full.notify_one();
                Some(item)
            }
            None => None,
        }
    }

    /// Marks the queue as closed and wakes every blocked producer and
    /// consumer. Items already queued remain poppable.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.state.lock().unwrap().items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
