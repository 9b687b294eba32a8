//! Ordered job mailbox with a per-queue release callback.
//!
//! Every pipeline stage hands work to the next through a [`JobQueue`]. Items
//! leave a queue in exactly one of two ways: they are taken by a caller
//! (`dequeue`, `take_first`, ...) who then owns them, or they are flushed,
//! in which case the queue's release callback receives them. Dropping a
//! queue flushes whatever is left.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

type ReleaseFn<T> = Box<dyn Fn(T) + Send + Sync>;

struct QueueState<T> {
    items: VecDeque<T>,
    /// Bumped on every flush so blocked dequeuers can give up
    flush_epoch: u64,
}

/// Unbounded FIFO queue shared between threads
pub struct JobQueue<T> {
    name: &'static str,
    state: Mutex<QueueState<T>>,
    available: Condvar,
    release: ReleaseFn<T>,
}

impl<T> JobQueue<T> {
    /// Create a queue whose flushed items are passed to `release`
    pub fn new(name: &'static str, release: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            name,
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                flush_epoch: 0,
            }),
            available: Condvar::new(),
            release: Box::new(release),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, item: T) {
        self.lock().items.push_back(item);
        self.available.notify_one();
    }

    /// Remove the head. With `wait`, block until an item arrives or the queue is flushed.
    pub fn dequeue(&self, wait: bool) -> Option<T> {
        let mut state = self.lock();
        if !wait {
            return state.items.pop_front();
        }

        let epoch = state.flush_epoch;
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.flush_epoch != epoch {
                return None;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Remove the tail
    pub fn dequeue_last(&self) -> Option<T> {
        self.lock().items.pop_back()
    }

    /// Remove and return the first item matching `pred`, as one atomic step
    pub fn take_first(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        let mut state = self.lock();
        let pos = state.items.iter().position(pred)?;
        state.items.remove(pos)
    }

    /// Release every item matching `pred`; returns how many were released
    pub fn flush_matching(&self, pred: impl Fn(&T) -> bool) -> usize {
        let drained: Vec<T> = {
            let mut state = self.lock();
            let (matched, kept): (VecDeque<T>, VecDeque<T>) =
                state.items.drain(..).partition(|item| pred(item));
            state.items = kept;
            matched.into_iter().collect()
        };
        self.release_all(drained)
    }

    /// Release every item; returns how many were released
    pub fn flush(&self) -> usize {
        let drained: Vec<T> = {
            let mut state = self.lock();
            state.flush_epoch = state.flush_epoch.wrapping_add(1);
            state.items.drain(..).collect()
        };
        self.available.notify_all();
        self.release_all(drained)
    }

    fn release_all(&self, items: Vec<T>) -> usize {
        let count = items.len();
        if count > 0 {
            tracing::debug!("Flushing {} item(s) from {} queue", count, self.name);
        }
        items.into_iter().for_each(|item| (self.release)(item));
        count
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }
}

impl<T> Drop for JobQueue<T> {
    fn drop(&mut self) {
        self.flush();
    }
}
