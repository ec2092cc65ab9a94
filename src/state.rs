//! Per-destination queue state.
//!
//! Each destination owns one monitor: a mutex protecting its FIFO queue and
//! pending set, a condvar signaled when work arrives or the destination is
//! stopping, and a condvar signaled when an item completes. Destinations
//! never share state, so they never contend with each other.

use std::collections::{HashSet, VecDeque};
use std::sync::{Condvar, Mutex};

use crate::buffer::SourceToken;

/// A queued unit of work: one byte region bound for one destination.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WorkItem {
    pub token: SourceToken,
    pub addr: usize,
    pub len: usize,
}

/// Mutex-protected portion of a destination's state.
#[derive(Debug, Default)]
pub(crate) struct DestQueue {
    /// Items not yet picked up by the worker, in submission order.
    pub items: VecDeque<WorkItem>,
    /// Tokens queued or being written. Membership means the source memory
    /// is not yet safe to reuse.
    pub pending: HashSet<SourceToken>,
    /// Set once this destination's worker must exit after the queue empties.
    pub stopped: bool,
}

/// One destination's monitor. Shared between the dispatcher, the worker
/// thread, and drain callers.
#[derive(Debug, Default)]
pub(crate) struct DestState {
    pub queue: Mutex<DestQueue>,
    /// Signaled when an item is appended or the destination is stopping.
    pub work_cv: Condvar,
    /// Broadcast when an item completes (its token leaves the pending set).
    pub done_cv: Condvar,
}

impl DestState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Blocks until this destination's pending set is empty.
    pub(crate) fn wait_empty(&self) {
        let mut queue = self.queue.lock().unwrap();
        while !queue.pending.is_empty() {
            queue = self.done_cv.wait(queue).unwrap();
        }
    }

    /// Blocks until `token` is no longer pending on this destination.
    pub(crate) fn wait_token_clear(&self, token: SourceToken) {
        let mut queue = self.queue.lock().unwrap();
        while queue.pending.contains(&token) {
            queue = self.done_cv.wait(queue).unwrap();
        }
    }

    /// Marks the destination stopped and wakes the worker and any waiters.
    pub(crate) fn request_stop(&self) {
        {
            let mut queue = self.queue.lock().unwrap();
            queue.stopped = true;
        }
        self.work_cv.notify_all();
        self.done_cv.notify_all();
    }
}
