//! Deferred work queue for the cooperative pump.

use std::collections::VecDeque;

use parking_lot::Mutex;

pub(crate) type Job = Box<dyn FnOnce() + Send>;

/// FIFO queue of engine steps that must not run re-entrantly.
///
/// Host instantiation is queued rather than invoked inline, so a record is
/// fully registered and wired before its host callback can run, and a host
/// that calls back into the loader never re-enters itself.
/// [`Loader::run_until_idle`](crate::Loader::run_until_idle) drains this
/// queue; jobs pushed while draining run in the same drain.
pub(crate) struct JobQueue {
    queue: Mutex<VecDeque<Job>>,
}

impl JobQueue {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn push(&self, job: Job) {
        self.queue.lock().push_back(job);
    }

    pub(crate) fn pop(&self) -> Option<Job> {
        self.queue.lock().pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
