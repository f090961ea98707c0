use std::sync::Arc;
use std::time::Duration;

use crate::errors::Interrupted;
use crate::interrupt::Interrupt;
use crate::task::Task;

/// Abstract blocking work queue feeding a pool's workers.
///
/// A queue instance is owned by exactly one pool for its whole lifetime.
/// Ordering is whatever the implementation guarantees; the executor imposes
/// none of its own. Tasks are identified by pointer, so `remove` matches by
/// `Arc::ptr_eq`, never by value.
pub trait WorkQueue<T: Task>: Send + Sync {
    /// Non-blocking insert. `false` when the queue is at capacity.
    fn offer(&self, task: Arc<T>) -> bool;

    /// Insert, waiting up to `timeout` for space. `false` on expiry.
    fn offer_timeout(&self, task: Arc<T>, timeout: Duration) -> bool;

    /// Removes and returns the next task, blocking until one is available
    /// or `signal` is raised (the raise is consumed).
    fn take(&self, signal: &Interrupt) -> Result<Arc<T>, Interrupted>;

    /// Like [`take`](Self::take) but gives up after `timeout`, returning
    /// `Ok(None)` on expiry.
    fn poll(&self, timeout: Duration, signal: &Interrupt) -> Result<Option<Arc<T>>, Interrupted>;

    /// Non-blocking remove of the next task.
    fn try_take(&self) -> Option<Arc<T>>;

    /// Number of queued tasks (a snapshot in time).
    fn len(&self) -> usize;

    /// Whether the queue is currently empty (a snapshot in time).
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes `task` if it is still queued, matching by pointer identity.
    fn remove(&self, task: &Arc<T>) -> bool;

    /// Removes and returns every queued task.
    fn drain(&self) -> Vec<Arc<T>>;

    /// Keeps only tasks for which `keep` returns `true`. Best-effort storage
    /// reclamation; never required for correctness.
    fn retain(&self, keep: &mut dyn FnMut(&Arc<T>) -> bool);
}
