//! Saturation policies.
//!
//! When the admission protocol can neither start a worker nor enqueue a
//! task, it hands the task to the pool's rejection handler on the
//! submitting thread. The four standard policies are provided; anything
//! else can be expressed by implementing [`RejectionHandler`].

use std::sync::Arc;

use petrel_api::errors::RejectedExecutionError;
use petrel_api::task::Task;

use super::executor::ThreadPool;

/// Strategy consulted for tasks the pool cannot admit.
pub trait RejectionHandler<T: Task>: Send + Sync {
    /// Handles `task`. Invoked synchronously on the submitting thread;
    /// whatever this returns is the result of the `execute` call.
    fn rejected_execution(
        &self,
        task: Arc<T>,
        pool: &ThreadPool<T>,
    ) -> Result<(), RejectedExecutionError>;
}

/// Default policy: fail the submission with a [`RejectedExecutionError`].
#[derive(Debug, Default, Clone, Copy)]
pub struct AbortPolicy;

impl<T: Task> RejectionHandler<T> for AbortPolicy {
    fn rejected_execution(
        &self,
        _task: Arc<T>,
        pool: &ThreadPool<T>,
    ) -> Result<(), RejectedExecutionError> {
        Err(if pool.is_shutdown() {
            RejectedExecutionError::ShuttingDown
        } else {
            RejectedExecutionError::Saturated
        })
    }
}

/// Runs the rejected task directly on the submitting thread, providing
/// simple backpressure. Drops the task if the pool has been shut down.
#[derive(Debug, Default, Clone, Copy)]
pub struct CallerRunsPolicy;

impl<T: Task> RejectionHandler<T> for CallerRunsPolicy {
    fn rejected_execution(
        &self,
        task: Arc<T>,
        pool: &ThreadPool<T>,
    ) -> Result<(), RejectedExecutionError> {
        if !pool.is_shutdown() {
            task.run();
        }
        Ok(())
    }
}

/// Silently drops the rejected task.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardPolicy;

impl<T: Task> RejectionHandler<T> for DiscardPolicy {
    fn rejected_execution(
        &self,
        _task: Arc<T>,
        _pool: &ThreadPool<T>,
    ) -> Result<(), RejectedExecutionError> {
        Ok(())
    }
}

/// Drops the oldest queued task and retries the submission. Drops the task
/// if the pool has been shut down.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardOldestPolicy;

impl<T: Task> RejectionHandler<T> for DiscardOldestPolicy {
    fn rejected_execution(
        &self,
        task: Arc<T>,
        pool: &ThreadPool<T>,
    ) -> Result<(), RejectedExecutionError> {
        if !pool.is_shutdown() {
            pool.queue().try_take();
            return pool.execute(task);
        }
        Ok(())
    }
}
