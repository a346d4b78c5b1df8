//! Rejection policies.
//!
//! When admission cannot place a task, the pool hands it to its
//! [`RejectionPolicy`]. Four standard policies are provided; embedders
//! can supply their own by implementing the trait.

use super::core::ThreadPool;
use crate::queue::TaskQueue;
use crate::task::Task;
use thiserror::Error;
use tracing::warn;

/// Raised when a task could not be placed and the policy chose to fail.
/// The rejected task rides along so the caller can retry or inspect it.
#[derive(Debug, Error)]
#[error("task {} rejected from pool `{pool}`", .task.id())]
pub struct RejectedError {
    /// The task that was not accepted.
    pub task: Task,
    /// Name of the rejecting pool.
    pub pool: String,
}

/// Strategy invoked when admission fails.
pub trait RejectionPolicy: Send + Sync {
    /// Decides what happens to a task the pool could not place.
    fn handle_rejection(&self, task: Task, pool: &ThreadPool) -> Result<(), RejectedError>;
}

/// Fails loudly, handing the task back in a [`RejectedError`]. The
/// default policy.
#[derive(Clone, Copy, Debug, Default)]
pub struct AbortPolicy;

impl RejectionPolicy for AbortPolicy {
    fn handle_rejection(&self, task: Task, pool: &ThreadPool) -> Result<(), RejectedError> {
        Err(RejectedError {
            task,
            pool: pool.name().to_string(),
        })
    }
}

/// Runs the task synchronously on the submitting thread, throttling the
/// submitter instead of dropping work. Once the pool is shut down the
/// task is dropped instead.
#[derive(Clone, Copy, Debug, Default)]
pub struct CallerRunsPolicy;

impl RejectionPolicy for CallerRunsPolicy {
    fn handle_rejection(&self, task: Task, pool: &ThreadPool) -> Result<(), RejectedError> {
        if !pool.is_shutdown() {
            let id = task.id();
            if let Err(error) = task.run() {
                warn!(task = %id, %error, "caller-run task failed");
            }
        }
        Ok(())
    }
}

/// Silently drops the task.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardPolicy;

impl RejectionPolicy for DiscardPolicy {
    fn handle_rejection(&self, task: Task, _pool: &ThreadPool) -> Result<(), RejectedError> {
        drop(task);
        Ok(())
    }
}

/// Drops the oldest queued task to make room, then resubmits through the
/// full admission path (which may reject again). Once the pool is shut
/// down the task is dropped instead.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardOldestPolicy;

impl RejectionPolicy for DiscardOldestPolicy {
    fn handle_rejection(&self, task: Task, pool: &ThreadPool) -> Result<(), RejectedError> {
        if !pool.is_shutdown() {
            drop(pool.queue().try_take());
            return pool.execute(task);
        }
        Ok(())
    }
}
