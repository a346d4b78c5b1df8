//! Task queues.
//!
//! The pool treats its queue as an external collaborator reached only
//! through the [`TaskQueue`] trait: producers insert without blocking,
//! consumers block (plain or timed) with interrupt awareness, and the
//! shutdown path removes, drains, and inspects. Two implementations are
//! provided:
//!
//! - [`FifoQueue`]: a bounded or unbounded FIFO buffer. Bounded capacity
//!   plus a maximum pool size gives classic overflow-then-reject behavior.
//! - [`HandoffQueue`]: a zero-capacity rendezvous. An insert succeeds only
//!   if a worker is already waiting, so every accepted task is handed
//!   straight to a thread.

mod fifo;
mod handoff;

pub use self::fifo::FifoQueue;
pub use self::handoff::HandoffQueue;

use crate::interrupt::{InterruptHandle, Interrupted};
use crate::task::{Task, TaskId};
use std::time::Duration;

/// Thread-safe FIFO container of pending tasks.
///
/// Blocking retrievals must honor the caller's [`InterruptHandle`]: wake
/// promptly when it fires and return [`Interrupted`] with the flag
/// consumed. Implementations register themselves as the handle's wait
/// site (see [`crate::interrupt::Wakeable`]) for the duration of a wait.
pub trait TaskQueue: Send + Sync {
    /// Inserts without blocking. Returns the task when there is no room
    /// (or, for rendezvous queues, no waiting consumer).
    fn try_push(&self, task: Task) -> Result<(), Task>;

    /// Blocks until a task is available or the caller is interrupted.
    fn take(&self, interrupt: &InterruptHandle) -> Result<Task, Interrupted>;

    /// Blocks up to `timeout`. `Ok(None)` means the wait timed out.
    fn poll(
        &self,
        timeout: Duration,
        interrupt: &InterruptHandle,
    ) -> Result<Option<Task>, Interrupted>;

    /// Removes and returns the head of the queue, if any, without
    /// blocking.
    fn try_take(&self) -> Option<Task>;

    /// Best-effort removal of a specific queued task.
    fn remove(&self, id: TaskId) -> Option<Task>;

    /// Removes and returns every pending task.
    fn drain(&self) -> Vec<Task>;

    /// Removes queued tasks whose cancellation token has fired. Returns
    /// how many were removed.
    fn purge_cancelled(&self) -> usize;

    /// Number of pending tasks. Approximate under concurrent mutation.
    fn len(&self) -> usize;

    /// Returns true when no tasks are pending.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
