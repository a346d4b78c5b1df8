//! Extension points invoked around task execution and at termination.

use crate::task::{Task, TaskError};

/// Override points for embedders.
///
/// `before_execute` and `after_execute` run on the worker thread around
/// every task; a panic in either retires that worker (a replacement is
/// started) but never harms the pool. `on_shutdown` runs once when a
/// graceful shutdown begins, `on_terminated` once when the pool reaches
/// its terminal phase; panics there are logged and contained.
pub trait PoolHooks: Send + Sync {
    /// Called on the worker thread just before a task body runs.
    fn before_execute(&self, _task: &Task) {}

    /// Called on the worker thread after a task body finished, with the
    /// failure (error or captured panic) if there was one.
    fn after_execute(&self, _task: &Task, _error: Option<&TaskError>) {}

    /// Called once when a graceful shutdown is initiated.
    fn on_shutdown(&self) {}

    /// Called exactly once, by whichever thread drives the final
    /// transition, when the pool terminates.
    fn on_terminated(&self) {}
}

/// Hooks that do nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpHooks;

impl PoolHooks for NoOpHooks {}
