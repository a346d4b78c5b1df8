//! Units of work submitted to the pool.
//!
//! A [`Task`] owns a fallible closure plus the small amount of identity the
//! pool needs around it: a process-unique [`TaskId`] so queued tasks can be
//! removed again, an optional name for logs and hooks, and an optional
//! shared cancellation flag consulted by `purge`.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Error produced by a task body, or by the pool on the body's behalf.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task body reported a failure.
    #[error("{0}")]
    Failed(String),

    /// The task body panicked; the payload message is preserved.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// Any other error a task body wants to surface.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl TaskError {
    /// Creates a failure with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Process-unique identifier assigned to every task at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cloneable cancellation flag shared between a task and its submitter.
///
/// Cancellation is cooperative. The pool never stops a running body; a
/// cancelled task that is still queued can be reaped with
/// [`ThreadPool::purge`](crate::pool::ThreadPool::purge), and a running
/// body may poll its own token to exit early.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the task as cancelled.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

type TaskBody = Box<dyn FnOnce() -> Result<(), TaskError> + Send + 'static>;

/// A unit of work. The body runs at most once.
pub struct Task {
    id: TaskId,
    name: Option<String>,
    body: Option<TaskBody>,
    cancel: Option<CancelToken>,
}

impl Task {
    /// Creates a task from an infallible closure.
    pub fn new(body: impl FnOnce() + Send + 'static) -> Self {
        Self::fallible(move || {
            body();
            Ok(())
        })
    }

    /// Creates a task whose body may report an error.
    ///
    /// A body error never reaches the submitter; it is handed to the
    /// pool's after-execute hook and retires the worker that ran it.
    pub fn fallible(body: impl FnOnce() -> Result<(), TaskError> + Send + 'static) -> Self {
        Self {
            id: TaskId::next(),
            name: None,
            body: Some(Box::new(body)),
            cancel: None,
        }
    }

    /// Creates a named task; the name shows up in logs and hooks.
    pub fn named(name: impl Into<String>, body: impl FnOnce() + Send + 'static) -> Self {
        let mut task = Self::new(body);
        task.name = Some(name.into());
        task
    }

    /// Creates a task together with a token that can cancel it while it is
    /// still queued.
    pub fn cancellable(body: impl FnOnce() + Send + 'static) -> (Self, CancelToken) {
        let token = CancelToken::new();
        let mut task = Self::new(body);
        task.cancel = Some(token.clone());
        (task, token)
    }

    /// Returns the task's unique identifier.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the task's name, if one was given.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns true if the task carries a cancelled token.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }

    /// Runs the body on the calling thread, consuming the task.
    pub fn run(mut self) -> Result<(), TaskError> {
        self.invoke()
    }

    /// Runs the body in place. A second call is a no-op.
    pub(crate) fn invoke(&mut self) -> Result<(), TaskError> {
        match self.body.take() {
            Some(body) => body(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
