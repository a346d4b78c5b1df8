//! The per-worker run loop.

use super::core::PoolInner;
use super::state::{self, PoolPhase};
use super::worker::Worker;
use crate::interrupt::Interrupted;
use crate::queue::TaskQueue;
use crate::task::{Task, TaskError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

/// Entry point of every worker thread.
pub(crate) fn run_worker(pool: Arc<PoolInner>, worker: Arc<Worker>) {
    // Any panic that escapes the loop (a hook, or a body whose panic
    // payload itself panics) still counts as an abrupt exit, so the exit
    // handler runs exactly once either way.
    let outcome = catch_unwind(AssertUnwindSafe(|| pool.task_loop(&worker)));
    let abrupt = outcome.unwrap_or(true);
    pool.on_worker_exit(&worker, abrupt);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

impl PoolInner {
    /// Runs tasks until retrieval says to retire. Returns true when the
    /// worker is exiting abruptly (after a task failure).
    fn task_loop(&self, worker: &Arc<Worker>) -> bool {
        let mut next = worker.take_first_task();
        loop {
            let mut task = match next.take().or_else(|| self.get_task(worker)) {
                Some(task) => task,
                // Graceful retirement; the slot was released in get_task.
                None => return false,
            };

            let _busy = worker.busy.lock().unwrap();

            // Keep the interrupt flag in line with the pool phase: a
            // stopping pool must leave it set, any other phase must not.
            // The second phase read covers a forced stop racing with the
            // clear.
            if self.state.phase() >= PoolPhase::Stop {
                worker.interrupt.interrupt();
            } else if worker.interrupt.clear() && self.state.phase() >= PoolPhase::Stop {
                worker.interrupt.interrupt();
            }

            self.hooks.before_execute(&task);
            let result = match catch_unwind(AssertUnwindSafe(|| task.invoke())) {
                Ok(result) => result,
                Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
            };
            worker.record_completed();
            self.hooks.after_execute(&task, result.as_ref().err());

            if let Err(task_error) = result {
                error!(
                    worker = worker.id(),
                    task = %task.id(),
                    error = %task_error,
                    "task failed; worker retiring abruptly"
                );
                return true;
            }
        }
    }

    /// Retrieves the next task for a worker, or `None` to retire it.
    ///
    /// Retirement happens when the pool is stopping, when a shutdown has
    /// drained the queue, when the live count exceeds the (possibly
    /// shrunk) maximum, or when an idle wait timed out and the worker is
    /// over the core size (or core workers may time out). The last worker
    /// is never timed out while the queue still holds tasks.
    fn get_task(&self, worker: &Worker) -> Option<Task> {
        let mut timed_out = false;
        loop {
            let word = self.state.load();
            let phase = state::phase_of(word);

            if phase >= PoolPhase::Shutdown
                && (phase >= PoolPhase::Stop || self.queue.is_empty())
            {
                self.state.decrement_count();
                return None;
            }

            let count = state::count_of(word);
            let timed = self.allows_core_timeout() || count > self.core_size();

            if (count > self.maximum_size() || (timed && timed_out))
                && (count > 1 || self.queue.is_empty())
            {
                if self.state.try_decrement_count(word) {
                    return None;
                }
                continue;
            }

            let retrieved = if timed {
                self.queue.poll(self.keep_alive(), &worker.interrupt)
            } else {
                self.queue.take(&worker.interrupt).map(Some)
            };
            match retrieved {
                Ok(Some(task)) => return Some(task),
                Ok(None) => timed_out = true,
                // An interrupt is a request to re-read the phase, not a
                // timeout; forget any earlier expiry so the worker is not
                // reaped spuriously.
                Err(Interrupted) => timed_out = false,
            }
        }
    }

    /// Cleans up after a worker's run loop has ended, and decides whether
    /// to start a replacement.
    pub(crate) fn on_worker_exit(self: &Arc<Self>, worker: &Arc<Worker>, abrupt: bool) {
        if abrupt {
            // Graceful exits already released their slot in get_task.
            self.state.decrement_count();
        }

        {
            let mut set = self.main.lock().unwrap();
            set.completed_task_count += worker.completed();
            set.remove(worker.id());
        }

        self.try_terminate();

        let word = self.state.load();
        if state::phase_of(word) < PoolPhase::Stop {
            if !abrupt {
                let mut min = if self.allows_core_timeout() {
                    0
                } else {
                    self.core_size()
                };
                if min == 0 && !self.queue.is_empty() {
                    min = 1;
                }
                if state::count_of(word) >= min {
                    debug!(worker = worker.id(), "worker retired");
                    return;
                }
            }
            self.spawn_idle_worker(false);
            debug!(worker = worker.id(), abrupt, "worker exited; replacement started");
        } else {
            debug!(worker = worker.id(), abrupt, "worker exited");
        }
    }
}
