//! Task admission: `execute` and worker creation.

use super::core::{PoolInner, ThreadPool};
use super::rejection::RejectedError;
use super::runloop::run_worker;
use super::state::{self, PoolPhase, MAX_WORKER_CAPACITY};
use super::worker::Worker;
use crate::queue::TaskQueue;
use crate::task::Task;
use std::sync::Arc;
use tracing::{debug, warn};

impl ThreadPool {
    /// Submits a task for execution.
    ///
    /// Admission runs in three steps: start a core worker with the task
    /// if the pool is below its core size; otherwise enqueue it while the
    /// pool is running; otherwise start an excess worker up to the
    /// maximum size. A task that cannot be placed goes to the rejection
    /// policy, whose default reports [`RejectedError`] carrying the task
    /// back to the caller.
    ///
    /// The submitter never blocks on the queue; only the non-blocking
    /// insert is used here.
    pub fn execute(&self, task: Task) -> Result<(), RejectedError> {
        let inner = &self.inner;
        let mut task = task;

        // 1. Below the core size: run it on a fresh core worker.
        if inner.state.worker_count() < inner.core_size() {
            match inner.spawn_worker_for(task, true) {
                Ok(()) => return Ok(()),
                Err(returned) => task = returned,
            }
        }

        // 2. Still running: queue it, then re-check the phase. If the
        // pool stopped while we enqueued and the task is still removable,
        // reject it; if the last worker died in the meantime, start one
        // so the queue cannot sit unserved.
        if state::is_running(inner.state.load()) {
            let id = task.id();
            match inner.queue.try_push(task) {
                Ok(()) => {
                    let recheck = inner.state.load();
                    let removed = if !state::is_running(recheck) {
                        inner.queue.remove(id)
                    } else {
                        None
                    };
                    if let Some(task) = removed {
                        inner.try_terminate();
                        return self.reject(task);
                    }
                    if state::count_of(recheck) == 0 {
                        inner.spawn_idle_worker(false);
                    }
                    return Ok(());
                }
                Err(returned) => task = returned,
            }
        }

        // 3. Queue refused the task or the pool is no longer running.
        match inner.spawn_worker_for(task, false) {
            Ok(()) => Ok(()),
            Err(task) => self.reject(task),
        }
    }

    /// Hands a task the pool could not place to the rejection policy.
    pub(crate) fn reject(&self, task: Task) -> Result<(), RejectedError> {
        debug!(pool = %self.inner.name, task = %task.id(), "task rejected by admission");
        let policy = self.rejection_policy();
        policy.handle_rejection(task, self)
    }
}

impl PoolInner {
    /// Starts a worker that runs `task` first. On refusal or spawn
    /// failure the task is handed back.
    pub(crate) fn spawn_worker_for(
        self: &Arc<Self>,
        task: Task,
        use_core_limit: bool,
    ) -> Result<(), Task> {
        match self.try_add_worker(Some(task), use_core_limit) {
            Ok(()) => Ok(()),
            Err(Some(task)) => Err(task),
            Err(None) => unreachable!("a refused first task is always handed back"),
        }
    }

    /// Starts a worker with no first task. Returns whether a thread was
    /// actually started.
    pub(crate) fn spawn_idle_worker(self: &Arc<Self>, use_core_limit: bool) -> bool {
        self.try_add_worker(None, use_core_limit).is_ok()
    }

    /// Core of worker creation. Reserves a slot in the packed state,
    /// registers the worker, then starts its thread; any failure along
    /// the way rolls the reservation back.
    fn try_add_worker(
        self: &Arc<Self>,
        first_task: Option<Task>,
        use_core_limit: bool,
    ) -> Result<(), Option<Task>> {
        let mut first_task = first_task;

        'phase_check: loop {
            let word = self.state.load();
            let phase = state::phase_of(word);

            // Past Shutdown no workers start at all; at Shutdown one may
            // start only to drain a non-empty queue, and never with a
            // task of its own.
            if phase >= PoolPhase::Shutdown
                && !(phase == PoolPhase::Shutdown
                    && first_task.is_none()
                    && !self.queue.is_empty())
            {
                return Err(first_task);
            }

            let mut word = word;
            loop {
                let bound = if use_core_limit {
                    self.core_size()
                } else {
                    self.maximum_size()
                };
                let count = state::count_of(word);
                if count >= MAX_WORKER_CAPACITY || count >= bound {
                    return Err(first_task);
                }
                if self.state.try_increment_count(word) {
                    break 'phase_check;
                }
                // Lost the CAS: a phase change restarts the outer check,
                // a count change only retries the inner one.
                word = self.state.load();
                if state::phase_of(word) != phase {
                    continue 'phase_check;
                }
            }
        }

        // Slot reserved. Register the worker under the main lock,
        // re-checking that the phase still permits it.
        let worker = Arc::new(Worker::new(self.next_worker_id(), first_task.take()));
        let mut registered = false;
        {
            let mut set = self.main.lock().unwrap();
            let phase = self.state.phase();
            if phase < PoolPhase::Shutdown
                || (phase == PoolPhase::Shutdown && !worker.has_first_task())
            {
                set.insert(Arc::clone(&worker));
                registered = true;
            }
        }

        let mut started = false;
        if registered {
            let name = format!("{}-worker-{}", self.name, worker.id());
            let pool = Arc::clone(self);
            let handle = Arc::clone(&worker);
            match self
                .factory
                .spawn(name.clone(), Box::new(move || run_worker(pool, handle)))
            {
                Ok(_join) => {
                    debug!(worker = %name, "worker started");
                    started = true;
                }
                Err(error) => {
                    warn!(worker = %name, %error, "failed to spawn worker thread");
                }
            }
        }

        if !started {
            self.add_worker_failed(&worker);
            return Err(worker.take_first_task());
        }
        Ok(())
    }

    /// Rolls back a worker whose thread never started: drop it from the
    /// set, release the reserved slot, and re-evaluate termination.
    fn add_worker_failed(&self, worker: &Arc<Worker>) {
        {
            let mut set = self.main.lock().unwrap();
            set.remove(worker.id());
        }
        self.state.decrement_count();
        self.try_terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::ThreadFactory;
    use crate::queue::FifoQueue;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread::JoinHandle;
    use std::time::Duration;

    /// Factory that refuses to spawn after a set number of threads.
    struct FailingFactory {
        allowed: AtomicUsize,
    }

    impl ThreadFactory for FailingFactory {
        fn spawn(
            &self,
            name: String,
            body: Box<dyn FnOnce() + Send + 'static>,
        ) -> io::Result<JoinHandle<()>> {
            let permit = self
                .allowed
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if permit.is_err() {
                return Err(io::Error::other("thread budget exhausted"));
            }
            std::thread::Builder::new().name(name).spawn(body)
        }
    }

    #[test]
    fn test_execute_runs_task() {
        let pool = ThreadPool::builder()
            .name("admission-test")
            .core_size(1)
            .max_size(1)
            .queue(Arc::new(FifoQueue::unbounded()))
            .build()
            .unwrap();

        let (tx, rx) = mpsc::channel();
        pool.execute(Task::new(move || {
            tx.send(42).unwrap();
        }))
        .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));
    }

    #[test]
    fn test_spawn_failure_rolls_back_reservation() {
        let pool = ThreadPool::builder()
            .name("rollback-test")
            .core_size(2)
            .max_size(2)
            .queue(Arc::new(FifoQueue::unbounded()))
            .factory(Box::new(FailingFactory {
                allowed: AtomicUsize::new(0),
            }))
            .build()
            .unwrap();

        // The factory refuses, so the task falls through to the queue and
        // the reserved worker slot is released again.
        pool.execute(Task::new(|| {})).unwrap();
        assert_eq!(pool.pool_size(), 0);
        assert_eq!(pool.inner.state.worker_count(), 0);
        assert_eq!(pool.queue().len(), 1);
    }
}
