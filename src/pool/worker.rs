//! Worker records and the set of live workers.

use crate::interrupt::InterruptHandle;
use crate::task::Task;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// One live worker thread.
///
/// The `busy` mutex is not a contended resource: the worker holds it
/// exactly while running a task body, and coordinators only ever try-lock
/// it to test idleness and earn the right to interrupt safely.
pub(crate) struct Worker {
    id: u64,
    pub(crate) busy: Mutex<()>,
    pub(crate) interrupt: Arc<InterruptHandle>,
    completed_tasks: AtomicU64,
    first_task: Mutex<Option<Task>>,
}

impl Worker {
    pub(crate) fn new(id: u64, first_task: Option<Task>) -> Self {
        Self {
            id,
            busy: Mutex::new(()),
            interrupt: Arc::new(InterruptHandle::new()),
            completed_tasks: AtomicU64::new(0),
            first_task: Mutex::new(first_task),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn has_first_task(&self) -> bool {
        self.first_task.lock().unwrap().is_some()
    }

    pub(crate) fn take_first_task(&self) -> Option<Task> {
        self.first_task.lock().unwrap().take()
    }

    pub(crate) fn record_completed(&self) {
        self.completed_tasks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn completed(&self) -> u64 {
        self.completed_tasks.load(Ordering::Relaxed)
    }

    /// True while the worker holds its busy lock (a poisoned lock means a
    /// hook panicked mid-task; the worker is on its way out and is still
    /// reported busy).
    pub(crate) fn is_busy(&self) -> bool {
        self.busy.try_lock().is_err()
    }
}

/// The live workers plus aggregate bookkeeping. Only ever touched while
/// holding the pool's main lock.
pub(crate) struct WorkerSet {
    workers: HashMap<u64, Arc<Worker>>,
    pub(crate) largest_pool_size: usize,
    pub(crate) completed_task_count: u64,
}

impl WorkerSet {
    pub(crate) fn new() -> Self {
        Self {
            workers: HashMap::new(),
            largest_pool_size: 0,
            completed_task_count: 0,
        }
    }

    pub(crate) fn insert(&mut self, worker: Arc<Worker>) {
        self.workers.insert(worker.id(), worker);
        if self.workers.len() > self.largest_pool_size {
            self.largest_pool_size = self.workers.len();
        }
    }

    pub(crate) fn remove(&mut self, id: u64) {
        self.workers.remove(&id);
    }

    pub(crate) fn len(&self) -> usize {
        self.workers.len()
    }

    pub(crate) fn workers(&self) -> impl Iterator<Item = &Arc<Worker>> {
        self.workers.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_first_task_is_taken_once() {
        let worker = Worker::new(1, Some(Task::new(|| {})));
        assert!(worker.has_first_task());
        assert!(worker.take_first_task().is_some());
        assert!(worker.take_first_task().is_none());
    }

    #[test]
    fn test_worker_busy_probe() {
        let worker = Worker::new(1, None);
        assert!(!worker.is_busy());

        let _running = worker.busy.lock().unwrap();
        assert!(worker.is_busy());
    }

    #[test]
    fn test_worker_set_tracks_peak_size() {
        let mut set = WorkerSet::new();
        set.insert(Arc::new(Worker::new(1, None)));
        set.insert(Arc::new(Worker::new(2, None)));
        set.remove(1);
        set.insert(Arc::new(Worker::new(3, None)));

        assert_eq!(set.len(), 2);
        assert_eq!(set.largest_pool_size, 2);
    }
}
