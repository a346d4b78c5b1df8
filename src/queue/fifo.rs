//! Bounded and unbounded FIFO task queue.

use super::TaskQueue;
use crate::interrupt::{InterruptHandle, Interrupted, Wakeable};
use crate::task::{Task, TaskId};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

struct FifoCore {
    items: Mutex<VecDeque<Task>>,
    not_empty: Condvar,
}

impl Wakeable for FifoCore {
    fn wake(&self) {
        // Taking the items lock orders this notify against a waiter's
        // check-then-wait, so the wakeup cannot fall between the two.
        let _items = self.items.lock().unwrap();
        self.not_empty.notify_all();
    }
}

/// Mutex-and-condvar FIFO queue, optionally capacity-bounded.
pub struct FifoQueue {
    core: Arc<FifoCore>,
    capacity: Option<usize>,
}

impl FifoQueue {
    /// Creates a queue that accepts any number of tasks.
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    /// Creates a queue that refuses inserts beyond `capacity` tasks.
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity))
    }

    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            core: Arc::new(FifoCore {
                items: Mutex::new(VecDeque::new()),
                not_empty: Condvar::new(),
            }),
            capacity,
        }
    }

    /// Returns the configured capacity, if bounded.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl TaskQueue for FifoQueue {
    fn try_push(&self, task: Task) -> Result<(), Task> {
        let mut items = self.core.items.lock().unwrap();
        if let Some(capacity) = self.capacity {
            if items.len() >= capacity {
                return Err(task);
            }
        }
        items.push_back(task);
        self.core.not_empty.notify_one();
        Ok(())
    }

    fn take(&self, interrupt: &InterruptHandle) -> Result<Task, Interrupted> {
        let _registration = interrupt.begin_wait(self.core.clone());
        let mut items = self.core.items.lock().unwrap();
        loop {
            if interrupt.clear() {
                return Err(Interrupted);
            }
            if let Some(task) = items.pop_front() {
                return Ok(task);
            }
            items = self.core.not_empty.wait(items).unwrap();
        }
    }

    fn poll(
        &self,
        timeout: Duration,
        interrupt: &InterruptHandle,
    ) -> Result<Option<Task>, Interrupted> {
        let deadline = Instant::now() + timeout;
        let _registration = interrupt.begin_wait(self.core.clone());
        let mut items = self.core.items.lock().unwrap();
        loop {
            if interrupt.clear() {
                return Err(Interrupted);
            }
            if let Some(task) = items.pop_front() {
                return Ok(Some(task));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (guard, _timed_out) = self
                .core
                .not_empty
                .wait_timeout(items, deadline - now)
                .unwrap();
            items = guard;
        }
    }

    fn try_take(&self) -> Option<Task> {
        self.core.items.lock().unwrap().pop_front()
    }

    fn remove(&self, id: TaskId) -> Option<Task> {
        let mut items = self.core.items.lock().unwrap();
        let position = items.iter().position(|task| task.id() == id)?;
        items.remove(position)
    }

    fn drain(&self) -> Vec<Task> {
        self.core.items.lock().unwrap().drain(..).collect()
    }

    fn purge_cancelled(&self) -> usize {
        let mut items = self.core.items.lock().unwrap();
        let before = items.len();
        items.retain(|task| !task.is_cancelled());
        before - items.len()
    }

    fn len(&self) -> usize {
        self.core.items.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    fn noop_task() -> Task {
        Task::new(|| {})
    }

    #[test]
    fn test_bounded_queue_refuses_when_full() {
        let queue = FifoQueue::bounded(1);
        assert!(queue.try_push(noop_task()).is_ok());

        let refused = queue.try_push(noop_task());
        assert!(refused.is_err());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_take_blocks_until_push() {
        let queue = Arc::new(FifoQueue::unbounded());
        let (tx, rx) = mpsc::channel();

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || {
                let interrupt = InterruptHandle::new();
                let task = queue.take(&interrupt).unwrap();
                tx.send(task.id()).unwrap();
            })
        };

        // The consumer is parked; nothing arrives yet.
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        let task = noop_task();
        let id = task.id();
        queue.try_push(task).unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), id);
        consumer.join().unwrap();
    }

    #[test]
    fn test_poll_times_out_on_empty_queue() {
        let queue = FifoQueue::unbounded();
        let interrupt = InterruptHandle::new();

        let start = Instant::now();
        let result = queue.poll(Duration::from_millis(50), &interrupt).unwrap();
        assert!(result.is_none());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_interrupt_wakes_blocked_take() {
        let queue = Arc::new(FifoQueue::unbounded());
        let interrupt = Arc::new(InterruptHandle::new());

        let consumer = {
            let queue = queue.clone();
            let interrupt = interrupt.clone();
            thread::spawn(move || queue.take(&interrupt))
        };

        thread::sleep(Duration::from_millis(50));
        interrupt.interrupt();

        let result = consumer.join().unwrap();
        assert!(result.is_err());
        // Delivery consumed the flag.
        assert!(!interrupt.is_interrupted());
    }

    #[test]
    fn test_remove_targets_specific_task() {
        let queue = FifoQueue::unbounded();
        let first = noop_task();
        let second = noop_task();
        let second_id = second.id();

        queue.try_push(first).unwrap();
        queue.try_push(second).unwrap();

        let removed = queue.remove(second_id).unwrap();
        assert_eq!(removed.id(), second_id);
        assert_eq!(queue.len(), 1);
        assert!(queue.remove(second_id).is_none());
    }

    #[test]
    fn test_drain_empties_queue_in_order() {
        let queue = FifoQueue::unbounded();
        let first = noop_task();
        let second = noop_task();
        let ids = [first.id(), second.id()];

        queue.try_push(first).unwrap();
        queue.try_push(second).unwrap();

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!([drained[0].id(), drained[1].id()], ids);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_purge_removes_only_cancelled_tasks() {
        let queue = FifoQueue::unbounded();
        let (cancelled, token) = Task::cancellable(|| {});
        queue.try_push(cancelled).unwrap();
        queue.try_push(noop_task()).unwrap();

        token.cancel();
        assert_eq!(queue.purge_cancelled(), 1);
        assert_eq!(queue.len(), 1);
    }
}
