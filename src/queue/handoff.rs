//! Zero-capacity rendezvous queue.

use super::TaskQueue;
use crate::interrupt::{InterruptHandle, Interrupted, Wakeable};
use crate::task::{Task, TaskId};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

struct Slot {
    task: Option<Task>,
    waiting_takers: usize,
}

struct HandoffCore {
    slot: Mutex<Slot>,
    not_empty: Condvar,
}

impl Wakeable for HandoffCore {
    fn wake(&self) {
        let _slot = self.slot.lock().unwrap();
        self.not_empty.notify_all();
    }
}

/// Direct-handoff queue with no storage of its own.
///
/// `try_push` succeeds only while a consumer is parked in `take` or
/// `poll`, so an accepted task always goes straight to a thread. Used
/// with a generous maximum pool size this turns the pool into a
/// spawn-per-burst executor; with a tight maximum it sheds load early.
pub struct HandoffQueue {
    core: Arc<HandoffCore>,
}

impl HandoffQueue {
    /// Creates an empty rendezvous queue.
    pub fn new() -> Self {
        Self {
            core: Arc::new(HandoffCore {
                slot: Mutex::new(Slot {
                    task: None,
                    waiting_takers: 0,
                }),
                not_empty: Condvar::new(),
            }),
        }
    }
}

impl Default for HandoffQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue for HandoffQueue {
    fn try_push(&self, task: Task) -> Result<(), Task> {
        let mut slot = self.core.slot.lock().unwrap();
        if slot.waiting_takers == 0 || slot.task.is_some() {
            return Err(task);
        }
        slot.task = Some(task);
        self.core.not_empty.notify_all();
        Ok(())
    }

    fn take(&self, interrupt: &InterruptHandle) -> Result<Task, Interrupted> {
        let _registration = interrupt.begin_wait(self.core.clone());
        let mut slot = self.core.slot.lock().unwrap();
        slot.waiting_takers += 1;
        loop {
            // A task already in the slot wins over an interrupt: with the
            // flag checked first, a handed-off task could be stranded with
            // nobody left to claim it.
            if let Some(task) = slot.task.take() {
                slot.waiting_takers -= 1;
                return Ok(task);
            }
            if interrupt.clear() {
                slot.waiting_takers -= 1;
                return Err(Interrupted);
            }
            slot = self.core.not_empty.wait(slot).unwrap();
        }
    }

    fn poll(
        &self,
        timeout: Duration,
        interrupt: &InterruptHandle,
    ) -> Result<Option<Task>, Interrupted> {
        let deadline = Instant::now() + timeout;
        let _registration = interrupt.begin_wait(self.core.clone());
        let mut slot = self.core.slot.lock().unwrap();
        slot.waiting_takers += 1;
        loop {
            if let Some(task) = slot.task.take() {
                slot.waiting_takers -= 1;
                return Ok(Some(task));
            }
            if interrupt.clear() {
                slot.waiting_takers -= 1;
                return Err(Interrupted);
            }
            let now = Instant::now();
            if now >= deadline {
                slot.waiting_takers -= 1;
                return Ok(None);
            }
            let (guard, _timed_out) = self
                .core
                .not_empty
                .wait_timeout(slot, deadline - now)
                .unwrap();
            slot = guard;
        }
    }

    fn try_take(&self) -> Option<Task> {
        self.core.slot.lock().unwrap().task.take()
    }

    fn remove(&self, id: TaskId) -> Option<Task> {
        let mut slot = self.core.slot.lock().unwrap();
        if slot.task.as_ref().is_some_and(|task| task.id() == id) {
            slot.task.take()
        } else {
            None
        }
    }

    fn drain(&self) -> Vec<Task> {
        self.core.slot.lock().unwrap().task.take().into_iter().collect()
    }

    fn purge_cancelled(&self) -> usize {
        let mut slot = self.core.slot.lock().unwrap();
        if slot.task.as_ref().is_some_and(|task| task.is_cancelled()) {
            slot.task = None;
            1
        } else {
            0
        }
    }

    fn len(&self) -> usize {
        usize::from(self.core.slot.lock().unwrap().task.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_push_without_waiting_taker_is_refused() {
        let queue = HandoffQueue::new();
        assert!(queue.try_push(Task::new(|| {})).is_err());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_rendezvous_delivers_to_waiting_taker() {
        let queue = Arc::new(HandoffQueue::new());

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || {
                let interrupt = InterruptHandle::new();
                queue.take(&interrupt).unwrap().id()
            })
        };

        // Wait for the taker to park, then hand off.
        let task = Task::new(|| {});
        let id = task.id();
        let mut pending = Some(task);
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            match queue.try_push(pending.take().unwrap()) {
                Ok(()) => break,
                Err(task) => {
                    assert!(Instant::now() < deadline, "taker never parked");
                    pending = Some(task);
                    thread::sleep(Duration::from_millis(5));
                }
            }
        }

        assert_eq!(consumer.join().unwrap(), id);
    }

    #[test]
    fn test_poll_times_out_without_producer() {
        let queue = HandoffQueue::new();
        let interrupt = InterruptHandle::new();

        let result = queue.poll(Duration::from_millis(50), &interrupt).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_interrupt_wakes_waiting_taker() {
        let queue = Arc::new(HandoffQueue::new());
        let interrupt = Arc::new(InterruptHandle::new());

        let consumer = {
            let queue = queue.clone();
            let interrupt = interrupt.clone();
            thread::spawn(move || queue.take(&interrupt))
        };

        thread::sleep(Duration::from_millis(50));
        interrupt.interrupt();
        assert!(consumer.join().unwrap().is_err());

        // The departed taker no longer accepts handoffs.
        assert!(queue.try_push(Task::new(|| {})).is_err());
    }
}
