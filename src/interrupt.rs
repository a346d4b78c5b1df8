//! Worker interruption.
//!
//! OS threads have no interrupt of their own, so the pool carries one: an
//! [`InterruptHandle`] pairs a flag with the wait site its owning worker
//! is currently blocked on. Interrupting sets the flag and wakes the
//! registered site; a blocking queue retrieval observes the flag, consumes
//! it, and returns [`Interrupted`] to its caller.
//!
//! The wakeup cannot be lost: [`Wakeable::wake`] implementations must
//! acquire the same mutex the waiter holds around its flag check before
//! notifying, so the interruptor either runs before the check (the flag is
//! seen) or after the waiter has parked (the notify lands).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Returned by blocking queue retrievals when the waiting worker was
/// interrupted. Delivery consumes the interrupt flag.
#[derive(Debug, Error)]
#[error("interrupted while waiting for work")]
pub struct Interrupted;

/// A wait site that can be woken by an interruptor.
///
/// Implementations must take their own wait mutex before notifying.
pub trait Wakeable: Send + Sync {
    /// Wakes every thread blocked on this site.
    fn wake(&self);
}

/// Interrupt flag for a single worker thread.
pub struct InterruptHandle {
    flag: AtomicBool,
    waiting_on: Mutex<Option<Arc<dyn Wakeable>>>,
}

impl InterruptHandle {
    /// Creates a handle in the not-interrupted state.
    pub fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
            waiting_on: Mutex::new(None),
        }
    }

    /// Sets the interrupt flag and wakes the wait site the owning worker
    /// is registered on, if any.
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
        let target = self.waiting_on.lock().unwrap().clone();
        if let Some(target) = target {
            target.wake();
        }
    }

    /// Returns the current flag without consuming it.
    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Consumes the flag, returning whether it was set.
    pub fn clear(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }

    /// Registers the wait site the owning worker is about to block on.
    ///
    /// The registration lasts until the returned guard is dropped. Only
    /// the owning worker should call this.
    pub fn begin_wait(&self, site: Arc<dyn Wakeable>) -> WaitRegistration<'_> {
        *self.waiting_on.lock().unwrap() = Some(site);
        WaitRegistration { handle: self }
    }
}

impl Default for InterruptHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InterruptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptHandle")
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

/// Guard for an active wait-site registration.
pub struct WaitRegistration<'a> {
    handle: &'a InterruptHandle,
}

impl Drop for WaitRegistration<'_> {
    fn drop(&mut self) {
        self.handle.waiting_on.lock().unwrap().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingSite {
        wakes: AtomicUsize,
    }

    impl Wakeable for CountingSite {
        fn wake(&self) {
            self.wakes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_interrupt_sets_and_clear_consumes() {
        let handle = InterruptHandle::new();
        assert!(!handle.is_interrupted());

        handle.interrupt();
        assert!(handle.is_interrupted());

        assert!(handle.clear());
        assert!(!handle.is_interrupted());
        assert!(!handle.clear());
    }

    #[test]
    fn test_interrupt_wakes_registered_site() {
        let handle = InterruptHandle::new();
        let site = Arc::new(CountingSite {
            wakes: AtomicUsize::new(0),
        });

        {
            let _registration = handle.begin_wait(site.clone());
            handle.interrupt();
        }
        assert_eq!(site.wakes.load(Ordering::SeqCst), 1);

        // Deregistered: no further wakes.
        handle.interrupt();
        assert_eq!(site.wakes.load(Ordering::SeqCst), 1);
    }
}
