//! Packed lifecycle and worker-count state.
//!
//! The pool keeps its lifecycle phase and its live worker count in a
//! single atomic word so the two are always read and written together.
//! The phase sits above [`COUNT_BITS`]; because later phases get larger
//! values, "at least Stop" is a plain integer comparison on the word.
//! Every transition is a compare-and-swap retry loop; nothing here takes
//! a lock.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of low-order bits holding the worker count.
pub const COUNT_BITS: u32 = 32;

const COUNT_MASK: u64 = (1 << COUNT_BITS) - 1;

/// Hard ceiling on the number of live workers a pool can track.
pub const MAX_WORKER_CAPACITY: usize = COUNT_MASK as usize;

/// Lifecycle stage of a pool. Phases only ever move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PoolPhase {
    /// Accepting new tasks and draining the queue.
    Running,

    /// Not accepting new tasks; queued tasks still run.
    Shutdown,

    /// Not accepting new tasks, queue drained, workers interrupted.
    Stop,

    /// All workers gone; the termination hook is running.
    Tidying,

    /// Fully terminated.
    Terminated,
}

impl PoolPhase {
    fn from_bits(bits: u64) -> Self {
        match bits {
            0 => Self::Running,
            1 => Self::Shutdown,
            2 => Self::Stop,
            3 => Self::Tidying,
            _ => Self::Terminated,
        }
    }
}

impl fmt::Display for PoolPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Shutdown => write!(f, "Shutdown"),
            Self::Stop => write!(f, "Stop"),
            Self::Tidying => write!(f, "Tidying"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Packs a phase and a worker count into one word.
pub(crate) fn pack(phase: PoolPhase, count: usize) -> u64 {
    ((phase as u64) << COUNT_BITS) | count as u64
}

/// Extracts the phase from a packed word.
pub(crate) fn phase_of(word: u64) -> PoolPhase {
    PoolPhase::from_bits(word >> COUNT_BITS)
}

/// Extracts the worker count from a packed word.
pub(crate) fn count_of(word: u64) -> usize {
    (word & COUNT_MASK) as usize
}

/// Returns true when the packed word is in the Running phase.
pub(crate) fn is_running(word: u64) -> bool {
    phase_of(word) == PoolPhase::Running
}

/// The pool's packed atomic state word.
pub(crate) struct PoolState(AtomicU64);

impl PoolState {
    pub(crate) fn new() -> Self {
        Self(AtomicU64::new(pack(PoolPhase::Running, 0)))
    }

    pub(crate) fn load(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn phase(&self) -> PoolPhase {
        phase_of(self.load())
    }

    pub(crate) fn worker_count(&self) -> usize {
        count_of(self.load())
    }

    /// Adds one worker if the word still equals `expected`.
    pub(crate) fn try_increment_count(&self, expected: u64) -> bool {
        self.0
            .compare_exchange(expected, expected + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Removes one worker if the word still equals `expected`.
    pub(crate) fn try_decrement_count(&self, expected: u64) -> bool {
        self.0
            .compare_exchange(expected, expected - 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Removes one worker, retrying until the CAS lands. Terminates
    /// because each retry means some other thread's CAS won.
    pub(crate) fn decrement_count(&self) {
        loop {
            let word = self.load();
            debug_assert!(count_of(word) > 0, "decrement with no live workers");
            if self.try_decrement_count(word) {
                return;
            }
        }
    }

    /// Raises the phase to at least `target`, keeping the worker count.
    pub(crate) fn advance_phase(&self, target: PoolPhase) {
        loop {
            let word = self.load();
            if phase_of(word) >= target {
                return;
            }
            let next = pack(target, count_of(word));
            if self
                .0
                .compare_exchange(word, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Moves to Tidying with a zero count if the word still equals
    /// `expected`. Exactly one terminator wins this CAS.
    pub(crate) fn try_begin_tidying(&self, expected: u64) -> bool {
        self.0
            .compare_exchange(
                expected,
                pack(PoolPhase::Tidying, 0),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Final transition, only called by the thread that won the Tidying
    /// CAS.
    pub(crate) fn set_terminated(&self) {
        self.0
            .store(pack(PoolPhase::Terminated, 0), Ordering::SeqCst);
    }
}

impl fmt::Debug for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = self.load();
        f.debug_struct("PoolState")
            .field("phase", &phase_of(word))
            .field("worker_count", &count_of(word))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_roundtrip() {
        for phase in [
            PoolPhase::Running,
            PoolPhase::Shutdown,
            PoolPhase::Stop,
            PoolPhase::Tidying,
            PoolPhase::Terminated,
        ] {
            for count in [0, 1, 7, MAX_WORKER_CAPACITY] {
                let word = pack(phase, count);
                assert_eq!(phase_of(word), phase);
                assert_eq!(count_of(word), count);
            }
        }
    }

    #[test]
    fn test_phase_ordering_matches_word_ordering() {
        assert!(PoolPhase::Running < PoolPhase::Shutdown);
        assert!(PoolPhase::Shutdown < PoolPhase::Stop);
        assert!(PoolPhase::Stop < PoolPhase::Tidying);
        assert!(PoolPhase::Tidying < PoolPhase::Terminated);

        // Any count in a later phase compares above any count earlier.
        assert!(pack(PoolPhase::Shutdown, 0) > pack(PoolPhase::Running, MAX_WORKER_CAPACITY));
    }

    #[test]
    fn test_increment_and_decrement() {
        let state = PoolState::new();
        assert!(state.try_increment_count(state.load()));
        assert!(state.try_increment_count(state.load()));
        assert_eq!(state.worker_count(), 2);

        // Stale word loses the race.
        let stale = pack(PoolPhase::Running, 0);
        assert!(!state.try_increment_count(stale));

        state.decrement_count();
        assert_eq!(state.worker_count(), 1);
    }

    #[test]
    fn test_advance_phase_is_monotonic() {
        let state = PoolState::new();
        state.advance_phase(PoolPhase::Stop);
        assert_eq!(state.phase(), PoolPhase::Stop);

        // Going backwards is a no-op.
        state.advance_phase(PoolPhase::Shutdown);
        assert_eq!(state.phase(), PoolPhase::Stop);
    }

    #[test]
    fn test_advance_phase_preserves_count() {
        let state = PoolState::new();
        assert!(state.try_increment_count(state.load()));
        state.advance_phase(PoolPhase::Shutdown);
        assert_eq!(state.worker_count(), 1);
        assert_eq!(state.phase(), PoolPhase::Shutdown);
    }

    #[test]
    fn test_tidying_cas_single_winner() {
        let state = PoolState::new();
        state.advance_phase(PoolPhase::Shutdown);
        let word = state.load();
        assert!(state.try_begin_tidying(word));
        // A second driver with the same expectation loses.
        assert!(!state.try_begin_tidying(word));

        state.set_terminated();
        assert_eq!(state.phase(), PoolPhase::Terminated);
        assert_eq!(state.worker_count(), 0);
    }
}
