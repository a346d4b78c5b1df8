//! The shutdown protocol.
//!
//! Phases advance Running → Shutdown → Stop → Tidying → Terminated, and
//! never backwards. Any thread that observes the terminal condition may
//! drive the final transition; the Tidying CAS guarantees exactly one of
//! them runs the termination hook.

use super::core::{PoolInner, ThreadPool};
use super::state::{self, PoolPhase};
use super::worker::WorkerSet;
use crate::queue::TaskQueue;
use crate::task::Task;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{error, info};

impl ThreadPool {
    /// Begins an orderly shutdown: no new tasks are accepted, queued
    /// tasks still run. Idle workers are interrupted so they notice and
    /// retire. Returns without waiting; use
    /// [`await_termination`](Self::await_termination) for that. Calling
    /// this again after the pool is already shut down has no effect.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        {
            let set = inner.main.lock().unwrap();
            inner.state.advance_phase(PoolPhase::Shutdown);
            inner.interrupt_idle(&set, false);
            if catch_unwind(AssertUnwindSafe(|| inner.hooks.on_shutdown())).is_err() {
                error!(pool = %inner.name, "shutdown hook panicked");
            }
        }
        inner.try_terminate();
        info!(pool = %inner.name, "shutdown initiated");
    }

    /// Forces a shutdown: drains the queue and interrupts every worker,
    /// busy or not. Returns the tasks that were queued and never started.
    ///
    /// Stopping running tasks is best-effort. A body that never checks
    /// its cancellation token runs to completion, and termination waits
    /// for it.
    pub fn shutdown_now(&self) -> Vec<Task> {
        let inner = &self.inner;
        let drained;
        {
            let set = inner.main.lock().unwrap();
            inner.state.advance_phase(PoolPhase::Stop);
            inner.interrupt_all(&set);
            drained = inner.queue.drain();
        }
        inner.try_terminate();
        info!(pool = %inner.name, drained = drained.len(), "forced shutdown");
        drained
    }

    /// Blocks until the pool is fully terminated or the timeout elapses.
    /// Returns whether termination was observed.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let inner = &self.inner;
        let deadline = Instant::now() + timeout;
        let mut set = inner.main.lock().unwrap();
        loop {
            if inner.state.phase() >= PoolPhase::Terminated {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _timed_out) = inner
                .termination
                .wait_timeout(set, deadline - now)
                .unwrap();
            set = guard;
        }
    }

    /// Returns the pool's current lifecycle phase.
    pub fn phase(&self) -> PoolPhase {
        self.inner.state.phase()
    }

    /// True once a shutdown (orderly or forced) has begun.
    pub fn is_shutdown(&self) -> bool {
        self.phase() >= PoolPhase::Shutdown
    }

    /// True while shutting down but not yet fully terminated.
    pub fn is_terminating(&self) -> bool {
        let phase = self.phase();
        phase >= PoolPhase::Shutdown && phase < PoolPhase::Terminated
    }

    /// True once the pool has fully terminated.
    pub fn is_terminated(&self) -> bool {
        self.phase() >= PoolPhase::Terminated
    }
}

impl PoolInner {
    /// Advances to Terminated if the pool has nothing left to do.
    ///
    /// Safe to call from anywhere, any number of times: after a worker
    /// exits, after queue removal, after either shutdown call. If workers
    /// remain, one idle worker is interrupted so the shutdown signal
    /// keeps propagating.
    pub(crate) fn try_terminate(&self) {
        loop {
            let word = self.state.load();
            let phase = state::phase_of(word);
            if phase == PoolPhase::Running
                || phase >= PoolPhase::Tidying
                || (phase == PoolPhase::Shutdown && !self.queue.is_empty())
            {
                return;
            }
            if state::count_of(word) != 0 {
                self.interrupt_idle_workers(true);
                return;
            }

            let _set = self.main.lock().unwrap();
            if self.state.try_begin_tidying(word) {
                // The hook must not block the final transition or the
                // waiters, whatever it does.
                if catch_unwind(AssertUnwindSafe(|| self.hooks.on_terminated())).is_err() {
                    error!(pool = %self.name, "termination hook panicked");
                }
                self.state.set_terminated();
                self.termination.notify_all();
                info!(pool = %self.name, "terminated");
                return;
            }
            // Lost the CAS to a concurrent transition; re-evaluate.
        }
    }

    /// Interrupts idle workers so they re-read the pool phase. Busy
    /// workers (busy lock held) are skipped, as are workers already
    /// flagged. With `only_one`, at most the first worker looked at is
    /// interrupted, enough to keep the shutdown signal moving.
    pub(crate) fn interrupt_idle_workers(&self, only_one: bool) {
        let set = self.main.lock().unwrap();
        self.interrupt_idle(&set, only_one);
    }

    pub(crate) fn interrupt_idle(&self, set: &WorkerSet, only_one: bool) {
        for worker in set.workers() {
            if !worker.interrupt.is_interrupted() {
                if let Ok(_idle) = worker.busy.try_lock() {
                    worker.interrupt.interrupt();
                }
            }
            if only_one {
                break;
            }
        }
    }

    /// Interrupts every worker, idle or not. Only the forced shutdown
    /// path uses this.
    pub(crate) fn interrupt_all(&self, set: &WorkerSet) {
        for worker in set.workers() {
            worker.interrupt.interrupt();
        }
    }
}
