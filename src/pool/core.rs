//! The pool handle and its shared inner state.

use super::config::{ConfigError, PoolBuilder, PoolConfig};
use super::hooks::PoolHooks;
use super::rejection::RejectionPolicy;
use super::state::PoolState;
use super::worker::WorkerSet;
use crate::factory::ThreadFactory;
use crate::queue::TaskQueue;
use crate::task::TaskId;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::time::Duration;
use tracing::info;

/// Shared state behind every [`ThreadPool`] clone and worker thread.
pub(crate) struct PoolInner {
    pub(crate) name: String,
    pub(crate) state: PoolState,
    pub(crate) queue: Arc<dyn TaskQueue>,
    /// Guards the worker set and its aggregate bookkeeping.
    pub(crate) main: Mutex<WorkerSet>,
    /// Signalled (under `main`) when the pool reaches Terminated.
    pub(crate) termination: Condvar,
    pub(crate) factory: Box<dyn ThreadFactory>,
    pub(crate) policy: RwLock<Arc<dyn RejectionPolicy>>,
    pub(crate) hooks: Box<dyn PoolHooks>,
    core_size: AtomicUsize,
    max_size: AtomicUsize,
    keep_alive_nanos: AtomicU64,
    allow_core_timeout: AtomicBool,
    worker_seq: AtomicU64,
}

impl PoolInner {
    pub(crate) fn core_size(&self) -> usize {
        self.core_size.load(Ordering::SeqCst)
    }

    pub(crate) fn maximum_size(&self) -> usize {
        self.max_size.load(Ordering::SeqCst)
    }

    pub(crate) fn keep_alive(&self) -> Duration {
        Duration::from_nanos(self.keep_alive_nanos.load(Ordering::SeqCst))
    }

    pub(crate) fn allows_core_timeout(&self) -> bool {
        self.allow_core_timeout.load(Ordering::SeqCst)
    }

    pub(crate) fn next_worker_id(&self) -> u64 {
        self.worker_seq.fetch_add(1, Ordering::Relaxed)
    }
}

/// Managed pool of worker threads.
///
/// Cloning is cheap; all clones drive the same pool. Shutting down is
/// always explicit: dropping every handle of a running pool leaks its
/// worker threads.
#[derive(Clone)]
pub struct ThreadPool {
    pub(crate) inner: Arc<PoolInner>,
}

impl ThreadPool {
    /// Creates a pool from a config and a task queue, with default
    /// factory, rejection policy, and hooks.
    pub fn new(
        config: PoolConfig,
        queue: Arc<dyn TaskQueue>,
    ) -> Result<Self, ConfigError> {
        Self::builder_from(config).queue(queue).build()
    }

    /// Starts assembling a pool with default configuration.
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    fn builder_from(config: PoolConfig) -> PoolBuilder {
        PoolBuilder::new()
            .name(config.name)
            .core_size(config.core_size)
            .max_size(config.max_size)
            .keep_alive(config.keep_alive)
            .allow_core_timeout(config.allow_core_timeout)
    }

    pub(crate) fn with_parts(
        config: PoolConfig,
        queue: Arc<dyn TaskQueue>,
        factory: Box<dyn ThreadFactory>,
        policy: Arc<dyn RejectionPolicy>,
        hooks: Box<dyn PoolHooks>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let keep_alive_nanos =
            u64::try_from(config.keep_alive.as_nanos()).unwrap_or(u64::MAX);
        let inner = Arc::new(PoolInner {
            name: config.name,
            state: PoolState::new(),
            queue,
            main: Mutex::new(WorkerSet::new()),
            termination: Condvar::new(),
            factory,
            policy: RwLock::new(policy),
            hooks,
            core_size: AtomicUsize::new(config.core_size),
            max_size: AtomicUsize::new(config.max_size),
            keep_alive_nanos: AtomicU64::new(keep_alive_nanos),
            allow_core_timeout: AtomicBool::new(config.allow_core_timeout),
            worker_seq: AtomicU64::new(0),
        });

        info!(
            pool = %inner.name,
            core = inner.core_size(),
            max = inner.maximum_size(),
            "thread pool created"
        );
        Ok(Self { inner })
    }

    /// Returns the pool name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the task queue the pool drains.
    ///
    /// The queue may be in active use; inspecting it does not pause
    /// execution.
    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.inner.queue
    }

    // =========================================================================
    // Mutable configuration
    // =========================================================================

    /// Returns the core worker count.
    pub fn core_pool_size(&self) -> usize {
        self.inner.core_size()
    }

    /// Changes the core worker count.
    ///
    /// Shrinking interrupts excess idle workers so they retire; growing
    /// starts just enough new workers to cover any queued backlog.
    pub fn set_core_pool_size(&self, core_size: usize) -> Result<(), ConfigError> {
        let inner = &self.inner;
        let max = inner.maximum_size();
        if core_size > max {
            return Err(ConfigError::CoreExceedsMaximum {
                core: core_size,
                max,
            });
        }
        let previous = inner.core_size.swap(core_size, Ordering::SeqCst);
        if inner.state.worker_count() > core_size {
            inner.interrupt_idle_workers(false);
        } else if core_size > previous {
            let mut spare = (core_size - previous).min(inner.queue.len());
            while spare > 0 && inner.spawn_idle_worker(true) {
                if inner.queue.is_empty() {
                    break;
                }
                spare -= 1;
            }
        }
        Ok(())
    }

    /// Returns the maximum worker count.
    pub fn maximum_pool_size(&self) -> usize {
        self.inner.maximum_size()
    }

    /// Changes the maximum worker count. Shrinking below the current live
    /// count interrupts excess idle workers.
    pub fn set_maximum_pool_size(&self, max_size: usize) -> Result<(), ConfigError> {
        let inner = &self.inner;
        if max_size == 0 {
            return Err(ConfigError::ZeroMaximum);
        }
        let core = inner.core_size();
        if max_size < core {
            return Err(ConfigError::CoreExceedsMaximum { core, max: max_size });
        }
        inner.max_size.store(max_size, Ordering::SeqCst);
        if inner.state.worker_count() > max_size {
            inner.interrupt_idle_workers(false);
        }
        Ok(())
    }

    /// Returns the idle keep-alive.
    pub fn keep_alive_time(&self) -> Duration {
        self.inner.keep_alive()
    }

    /// Changes the idle keep-alive. Shortening it interrupts idle workers
    /// so the new bound takes effect immediately.
    pub fn set_keep_alive_time(&self, keep_alive: Duration) -> Result<(), ConfigError> {
        let inner = &self.inner;
        if keep_alive.is_zero() && inner.allows_core_timeout() {
            return Err(ConfigError::ZeroKeepAlive);
        }
        let nanos = u64::try_from(keep_alive.as_nanos()).unwrap_or(u64::MAX);
        let previous = inner.keep_alive_nanos.swap(nanos, Ordering::SeqCst);
        if nanos < previous {
            inner.interrupt_idle_workers(false);
        }
        Ok(())
    }

    /// Returns whether core workers are subject to the keep-alive.
    pub fn allows_core_thread_timeout(&self) -> bool {
        self.inner.allows_core_timeout()
    }

    /// Makes core workers subject to the keep-alive (or exempts them
    /// again). Enabling it interrupts idle workers so the timeout clock
    /// starts.
    pub fn allow_core_thread_timeout(&self, allow: bool) -> Result<(), ConfigError> {
        let inner = &self.inner;
        if allow && inner.keep_alive().is_zero() {
            return Err(ConfigError::ZeroKeepAlive);
        }
        let previous = inner.allow_core_timeout.swap(allow, Ordering::SeqCst);
        if allow && !previous {
            inner.interrupt_idle_workers(false);
        }
        Ok(())
    }

    /// Swaps the rejection policy.
    pub fn set_rejection_policy(&self, policy: Arc<dyn RejectionPolicy>) {
        *self.inner.policy.write().unwrap() = policy;
    }

    /// Returns the current rejection policy.
    pub fn rejection_policy(&self) -> Arc<dyn RejectionPolicy> {
        self.inner.policy.read().unwrap().clone()
    }

    // =========================================================================
    // Prestarting and queue maintenance
    // =========================================================================

    /// Starts one idle core worker ahead of demand. Returns false once
    /// the core size is reached.
    pub fn prestart_core_thread(&self) -> bool {
        let inner = &self.inner;
        inner.state.worker_count() < inner.core_size() && inner.spawn_idle_worker(true)
    }

    /// Starts idle core workers until the core size is reached, returning
    /// how many were started.
    pub fn prestart_all_core_threads(&self) -> usize {
        let mut started = 0;
        while self.inner.spawn_idle_worker(true) {
            started += 1;
        }
        started
    }

    /// Removes a queued task if it has not started. Best-effort: a task
    /// already handed to a worker cannot be removed.
    pub fn remove(&self, id: TaskId) -> bool {
        let removed = self.inner.queue.remove(id).is_some();
        self.inner.try_terminate();
        removed
    }

    /// Removes queued tasks whose cancellation token has fired, returning
    /// how many were removed. Best-effort under concurrent mutation.
    pub fn purge(&self) -> usize {
        let purged = self.inner.queue.purge_cancelled();
        self.inner.try_terminate();
        purged
    }

    // =========================================================================
    // Statistics (approximate under concurrent mutation)
    // =========================================================================

    /// Current number of live workers; 0 once termination has begun.
    pub fn pool_size(&self) -> usize {
        use super::state::PoolPhase;
        if self.inner.state.phase() >= PoolPhase::Tidying {
            return 0;
        }
        self.inner.main.lock().unwrap().len()
    }

    /// Approximate number of workers currently running a task.
    pub fn active_count(&self) -> usize {
        let set = self.inner.main.lock().unwrap();
        set.workers().filter(|worker| worker.is_busy()).count()
    }

    /// Largest number of workers that have ever been live at once.
    pub fn largest_pool_size(&self) -> usize {
        self.inner.main.lock().unwrap().largest_pool_size
    }

    /// Approximate total of tasks ever accepted: completed, running, and
    /// queued.
    pub fn task_count(&self) -> u64 {
        let set = self.inner.main.lock().unwrap();
        let mut count = set.completed_task_count;
        for worker in set.workers() {
            count += worker.completed();
            if worker.is_busy() {
                count += 1;
            }
        }
        count + self.inner.queue.len() as u64
    }

    /// Approximate, monotonically non-decreasing count of completed
    /// tasks.
    pub fn completed_task_count(&self) -> u64 {
        let set = self.inner.main.lock().unwrap();
        let mut count = set.completed_task_count;
        for worker in set.workers() {
            count += worker.completed();
        }
        count
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("name", &self.inner.name)
            .field("phase", &self.inner.state.phase())
            .field("pool_size", &self.pool_size())
            .field("active", &self.active_count())
            .field("queued", &self.inner.queue.len())
            .field("completed", &self.completed_task_count())
            .finish()
    }
}
