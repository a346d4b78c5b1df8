//! Pool configuration and construction.

use super::core::ThreadPool;
use super::hooks::{NoOpHooks, PoolHooks};
use super::rejection::{AbortPolicy, RejectionPolicy};
use crate::factory::{DefaultThreadFactory, ThreadFactory};
use crate::queue::{FifoQueue, TaskQueue};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default idle time after which a non-core worker retires.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Fallback worker count when CPU detection fails.
const FALLBACK_CPU_COUNT: usize = 4;

/// Configuration error raised at construction or by a runtime mutator.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The maximum pool size must admit at least one worker.
    #[error("maximum pool size must be greater than zero")]
    ZeroMaximum,

    /// The core size may never exceed the maximum size.
    #[error("core pool size ({core}) exceeds maximum pool size ({max})")]
    CoreExceedsMaximum { core: usize, max: usize },

    /// Core-thread timeout with a zero keep-alive would respawn workers
    /// in a tight loop.
    #[error("keep-alive must be nonzero when core threads may time out")]
    ZeroKeepAlive,
}

/// Sizing and timing parameters for a [`ThreadPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Pool name, used as the worker thread name prefix.
    pub name: String,
    /// Number of workers kept alive even when idle (unless
    /// `allow_core_timeout` is set).
    pub core_size: usize,
    /// Hard cap on concurrently live workers.
    pub max_size: usize,
    /// Idle duration after which an excess worker retires.
    pub keep_alive: Duration,
    /// When set, core workers are also subject to the keep-alive.
    pub allow_core_timeout: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(FALLBACK_CPU_COUNT);
        Self {
            name: "taskpool".to_string(),
            core_size: cpus,
            max_size: cpus,
            keep_alive: DEFAULT_KEEP_ALIVE,
            allow_core_timeout: false,
        }
    }
}

impl PoolConfig {
    /// Set the pool name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the core worker count.
    pub fn with_core_size(mut self, core_size: usize) -> Self {
        self.core_size = core_size;
        self
    }

    /// Set the maximum worker count.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the idle keep-alive for excess workers.
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Subject core workers to the keep-alive as well.
    pub fn with_core_timeout(mut self, allow: bool) -> Self {
        self.allow_core_timeout = allow;
        self
    }

    /// Checks the size and timing invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::ZeroMaximum);
        }
        if self.core_size > self.max_size {
            return Err(ConfigError::CoreExceedsMaximum {
                core: self.core_size,
                max: self.max_size,
            });
        }
        if self.allow_core_timeout && self.keep_alive.is_zero() {
            return Err(ConfigError::ZeroKeepAlive);
        }
        Ok(())
    }
}

/// Assembles a [`ThreadPool`] from a config plus optional collaborators.
///
/// Anything not supplied falls back to a default: an unbounded
/// [`FifoQueue`], the [`DefaultThreadFactory`], the [`AbortPolicy`], and
/// no-op hooks.
pub struct PoolBuilder {
    config: PoolConfig,
    queue: Option<Arc<dyn TaskQueue>>,
    factory: Option<Box<dyn ThreadFactory>>,
    policy: Option<Arc<dyn RejectionPolicy>>,
    hooks: Option<Box<dyn PoolHooks>>,
}

impl PoolBuilder {
    pub(crate) fn new() -> Self {
        Self {
            config: PoolConfig::default(),
            queue: None,
            factory: None,
            policy: None,
            hooks: None,
        }
    }

    /// Set the pool name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the core worker count.
    pub fn core_size(mut self, core_size: usize) -> Self {
        self.config.core_size = core_size;
        self
    }

    /// Set the maximum worker count.
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.config.max_size = max_size;
        self
    }

    /// Set the idle keep-alive for excess workers.
    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.config.keep_alive = keep_alive;
        self
    }

    /// Subject core workers to the keep-alive as well.
    pub fn allow_core_timeout(mut self, allow: bool) -> Self {
        self.config.allow_core_timeout = allow;
        self
    }

    /// Use the given task queue.
    pub fn queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Use the given thread factory.
    pub fn factory(mut self, factory: Box<dyn ThreadFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Use the given rejection policy.
    pub fn rejection_policy(mut self, policy: Arc<dyn RejectionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Use the given execution hooks.
    pub fn hooks(mut self, hooks: Box<dyn PoolHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Validates the configuration and creates the pool.
    pub fn build(self) -> Result<ThreadPool, ConfigError> {
        ThreadPool::with_parts(
            self.config,
            self.queue.unwrap_or_else(|| Arc::new(FifoQueue::unbounded())),
            self.factory.unwrap_or_else(|| Box::new(DefaultThreadFactory)),
            self.policy.unwrap_or_else(|| Arc::new(AbortPolicy)),
            self.hooks.unwrap_or_else(|| Box::new(NoOpHooks)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PoolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.core_size, config.max_size);
        assert_eq!(config.keep_alive, DEFAULT_KEEP_ALIVE);
        assert!(!config.allow_core_timeout);
    }

    #[test]
    fn test_zero_maximum_is_rejected() {
        let config = PoolConfig::default().with_core_size(0).with_max_size(0);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroMaximum)));
    }

    #[test]
    fn test_core_above_maximum_is_rejected() {
        let config = PoolConfig::default().with_core_size(8).with_max_size(4);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CoreExceedsMaximum { core: 8, max: 4 })
        ));
    }

    #[test]
    fn test_core_timeout_requires_keep_alive() {
        let config = PoolConfig::default()
            .with_core_timeout(true)
            .with_keep_alive(Duration::ZERO);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroKeepAlive)));
    }

    #[test]
    fn test_zero_core_size_is_valid() {
        let config = PoolConfig::default().with_core_size(0).with_max_size(2);
        assert!(config.validate().is_ok());
    }
}
