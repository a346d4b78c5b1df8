//! Managed worker-thread pool.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     execute(task)                           │
//! │  Admission: below core → new worker; running → enqueue;     │
//! │  queue full → new worker up to max; else rejection policy   │
//! └──────────────────────────────┬──────────────────────────────┘
//!                                │
//!                ┌───────────────┼───────────────┐
//!                ▼               ▼               ▼
//! ┌──────────────────┐ ┌──────────────────┐ ┌──────────────────┐
//! │  Worker threads  │ │    TaskQueue     │ │ RejectionPolicy  │
//! │  run loop drains │ │ (FIFO, handoff,  │ │ (abort, caller-  │
//! │  the queue, idle │ │  or user-built)  │ │  runs, discard)  │
//! │  timeout retires │ └──────────────────┘ └──────────────────┘
//! └────────┬─────────┘
//!          │ exit / replacement
//!          ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Packed atomic state: lifecycle phase + live worker count   │
//! │  Running → Shutdown → Stop → Tidying → Terminated           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Lifecycle
//!
//! The phase and the live worker count live in one atomic word, so every
//! admission and retirement decision sees both together. Phases only move
//! forward. [`ThreadPool::shutdown`] stops intake and lets queued work
//! finish; [`ThreadPool::shutdown_now`] also drains the queue, returning
//! the never-run tasks, and interrupts every worker. Workers running a
//! task hold their own busy lock, and coordinators only ever try-lock it,
//! so a task body is never interrupted by a graceful shutdown.
//!
//! Interruption of a running body is cooperative: a body that ignores its
//! [`CancelToken`](crate::task::CancelToken) simply runs to completion,
//! and a forced shutdown waits for it. This is a documented best-effort
//! limit, not a defect.

mod admission;
mod config;
mod core;
mod hooks;
mod rejection;
mod runloop;
mod shutdown;
mod state;
mod worker;

pub use self::config::{ConfigError, PoolBuilder, PoolConfig, DEFAULT_KEEP_ALIVE};
pub use self::core::ThreadPool;
pub use self::hooks::{NoOpHooks, PoolHooks};
pub use self::rejection::{
    AbortPolicy, CallerRunsPolicy, DiscardOldestPolicy, DiscardPolicy, RejectedError,
    RejectionPolicy,
};
pub use self::state::PoolPhase;
