//! Taskpool - a managed pool of worker threads.
//!
//! This library runs submitted units of work on a bounded, dynamically
//! sized pool of OS threads. The pool grows on demand up to a core size,
//! overflows into a pluggable task queue, grows further up to a maximum
//! size when the queue refuses work, and hands anything it still cannot
//! place to a pluggable rejection policy. Idle workers beyond the core
//! size retire after a configurable keep-alive, and the whole pool can be
//! quiesced through a staged shutdown protocol.
//!
//! # High-Level API
//!
//! For most use cases, build a pool through [`pool::ThreadPool::builder`]:
//!
//! ```ignore
//! use taskpool::pool::ThreadPool;
//! use taskpool::queue::FifoQueue;
//! use taskpool::task::Task;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let pool = ThreadPool::builder()
//!     .name("imaging")
//!     .core_size(4)
//!     .max_size(8)
//!     .keep_alive(Duration::from_secs(30))
//!     .queue(Arc::new(FifoQueue::bounded(64)))
//!     .build()?;
//!
//! pool.execute(Task::new(|| println!("hello from a worker")))?;
//!
//! pool.shutdown();
//! pool.await_termination(Duration::from_secs(5));
//! ```
//!
//! Shutting down is always explicit: dropping a running pool leaks its
//! worker threads.

pub mod factory;
pub mod interrupt;
pub mod pool;
pub mod queue;
pub mod task;

/// Version of the taskpool library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
