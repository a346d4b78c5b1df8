//! Thread creation.
//!
//! The pool never calls `thread::spawn` directly; it goes through a
//! [`ThreadFactory`] so embedders can control stack sizes, priorities, or
//! instrumentation. Spawn failures are reported back so the pool can roll
//! back the worker it reserved.

use std::io;
use std::thread::{self, JoinHandle};

/// Capability for turning a unit of work into a running OS thread.
pub trait ThreadFactory: Send + Sync {
    /// Spawns a thread with the given name running `body`.
    fn spawn(&self, name: String, body: Box<dyn FnOnce() + Send + 'static>)
        -> io::Result<JoinHandle<()>>;
}

/// Default factory: a plain named `thread::Builder` spawn.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultThreadFactory;

impl ThreadFactory for DefaultThreadFactory {
    fn spawn(
        &self,
        name: String,
        body: Box<dyn FnOnce() + Send + 'static>,
    ) -> io::Result<JoinHandle<()>> {
        thread::Builder::new().name(name).spawn(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_factory_names_thread() {
        let factory = DefaultThreadFactory;
        let handle = factory
            .spawn(
                "factory-test".to_string(),
                Box::new(|| {
                    assert_eq!(thread::current().name(), Some("factory-test"));
                }),
            )
            .unwrap();
        handle.join().unwrap();
    }
}
