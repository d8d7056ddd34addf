//! Deferred work abstraction.
//!
//! The lifecycle never sleeps itself; it hands work to a [`TaskScheduler`]
//! so tests can run retries without waiting out the real delays.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// A unit of work the scheduler runs to completion.
pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs tasks now or after a delay.
pub trait TaskScheduler: Send + Sync {
    /// Run `task` as soon as possible.
    fn enqueue(&self, task: Task);

    /// Run `task` once `delay` has elapsed.
    fn enqueue_after(&self, task: Task, delay: Duration);

    /// Drop every task still waiting for its delay. Later calls to
    /// `enqueue`/`enqueue_after` are ignored.
    fn shutdown(&self);
}
