//! Scheduler that ignores delays.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::traits::{Task, TaskScheduler};

/// Runs every task right away and records the delay it was given.
///
/// `None` entries are `enqueue` calls, `Some(delay)` are `enqueue_after`.
#[derive(Clone, Default)]
pub struct ImmediateScheduler {
    history: Arc<Mutex<Vec<Option<Duration>>>>,
    stopped: Arc<AtomicBool>,
}

impl ImmediateScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every accepted scheduling call, in order.
    pub fn history(&self) -> Vec<Option<Duration>> {
        self.history.lock().unwrap().clone()
    }

    /// Delays passed to `enqueue_after`, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.history().into_iter().flatten().collect()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn accept(&self, delay: Option<Duration>, task: Task) {
        if self.is_stopped() {
            return;
        }
        self.history.lock().unwrap().push(delay);
        tokio::spawn(task);
    }
}

impl TaskScheduler for ImmediateScheduler {
    fn enqueue(&self, task: Task) {
        self.accept(None, task);
    }

    fn enqueue_after(&self, task: Task, delay: Duration) {
        self.accept(Some(delay), task);
    }

    fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_and_runs() {
        let scheduler = ImmediateScheduler::new();
        let (tx, rx) = tokio::sync::oneshot::channel();

        scheduler.enqueue(Box::pin(async {}));
        scheduler.enqueue_after(
            Box::pin(async move {
                let _ = tx.send(());
            }),
            Duration::from_secs(300),
        );

        assert!(rx.await.is_ok());
        assert_eq!(
            scheduler.history(),
            vec![None, Some(Duration::from_secs(300))]
        );
        assert_eq!(scheduler.delays(), vec![Duration::from_secs(300)]);
    }

    #[tokio::test]
    async fn test_shutdown_drops_new_tasks() {
        let scheduler = ImmediateScheduler::new();
        scheduler.shutdown();
        scheduler.enqueue(Box::pin(async {}));
        assert!(scheduler.history().is_empty());
        assert!(scheduler.is_stopped());
    }
}
