//! Tokio-backed task scheduler.

use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::traits::{Task, TaskScheduler};

/// Spawns each task on the tokio runtime; delayed tasks sleep first.
///
/// [`TaskScheduler::shutdown`] cancels every task still sleeping.
pub struct TokioScheduler {
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            cancel_tx,
            cancel_rx,
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskScheduler for TokioScheduler {
    fn enqueue(&self, task: Task) {
        if self.is_cancelled() {
            debug!("Scheduler stopped, dropping task");
            return;
        }
        tokio::spawn(task);
    }

    fn enqueue_after(&self, task: Task, delay: Duration) {
        if self.is_cancelled() {
            debug!("Scheduler stopped, dropping delayed task");
            return;
        }

        let mut cancel_rx = self.cancel_rx.clone();
        tokio::spawn(async move {
            let fire = tokio::select! {
                _ = tokio::time::sleep(delay) => true,
                _ = async {
                    let _ = cancel_rx.wait_for(|cancelled| *cancelled).await;
                } => false,
            };
            if fire {
                task.await;
            } else {
                debug!("Delayed task cancelled");
            }
        });
    }

    fn shutdown(&self) {
        let _ = self.cancel_tx.send(true);
    }
}
