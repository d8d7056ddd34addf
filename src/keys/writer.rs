//! Single-writer queue in front of [`KeyFileEditor`].
//!
//! All edits to the authorized keys file go through one background task
//! that drains a FIFO channel, so edits never interleave and are applied in
//! the order they were submitted.

use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use super::editor::{KeyFileEditor, KeyOperation};
use crate::error::{DaemonError, KeyFileError};

/// Callback invoked when a fire-and-forget edit fails.
pub type FailureHook = Box<dyn Fn(KeyFileError) + Send + Sync + 'static>;

enum KeyJob {
    Apply {
        op: KeyOperation,
        reply: Option<oneshot::Sender<Result<(), KeyFileError>>>,
    },
    Barrier(oneshot::Sender<()>),
}

/// Handle to the key file writer task.
///
/// Cloning the handle shares the same queue. The task exits once every
/// handle has been dropped and the queue is drained.
#[derive(Clone)]
pub struct KeyWriter {
    tx: mpsc::UnboundedSender<KeyJob>,
}

impl KeyWriter {
    /// Spawn the writer task on the current runtime.
    ///
    /// `on_failure` receives errors from edits submitted with
    /// [`KeyWriter::submit`]; edits awaited through [`KeyWriter::apply`]
    /// report to their caller instead.
    pub fn spawn(editor: KeyFileEditor, on_failure: FailureHook) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(editor, rx, on_failure));
        Self { tx }
    }

    /// Queue an edit without waiting for it.
    pub fn submit(&self, op: KeyOperation) -> Result<(), DaemonError> {
        self.tx
            .send(KeyJob::Apply { op, reply: None })
            .map_err(|_| DaemonError::internal("key writer has stopped"))
    }

    /// Queue an edit and wait until it has been written.
    ///
    /// Every edit queued before this one is applied first.
    pub async fn apply(&self, op: KeyOperation) -> Result<(), DaemonError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(KeyJob::Apply {
                op,
                reply: Some(reply_tx),
            })
            .map_err(|_| DaemonError::internal("key writer has stopped"))?;

        reply_rx
            .await
            .map_err(|_| DaemonError::internal("key writer dropped the reply"))?
            .map_err(DaemonError::from)
    }

    /// Wait until every edit queued so far has been processed.
    pub async fn flush(&self) -> Result<(), DaemonError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(KeyJob::Barrier(done_tx))
            .map_err(|_| DaemonError::internal("key writer has stopped"))?;
        done_rx
            .await
            .map_err(|_| DaemonError::internal("key writer dropped the barrier"))
    }
}

async fn run_writer(
    editor: KeyFileEditor,
    mut rx: mpsc::UnboundedReceiver<KeyJob>,
    on_failure: FailureHook,
) {
    while let Some(job) = rx.recv().await {
        match job {
            KeyJob::Apply { op, reply } => {
                let result = editor.apply(&op).await;
                match &result {
                    Ok(()) => info!("{} {} key(s)", describe(&op), op.keys().len()),
                    Err(e) => error!("Failed to {} keys: {}", op.name(), e),
                }

                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            on_failure(e);
                        }
                    }
                }
            }
            KeyJob::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
}

fn describe(op: &KeyOperation) -> &'static str {
    match op {
        KeyOperation::ReplaceAll(_) => "Initialized",
        KeyOperation::Add(_) => "Added",
        KeyOperation::Remove(_) => "Removed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::editor::{REGION_FOOTER, REGION_HEADER};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn keys(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn seeded(dir: &TempDir, content: &str) -> KeyFileEditor {
        let path = dir.path().join("authorized_keys");
        std::fs::write(&path, content).unwrap();
        KeyFileEditor::new(path)
    }

    fn recording_hook() -> (FailureHook, Arc<Mutex<Vec<KeyFileError>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (
            Box::new(move |e| sink.lock().unwrap().push(e)),
            seen,
        )
    }

    #[tokio::test]
    async fn test_edits_apply_in_submission_order() {
        let dir = TempDir::new().unwrap();
        let editor = seeded(&dir, &format!("{}\n{}\n", REGION_HEADER, REGION_FOOTER));
        let (hook, failures) = recording_hook();
        let writer = KeyWriter::spawn(editor.clone(), hook);

        writer.submit(KeyOperation::Add(keys(&["a"]))).unwrap();
        writer.submit(KeyOperation::Remove(keys(&["a"]))).unwrap();
        writer.submit(KeyOperation::Add(keys(&["b"]))).unwrap();
        writer.flush().await.unwrap();

        assert_eq!(editor.managed_keys().await.unwrap(), keys(&["b"]));
        assert!(failures.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_failure_reaches_hook() {
        let dir = TempDir::new().unwrap();
        let editor = seeded(&dir, "ssh-rsa AAA user\n");
        let (hook, failures) = recording_hook();
        let writer = KeyWriter::spawn(editor, hook);

        writer.submit(KeyOperation::Add(keys(&["k"]))).unwrap();
        writer.flush().await.unwrap();

        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            failures[0],
            KeyFileError::RegionNotFound {
                marker: REGION_HEADER,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_apply_reports_to_caller_not_hook() {
        let dir = TempDir::new().unwrap();
        let editor = seeded(&dir, "");
        let (hook, failures) = recording_hook();
        let writer = KeyWriter::spawn(editor, hook);

        let err = writer
            .apply(KeyOperation::Remove(keys(&["k"])))
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::KeyFile(KeyFileError::RegionNotFound { .. })));
        assert!(failures.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_waits_for_earlier_submissions() {
        let dir = TempDir::new().unwrap();
        let editor = seeded(&dir, "");
        let (hook, _) = recording_hook();
        let writer = KeyWriter::spawn(editor.clone(), hook);

        writer.submit(KeyOperation::ReplaceAll(keys(&["k1"]))).unwrap();
        writer.apply(KeyOperation::Add(keys(&["k2"]))).await.unwrap();

        assert_eq!(editor.managed_keys().await.unwrap(), keys(&["k2", "k1"]));
    }
}
