//! Wires the production adapters into a lifecycle and runs it.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use crate::adapters::{ReqwestHttpClient, TokioScheduler, TungsteniteHubConnector};
use crate::auth::AuthenticationClient;
use crate::config::DaemonConfig;
use crate::daemon::{DaemonExit, DaemonLifecycle, LifecycleDeps, Session};
use crate::error::{DaemonError, DaemonResult};
use crate::keys::KeyFileEditor;

/// Build the adapters for `config`.
pub fn production_deps(
    config: &DaemonConfig,
    editor: KeyFileEditor,
) -> DaemonResult<LifecycleDeps> {
    let http = ReqwestHttpClient::with_timeout(config.request_timeout())
        .map_err(|e| DaemonError::internal(format!("HTTP client setup failed: {}", e)))?;

    Ok(LifecycleDeps {
        auth: AuthenticationClient::new(Arc::new(http)),
        connector: Arc::new(TungsteniteHubConnector::new(config.request_timeout())),
        scheduler: Arc::new(TokioScheduler::new()),
        editor,
    })
}

/// Run a lifecycle until it stops on its own or `shutdown` resolves.
///
/// After `shutdown` the lifecycle gets `grace` to clear the key region and
/// close the channel; past that the task is aborted.
pub async fn run_until_shutdown<F>(
    config: &DaemonConfig,
    deps: LifecycleDeps,
    shutdown: F,
) -> DaemonExit
where
    F: Future<Output = ()>,
{
    let (lifecycle, handle) = DaemonLifecycle::new(
        Session::from_config(config),
        deps,
        config.lifecycle_settings(),
    );
    let mut task = tokio::spawn(lifecycle.run());

    tokio::select! {
        joined = &mut task => return joined_exit(joined),
        _ = shutdown => {
            info!("Received shutdown signal");
            handle.shutdown();
        }
    }

    match tokio::time::timeout(config.shutdown_grace(), &mut task).await {
        Ok(joined) => joined_exit(joined),
        Err(_) => {
            warn!(
                "Teardown did not finish within {}s, aborting",
                config.shutdown_grace().as_secs()
            );
            task.abort();
            DaemonExit::Failed(DaemonError::internal(format!(
                "teardown exceeded {}s grace period, key region may not be cleared",
                config.shutdown_grace().as_secs()
            )))
        }
    }
}

fn joined_exit(joined: Result<DaemonExit, tokio::task::JoinError>) -> DaemonExit {
    joined.unwrap_or_else(|e| {
        DaemonExit::Failed(DaemonError::internal(format!("lifecycle task failed: {}", e)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{ImmediateScheduler, MockHttpClient, MockHubConnector, MockResponse};
    use crate::auth::authentication_url;
    use std::time::Duration;

    fn config(grace_secs: u64) -> DaemonConfig {
        DaemonConfig::from_json_str(&format!(
            r#"{{"serverUrl":"https://api.acces.sh","hubUrl":"https://api.acces.sh/hubs/server","apiToken":"{}","requestKeysOnConnect":true,"shutdownGraceSecs":{}}}"#,
            "t".repeat(64),
            grace_secs
        ))
        .unwrap()
    }

    fn deps(connector: &MockHubConnector, path: &std::path::Path) -> LifecycleDeps {
        let http = MockHttpClient::new();
        http.set_response(
            &authentication_url("https://api.acces.sh"),
            MockResponse::json(200, serde_json::json!({ "data": "jwt" })),
        );
        LifecycleDeps {
            auth: AuthenticationClient::new(Arc::new(http)),
            connector: Arc::new(connector.clone()),
            scheduler: Arc::new(ImmediateScheduler::new()),
            editor: KeyFileEditor::new(path),
        }
    }

    fn key_file() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("authorized_keys");
        std::fs::write(&path, "").unwrap();
        (dir, path)
    }

    /// Connected once the key request went out on the channel.
    async fn until_connected(connector: &MockHubConnector) {
        for _ in 0..500 {
            if connector
                .latest_channel()
                .map_or(false, |channel| !channel.sent().is_empty())
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("never connected");
    }

    #[tokio::test]
    async fn test_clean_shutdown_is_cancelled() {
        let (_dir, path) = key_file();
        let connector = MockHubConnector::new();
        let config = config(5);
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let run = tokio::spawn({
            let deps = deps(&connector, &path);
            async move {
                run_until_shutdown(&config, deps, async {
                    let _ = stop_rx.await;
                })
                .await
            }
        });
        until_connected(&connector).await;
        stop_tx.send(()).unwrap();

        let exit = run.await.unwrap();
        assert_eq!(exit.exit_code(), 0);
        assert!(connector.latest_channel().unwrap().is_closed());
    }

    #[tokio::test]
    async fn test_teardown_past_grace_is_failure() {
        let (_dir, path) = key_file();
        let connector = MockHubConnector::new();
        connector.stall_close();
        let config = config(1);
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let run = tokio::spawn({
            let deps = deps(&connector, &path);
            async move {
                run_until_shutdown(&config, deps, async {
                    let _ = stop_rx.await;
                })
                .await
            }
        });
        until_connected(&connector).await;
        stop_tx.send(()).unwrap();

        let exit = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(exit.exit_code(), 0);
        assert!(matches!(exit, DaemonExit::Failed(DaemonError::Internal { .. })));
    }
}
