//! Shared fixtures for the integration tests.
//!
//! [`Harness`] runs a real lifecycle against the in-crate mocks: the HTTP
//! client answers authentication, the hub connector hands out scriptable
//! channels, and the scheduler runs every task at once while recording the
//! delay it was asked for.

#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use accessh_daemon::adapters::mock::{
    ImmediateScheduler, MockHttpClient, MockHubChannel, MockHubConnector, MockResponse,
};
use accessh_daemon::auth::{authentication_url, AuthenticationClient, MIN_TOKEN_LENGTH};
use accessh_daemon::daemon::{
    DaemonExit, DaemonLifecycle, LifecycleDeps, LifecycleHandle, LifecycleSettings,
    LifecycleState, Session,
};
use accessh_daemon::keys::{KeyFileEditor, REGION_FOOTER, REGION_HEADER};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::task::JoinHandle;

pub const SERVER_URL: &str = "https://api.acces.sh";
pub const HUB_URL: &str = "https://api.acces.sh/hubs/server";
pub const OUTSIDE_KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOutside admin@host";

pub fn auth_url() -> String {
    authentication_url(SERVER_URL)
}

pub fn api_token() -> String {
    "k".repeat(MIN_TOKEN_LENGTH)
}

pub fn jwt_response(jwt: &str) -> MockResponse {
    MockResponse::json(200, json!({ "data": jwt }))
}

/// Key file content with one unmanaged line and a managed region.
pub fn managed_file(keys: &[&str]) -> String {
    let mut lines = vec![OUTSIDE_KEY.to_string(), REGION_HEADER.to_string()];
    lines.extend(keys.iter().map(|k| k.to_string()));
    lines.push(REGION_FOOTER.to_string());
    format!("{}\n", lines.join("\n"))
}

/// Create `authorized_keys` with `content` in a fresh temp dir.
pub fn key_file(content: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("authorized_keys");
    std::fs::write(&path, content).unwrap();
    (dir, path)
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub path: PathBuf,
    pub http: MockHttpClient,
    pub connector: MockHubConnector,
    pub scheduler: ImmediateScheduler,
    pub handle: LifecycleHandle,
    task: Option<JoinHandle<DaemonExit>>,
}

impl Harness {
    /// Start a lifecycle. Mocks are empty; script them before the first
    /// await, since authentication starts as soon as the task runs.
    pub fn start(
        content: &str,
        settings: LifecycleSettings,
        script: impl FnOnce(&MockHttpClient, &MockHubConnector),
    ) -> Self {
        let (dir, path) = key_file(content);
        let http = MockHttpClient::new();
        let connector = MockHubConnector::new();
        let scheduler = ImmediateScheduler::new();
        script(&http, &connector);

        let deps = LifecycleDeps {
            auth: AuthenticationClient::new(Arc::new(http.clone())),
            connector: Arc::new(connector.clone()),
            scheduler: Arc::new(scheduler.clone()),
            editor: KeyFileEditor::new(path.clone()),
        };
        let session = Session::new(SERVER_URL, HUB_URL, api_token(), "0.3.0");
        let (lifecycle, handle) = DaemonLifecycle::new(session, deps, settings);
        let task = tokio::spawn(lifecycle.run());

        Self {
            dir,
            path,
            http,
            connector,
            scheduler,
            handle,
            task: Some(task),
        }
    }

    /// Start with default settings and a server that always authenticates.
    pub fn connected_default(content: &str) -> Self {
        Self::start(content, LifecycleSettings::default(), |http, _| {
            http.set_response(&auth_url(), jwt_response("jwt-1"));
        })
    }

    pub async fn wait_connected(&self) -> MockHubChannel {
        assert_eq!(
            self.handle.wait_for(LifecycleState::Connected).await,
            LifecycleState::Connected
        );
        self.connector
            .latest_channel()
            .expect("connected without a channel")
    }

    /// Wait for the lifecycle to stop on its own.
    pub async fn exit(&mut self) -> DaemonExit {
        let task = self.task.take().expect("exit awaited twice");
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("lifecycle did not stop")
            .expect("lifecycle task panicked")
    }

    /// Request shutdown and wait for the lifecycle to stop.
    pub async fn shutdown(&mut self) -> DaemonExit {
        self.handle.shutdown();
        self.exit().await
    }

    pub fn content(&self) -> String {
        std::fs::read_to_string(&self.path).unwrap()
    }
}
