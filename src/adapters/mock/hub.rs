//! Mock hub connector for testing.
//!
//! Every successful connect hands out a fresh [`MockHubChannel`]; tests
//! reach it through [`MockHubConnector::latest_channel`] to inject server
//! events and inspect what the daemon sent.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::error::HubError;
use crate::hub::{HubEvent, Invocation};
use crate::traits::{HubChannel, HubConnector, OpenChannel};

/// A recorded connect call.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectCall {
    pub hub_url: String,
    pub access_token: String,
}

#[derive(Default)]
struct ConnectorState {
    scripted: VecDeque<HubError>,
    calls: Vec<ConnectCall>,
    channels: Vec<MockHubChannel>,
    stall_close: bool,
}

/// Mock connector with scripted failures.
#[derive(Clone, Default)]
pub struct MockHubConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl MockHubConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next connect fail with `err`. Failures queue up in order;
    /// once they run out, connects succeed.
    pub fn fail_next(&self, err: HubError) {
        self.state.lock().unwrap().scripted.push_back(err);
    }

    /// Make `close` on channels handed out from now on never complete.
    pub fn stall_close(&self) {
        self.state.lock().unwrap().stall_close = true;
    }

    /// Every connect call, successful or not.
    pub fn calls(&self) -> Vec<ConnectCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// The channel handed out by the most recent successful connect.
    pub fn latest_channel(&self) -> Option<MockHubChannel> {
        self.state.lock().unwrap().channels.last().cloned()
    }
}

#[async_trait]
impl HubConnector for MockHubConnector {
    async fn connect(&self, hub_url: &str, access_token: &str) -> Result<OpenChannel, HubError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ConnectCall {
            hub_url: hub_url.to_string(),
            access_token: access_token.to_string(),
        });

        if let Some(err) = state.scripted.pop_front() {
            return Err(err);
        }

        let (events_tx, events_rx) = mpsc::channel(100);
        let channel = MockHubChannel {
            events_tx,
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
            stall_close: state.stall_close,
        };
        state.channels.push(channel.clone());

        Ok((Box::new(channel), events_rx))
    }
}

/// Mock channel; clones share state.
#[derive(Clone)]
pub struct MockHubChannel {
    events_tx: mpsc::Sender<HubEvent>,
    sent: Arc<Mutex<Vec<Invocation>>>,
    closed: Arc<AtomicBool>,
    stall_close: bool,
}

impl MockHubChannel {
    /// Deliver an event as if the server had sent it.
    pub async fn inject(&self, event: HubEvent) -> Result<(), HubError> {
        self.events_tx
            .send(event)
            .await
            .map_err(|_| HubError::Disconnected)
    }

    /// Deliver a server invocation.
    pub async fn invoke(
        &self,
        target: &str,
        arguments: Vec<serde_json::Value>,
    ) -> Result<(), HubError> {
        self.inject(HubEvent::Invocation(Invocation::new(target, arguments)))
            .await
    }

    /// Simulate the server dropping the connection.
    pub async fn drop_connection(&self, error: Option<&str>) -> Result<(), HubError> {
        self.closed.store(true, Ordering::SeqCst);
        self.inject(HubEvent::Closed {
            error: error.map(str::to_string),
        })
        .await
    }

    /// Invocations the daemon sent.
    pub fn sent(&self) -> Vec<Invocation> {
        self.sent.lock().unwrap().clone()
    }

    /// True once `close` has been called or the connection was dropped.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HubChannel for MockHubChannel {
    async fn send(&self, invocation: Invocation) -> Result<(), HubError> {
        if self.is_closed() {
            return Err(HubError::Disconnected);
        }
        self.sent.lock().unwrap().push(invocation);
        Ok(())
    }

    async fn close(&self) -> Result<(), HubError> {
        if self.stall_close {
            std::future::pending::<()>().await;
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.is_closed()
    }
}
