//! The open hub channel and the task draining it.

use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::HubError;
use crate::hub::Invocation;
use crate::traits::HubChannel;

/// Owns at most one open channel and its dispatch task.
#[derive(Default)]
pub struct SessionConnection {
    channel: Option<Box<dyn HubChannel>>,
    pump: Option<JoinHandle<()>>,
}

impl SessionConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a freshly opened channel and its dispatch task.
    pub fn attach(&mut self, channel: Box<dyn HubChannel>, pump: JoinHandle<()>) {
        self.stop_dispatch();
        self.channel = Some(channel);
        self.pump = Some(pump);
    }

    pub fn is_connected(&self) -> bool {
        self.channel.as_ref().is_some_and(|channel| channel.is_open())
    }

    pub async fn send(&self, invocation: Invocation) -> Result<(), HubError> {
        match &self.channel {
            Some(channel) => channel.send(invocation).await,
            None => Err(HubError::Disconnected),
        }
    }

    /// Stop routing inbound messages. The channel stays open.
    pub fn stop_dispatch(&mut self) {
        if let Some(pump) = self.pump.take() {
            debug!("Stopping inbound dispatch");
            pump.abort();
        }
    }

    /// Stop dispatch and close the channel, if any.
    pub async fn close(&mut self) -> Result<(), HubError> {
        self.stop_dispatch();
        match self.channel.take() {
            Some(channel) => channel.close().await,
            None => Ok(()),
        }
    }
}
