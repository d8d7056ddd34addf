//! Hub connection trait abstraction.
//!
//! A [`HubConnector`] opens one duplex channel per call. The returned
//! [`HubChannel`] sends invocations and closes the channel; everything the
//! server pushes arrives on the paired event receiver, ending with
//! [`HubEvent::Closed`] if the channel drops on its own.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::HubError;
use crate::hub::{HubEvent, Invocation};

/// An open channel plus the receiver for what the server sends on it.
pub type OpenChannel = (Box<dyn HubChannel>, mpsc::Receiver<HubEvent>);

/// Opens hub channels.
#[async_trait]
pub trait HubConnector: Send + Sync {
    /// Open a channel to `hub_url`, presenting `access_token` as the
    /// session credential.
    ///
    /// A 401/403 on upgrade must surface as [`HubError::Unauthorized`].
    async fn connect(&self, hub_url: &str, access_token: &str) -> Result<OpenChannel, HubError>;
}

/// The sending half of an open hub channel.
#[async_trait]
pub trait HubChannel: Send + Sync {
    /// Send a non-blocking invocation.
    async fn send(&self, invocation: Invocation) -> Result<(), HubError>;

    /// Close the channel and wait for it to shut down.
    ///
    /// Closing twice is not an error.
    async fn close(&self) -> Result<(), HubError>;

    /// True until the channel has closed for any reason.
    fn is_open(&self) -> bool;
}
