//! Duplex channel to the server hub.
//!
//! - [`protocol`] - JSON hub protocol framing
//! - [`messages`] - typed server invocations
//! - [`client`] - the websocket connection and its background loop

pub mod client;
pub mod messages;
pub mod protocol;

pub use client::{websocket_url, HubClient, HubClientConfig};
pub use messages::{get_keys_invocation, ErrorResult, ServerAction, ServerMessage};
pub use protocol::{HubEvent, HubFrame, Invocation};
