//! Mock implementations for testing.
//!
//! - [`MockHttpClient`] - HTTP client with scripted responses
//! - [`MockHubConnector`] - hub connector with event injection
//! - [`ImmediateScheduler`] - scheduler that runs delayed tasks at once

pub mod http;
pub mod hub;
pub mod scheduler;

pub use http::{MockHttpClient, MockResponse, RecordedRequest};
pub use hub::{ConnectCall, MockHubChannel, MockHubConnector};
pub use scheduler::ImmediateScheduler;
