//! Concrete implementations of trait abstractions.
//!
//! # Adapters
//!
//! - [`ReqwestHttpClient`] - HTTP client using reqwest
//! - [`TungsteniteHubConnector`] - hub channels over tokio-tungstenite
//! - [`TokioScheduler`] - task scheduling on the tokio runtime
//!
//! The [`mock`] submodule provides test doubles for each of them.

pub mod mock;
pub mod reqwest_http;
pub mod tokio_scheduler;
pub mod tungstenite_hub;

pub use reqwest_http::{ReqwestHttpClient, DEFAULT_REQUEST_TIMEOUT};
pub use tokio_scheduler::TokioScheduler;
pub use tungstenite_hub::TungsteniteHubConnector;
