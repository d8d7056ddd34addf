//! Trait abstractions for dependency injection and testability.
//!
//! # Traits
//!
//! - [`HttpClient`] - HTTP POST for the authentication endpoint
//! - [`HubConnector`] / [`HubChannel`] - duplex channel to the server hub
//! - [`TaskScheduler`] - immediate and delayed background work

pub mod http;
pub mod hub;
pub mod scheduler;

pub use http::{Headers, HttpClient, HttpError, Response};
pub use hub::{HubChannel, HubConnector, OpenChannel};
pub use scheduler::{Task, TaskScheduler};
