//! accessh-daemon: keeps the managed region of an `authorized_keys` file in
//! sync with the keys an acces.sh server pushes over its hub connection.
//!
//! This library exposes modules for use in integration tests.

pub mod adapters;
pub mod auth;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod dispatcher;
pub mod error;
pub mod hub;
pub mod keys;
pub mod startup;
pub mod traits;
