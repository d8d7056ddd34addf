//! Unified error handling for the daemon.
//!
//! This module provides:
//!
//! - **Error Categories**: High-level classification for retry and exit decisions
//! - **Domain-specific Errors**: Config, Auth, Hub and KeyFile errors
//! - **Unified Error Type**: `DaemonError` consolidates all error types
//! - **Result Type Alias**: `DaemonResult<T>` for consistent return types
//!
//! # Error Categories
//!
//! | Category | Description | Retryable | Exit code |
//! |----------|-------------|-----------|-----------|
//! | Configuration | Missing token, bad URLs | No | 78 |
//! | Access | Key file missing or not writable | No | 77 |
//! | Network | Timeout, refused, DNS | Yes | 1 |
//! | Protocol | Undecodable server response | Yes | 1 |
//! | Rejected | Server refused the credentials | No | 4 |
//! | KeyFile | Managed region markers missing | No | 1 |
//! | ServerShutdown | Logout, removal, pushed error | No | 3 |

mod auth;
mod category;
mod config;
mod daemon_error;
mod hub;
mod key_file;

pub use auth::AuthError;
pub use category::ErrorCategory;
pub use config::ConfigError;
pub use daemon_error::DaemonError;
pub use hub::HubError;
pub use key_file::{classify_io_error, KeyFileError};

/// Type alias for Results using DaemonError.
pub type DaemonResult<T> = Result<T, DaemonError>;
