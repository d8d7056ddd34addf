//! Unified error type for the daemon.
//!
//! `DaemonError` consolidates the domain-specific error types so the
//! lifecycle and `main` can make every fatal decision from one place:
//! categorisation, log text, and the process exit status.

use std::fmt;

use super::auth::AuthError;
use super::category::ErrorCategory;
use super::config::ConfigError;
use super::hub::HubError;
use super::key_file::KeyFileError;

/// Unified error type for the daemon.
#[derive(Debug)]
pub enum DaemonError {
    /// Invalid or missing configuration.
    Config(ConfigError),

    /// Authorized keys file problems (startup access check or region edits).
    KeyFile(KeyFileError),

    /// HTTP authentication failures.
    Auth(AuthError),

    /// Hub connection failures.
    Hub(HubError),

    /// The server told the daemon to stop.
    ServerRequestedShutdown { reason: String },

    /// Broken internal plumbing (closed channels, panicked tasks).
    Internal { message: String },
}

impl DaemonError {
    /// Get the category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            DaemonError::Config(_) => ErrorCategory::Configuration,
            DaemonError::KeyFile(err) => match err {
                KeyFileError::NotFound { .. } | KeyFileError::PermissionDenied { .. } => {
                    ErrorCategory::Access
                }
                KeyFileError::RegionNotFound { .. } => ErrorCategory::KeyFile,
                KeyFileError::Io { .. } => ErrorCategory::Internal,
            },
            DaemonError::Auth(err) => match err {
                AuthError::InvalidToken { .. } => ErrorCategory::Configuration,
                AuthError::NetworkTransient { .. } => ErrorCategory::Network,
                AuthError::Protocol { .. } => ErrorCategory::Protocol,
                AuthError::Rejected { .. } => ErrorCategory::Rejected,
            },
            DaemonError::Hub(err) => match err {
                HubError::Unauthorized { .. } | HubError::HandshakeRejected(_) => {
                    ErrorCategory::Rejected
                }
                HubError::InvalidUrl(_) => ErrorCategory::Configuration,
                HubError::Protocol(_) => ErrorCategory::Protocol,
                HubError::ConnectionFailed(_)
                | HubError::Timeout { .. }
                | HubError::SendFailed(_)
                | HubError::Disconnected => ErrorCategory::Network,
            },
            DaemonError::ServerRequestedShutdown { .. } => ErrorCategory::ServerShutdown,
            DaemonError::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            DaemonError::Auth(err) => err.is_retryable(),
            DaemonError::Hub(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Get a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            DaemonError::Config(err) => format!("Configuration problem: {}", err),
            DaemonError::KeyFile(err) => err.user_message(),
            DaemonError::Auth(err) => err.user_message(),
            DaemonError::Hub(err) => format!("Hub connection failed: {}", err),
            DaemonError::ServerRequestedShutdown { reason } => {
                format!("The server requested shutdown: {}", reason)
            }
            DaemonError::Internal { message } => format!("Internal error: {}", message),
        }
    }

    /// Get a short error code for logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            DaemonError::Config(_) => "E_CONFIG",
            DaemonError::KeyFile(err) => err.error_code(),
            DaemonError::Auth(err) => err.error_code(),
            DaemonError::Hub(err) => err.error_code(),
            DaemonError::ServerRequestedShutdown { .. } => "E_SERVER_SHUTDOWN",
            DaemonError::Internal { .. } => "E_INTERNAL",
        }
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        self.category().exit_code()
    }

    /// Get the recovery hint for this error.
    pub fn recovery_hint(&self) -> &'static str {
        self.category().recovery_hint()
    }

    pub fn internal(message: impl Into<String>) -> Self {
        DaemonError::Internal {
            message: message.into(),
        }
    }
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonError::Config(err) => write!(f, "{}", err),
            DaemonError::KeyFile(err) => write!(f, "{}", err),
            DaemonError::Auth(err) => write!(f, "{}", err),
            DaemonError::Hub(err) => write!(f, "{}", err),
            DaemonError::ServerRequestedShutdown { reason } => {
                write!(f, "Server requested shutdown: {}", reason)
            }
            DaemonError::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for DaemonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DaemonError::Config(err) => Some(err),
            DaemonError::KeyFile(err) => Some(err),
            DaemonError::Auth(err) => Some(err),
            DaemonError::Hub(err) => Some(err),
            _ => None,
        }
    }
}

// ============================================================================
// From implementations for automatic error conversion
// ============================================================================

impl From<ConfigError> for DaemonError {
    fn from(err: ConfigError) -> Self {
        DaemonError::Config(err)
    }
}

impl From<KeyFileError> for DaemonError {
    fn from(err: KeyFileError) -> Self {
        DaemonError::KeyFile(err)
    }
}

impl From<AuthError> for DaemonError {
    fn from(err: AuthError) -> Self {
        DaemonError::Auth(err)
    }
}

impl From<HubError> for DaemonError {
    fn from(err: HubError) -> Self {
        DaemonError::Hub(err)
    }
}
