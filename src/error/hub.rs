//! Hub connection error types.
//!
//! Errors raised while opening or using the duplex channel to the server's
//! hub endpoint.

use std::fmt;

/// Hub connection errors.
#[derive(Debug, Clone, PartialEq)]
pub enum HubError {
    /// The hub URL cannot be turned into a websocket URL.
    InvalidUrl(String),

    /// The transport could not be established (refused, reset, TLS, DNS).
    ConnectionFailed(String),

    /// Connect or handshake did not complete in time.
    Timeout { secs: u64 },

    /// The websocket upgrade was refused with 401/403.
    Unauthorized { status: u16 },

    /// The hub replied to the protocol handshake with an error.
    HandshakeRejected(String),

    /// A frame could not be decoded.
    Protocol(String),

    /// A message could not be written to the channel.
    SendFailed(String),

    /// The channel is already closed.
    Disconnected,
}

impl HubError {
    /// Check if a connect attempt failing with this error should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HubError::ConnectionFailed(_)
                | HubError::Timeout { .. }
                | HubError::Protocol(_)
                | HubError::SendFailed(_)
                | HubError::Disconnected
        )
    }

    /// True when the server refused the session credential.
    pub fn is_rejection(&self) -> bool {
        matches!(self, HubError::Unauthorized { .. })
    }

    /// Get a short error code for logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            HubError::InvalidUrl(_) => "E_HUB_URL",
            HubError::ConnectionFailed(_) => "E_HUB_CONN",
            HubError::Timeout { .. } => "E_HUB_TIMEOUT",
            HubError::Unauthorized { .. } => "E_HUB_UNAUTHORIZED",
            HubError::HandshakeRejected(_) => "E_HUB_HANDSHAKE",
            HubError::Protocol(_) => "E_HUB_PROTOCOL",
            HubError::SendFailed(_) => "E_HUB_SEND",
            HubError::Disconnected => "E_HUB_DISCONNECTED",
        }
    }
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubError::InvalidUrl(msg) => write!(f, "Invalid hub URL: {}", msg),
            HubError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            HubError::Timeout { secs } => write!(f, "Connection timed out after {}s", secs),
            HubError::Unauthorized { status } => {
                write!(f, "Hub refused the session credential ({})", status)
            }
            HubError::HandshakeRejected(msg) => write!(f, "Hub handshake rejected: {}", msg),
            HubError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            HubError::SendFailed(msg) => write!(f, "Send failed: {}", msg),
            HubError::Disconnected => write!(f, "Disconnected from server"),
        }
    }
}

impl std::error::Error for HubError {}
