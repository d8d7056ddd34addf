//! Authentication-related error types.
//!
//! This module defines the outcomes of the HTTP authentication exchange
//! that are not a session credential.

use std::fmt;

/// Authentication-specific error variants.
///
/// The variant decides what the lifecycle does next: transient and protocol
/// failures are rescheduled, rejections end the daemon.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthError {
    /// The API token is missing or too short; detected before any request.
    InvalidToken { length: usize },

    /// Timeout, refused connection, DNS failure.
    NetworkTransient { message: String },

    /// The server answered but the body could not be decoded.
    Protocol { status: u16, message: String },

    /// The server refused the token with a structured error body.
    Rejected {
        status: u16,
        messages: Vec<String>,
        exception: Option<String>,
    },
}

impl AuthError {
    /// Check if the authentication should be attempted again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthError::NetworkTransient { .. } | AuthError::Protocol { .. }
        )
    }

    /// Get a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::InvalidToken { length: 0 } => "No API token provided.".to_string(),
            AuthError::InvalidToken { .. } => {
                "The API token is too short. Copy the full token from the web console.".to_string()
            }
            AuthError::NetworkTransient { .. } => {
                "The authentication server could not be reached. Retrying soon.".to_string()
            }
            AuthError::Protocol { .. } => {
                "The authentication server sent an unexpected response. Retrying soon.".to_string()
            }
            AuthError::Rejected { messages, .. } if !messages.is_empty() => {
                format!("Authentication refused: {}", messages.join("; "))
            }
            AuthError::Rejected { .. } => "Authentication refused by the server.".to_string(),
        }
    }

    /// Get a short error code for logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidToken { .. } => "E_AUTH_TOKEN",
            AuthError::NetworkTransient { .. } => "E_AUTH_NET",
            AuthError::Protocol { .. } => "E_AUTH_PROTOCOL",
            AuthError::Rejected { .. } => "E_AUTH_REJECTED",
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidToken { length } => {
                write!(f, "Invalid API token ({} characters)", length)
            }
            AuthError::NetworkTransient { message } => {
                write!(f, "Authentication request failed: {}", message)
            }
            AuthError::Protocol { status, message } => {
                write!(f, "Undecodable authentication response ({}): {}", status, message)
            }
            AuthError::Rejected {
                status,
                messages,
                exception,
            } => {
                write!(f, "Authentication rejected ({})", status)?;
                if !messages.is_empty() {
                    write!(f, ": {}", messages.join("; "))?;
                } else if let Some(exception) = exception {
                    write!(f, ": {}", exception)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for AuthError {}
