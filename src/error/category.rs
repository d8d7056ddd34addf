//! Error category classification for unified error handling.
//!
//! This module provides a high-level categorization of errors so the
//! lifecycle can decide between rescheduling and shutting down, and so the
//! process can exit with a status that tells operators what went wrong.

use std::fmt;

/// High-level categorization of errors for handling decisions.
///
/// Categories enable consistent:
/// - Retry policies (transient vs. permanent errors)
/// - Log severity (a retry is not an alarm)
/// - Process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Missing or invalid settings (token, URLs, retry policy).
    /// Not retryable until the configuration is corrected.
    Configuration,

    /// The authorized keys file is missing or not readable and writable.
    Access,

    /// Timeouts, refused connections, DNS failures.
    /// Transient and retried with backoff.
    Network,

    /// The server answered with something that could not be decoded.
    /// Retried like network errors.
    Protocol,

    /// The server explicitly refused the credentials or the session.
    Rejected,

    /// The authorized keys file has no managed region to edit.
    KeyFile,

    /// The server asked the daemon to stop (logout, removal, error push).
    ServerShutdown,

    /// Anything else (I/O failures, broken internal channels).
    Internal,
}

impl ErrorCategory {
    /// Returns true if errors in this category are transient and the
    /// operation should be rescheduled.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Network | ErrorCategory::Protocol)
    }

    /// Returns a short label for the category suitable for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Access => "access",
            ErrorCategory::Network => "network",
            ErrorCategory::Protocol => "protocol",
            ErrorCategory::Rejected => "rejected",
            ErrorCategory::KeyFile => "key_file",
            ErrorCategory::ServerShutdown => "server_shutdown",
            ErrorCategory::Internal => "internal",
        }
    }

    /// Process exit status for a fatal error of this category.
    ///
    /// Configuration and access problems use the sysexits values so service
    /// managers can tell "fix the host" apart from "the server said no".
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorCategory::Configuration => 78,
            ErrorCategory::Access => 77,
            ErrorCategory::ServerShutdown => 3,
            ErrorCategory::Rejected => 4,
            ErrorCategory::Network
            | ErrorCategory::Protocol
            | ErrorCategory::KeyFile
            | ErrorCategory::Internal => 1,
        }
    }

    /// Returns suggested recovery actions for this category.
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "Check config.json and the API token.",
            ErrorCategory::Access => {
                "Make sure the authorized_keys file exists and is writable by the daemon."
            }
            ErrorCategory::Network | ErrorCategory::Protocol => {
                "The daemon retries automatically; check connectivity to the server."
            }
            ErrorCategory::Rejected => "Generate a new API token for this server.",
            ErrorCategory::KeyFile => {
                "Restore the ACCES.SH marker lines in the authorized_keys file."
            }
            ErrorCategory::ServerShutdown => "The server removed or logged out this daemon.",
            ErrorCategory::Internal => "Check the logs for details.",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
