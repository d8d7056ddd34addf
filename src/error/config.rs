//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for loading and validating the daemon configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Cannot read configuration file '{path}': {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the expected shape
    #[error("Invalid configuration file '{path}': {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A required setting is missing or empty
    #[error("Missing required setting '{0}'")]
    Missing(&'static str),

    /// A setting is present but unusable
    #[error("Invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    /// The API token is empty or shorter than the minimum length
    #[error("The API token is missing or too short ({length} characters, need at least {minimum})")]
    Token { length: usize, minimum: usize },
}
