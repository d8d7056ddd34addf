//! Daemon configuration.
//!
//! Settings come from a camelCase JSON file. The API token may also be
//! supplied through the environment, which wins over the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::auth::MIN_TOKEN_LENGTH;
use crate::daemon::{LifecycleSettings, RetryPolicy};
use crate::error::ConfigError;

/// Config file used when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Environment variables checked, in order, for the API token.
pub const TOKEN_ENV_VARS: [&str; 2] = ["ACCESSH_API_TOKEN", "API_TOKEN"];

const DEFAULT_KEY_FILE: &str = "/root/.ssh/authorized_keys";

/// Where the key file lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum RuntimeMode {
    /// Use `authorizedKeysFilePath`.
    #[default]
    Standard,
    /// Use `authorized_keys` in the working directory.
    Docker,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    pub delays_secs: Vec<u64>,
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            delays_secs: policy.delays().iter().map(Duration::as_secs).collect(),
            max_attempts: policy.max_attempts(),
        }
    }
}

/// Parsed daemon settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonConfig {
    pub server_url: String,
    pub hub_url: String,
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_key_file")]
    pub authorized_keys_file_path: PathBuf,
    #[serde(default)]
    pub mode: RuntimeMode,
    #[serde(default)]
    pub request_keys_on_connect: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_key_file() -> PathBuf {
    PathBuf::from(DEFAULT_KEY_FILE)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_reconnect_delay() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    100
}

fn default_shutdown_grace() -> u64 {
    15
}

impl DaemonConfig {
    /// Read the file, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse without touching the environment or validating.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Replace the API token with the first non-empty token variable.
    pub fn apply_env(&mut self) {
        let token = TOKEN_ENV_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|value| !value.trim().is_empty());
        if let Some(token) = token {
            self.api_token = token;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url("serverUrl", &self.server_url)?;
        validate_url("hubUrl", &self.hub_url)?;

        let length = self.api_token.trim().chars().count();
        if length < MIN_TOKEN_LENGTH {
            return Err(ConfigError::Token {
                length,
                minimum: MIN_TOKEN_LENGTH,
            });
        }

        if self.retry.delays_secs.is_empty() {
            return Err(ConfigError::Invalid {
                field: "retry.delaysSecs",
                reason: "at least one delay is required".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.maxAttempts",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Key file for the configured mode, relative to `cwd` in Docker mode.
    pub fn key_file_path(&self, cwd: &Path) -> PathBuf {
        match self.mode {
            RuntimeMode::Standard => self.authorized_keys_file_path.clone(),
            RuntimeMode::Docker => cwd.join("authorized_keys"),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry
                .delays_secs
                .iter()
                .copied()
                .map(Duration::from_secs)
                .collect(),
            self.retry.max_attempts,
        )
    }

    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        LifecycleSettings {
            retry: self.retry_policy(),
            reconnect_delay: self.reconnect_delay(),
            request_keys_on_connect: self.request_keys_on_connect,
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn validate_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Missing(field));
    }
    let url = reqwest::Url::parse(value).map_err(|e| ConfigError::Invalid {
        field,
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" | "ws" | "wss" => Ok(()),
        other => Err(ConfigError::Invalid {
            field,
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}
