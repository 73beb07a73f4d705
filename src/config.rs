//! Exchange configuration parsing and validation.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::models::role::ExchangeRole;
use crate::transport::frame::DEFAULT_MAX_FRAME_BYTES;
use crate::{AppError, Result};

fn default_connect_timeout_ms() -> u64 {
    1000
}

fn default_reconnect_interval_ms() -> u64 {
    2000
}

fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}

/// Timing and size limits the coordinator runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeSettings {
    /// Bound on a single connect attempt.
    pub connect_timeout: Duration,
    /// Fixed period between reconnect attempts and listener rebinds.
    pub reconnect_interval: Duration,
    /// Largest payload accepted on the pipe.
    pub max_frame_bytes: usize,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(default_connect_timeout_ms()),
            reconnect_interval: Duration::from_millis(default_reconnect_interval_ms()),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

/// Exchange configuration parsed from a TOML file.
///
/// ```toml
/// channel_name = "Channel"
/// role = "listener"
/// connect_timeout_ms = 1000
/// reconnect_interval_ms = 2000
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ExchangeConfig {
    /// Name both peers use to locate the pipe.
    pub channel_name: String,
    /// Side of the pipe this process owns.
    pub role: ExchangeRole,
    /// Bound on a single connect attempt, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Period between reconnect attempts, in milliseconds.
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// Largest payload accepted on the pipe, in bytes.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl ExchangeConfig {
    /// Build a configuration with default timings.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the channel name or role is invalid.
    pub fn new(channel_name: impl Into<String>, role: ExchangeRole) -> Result<Self> {
        let config = Self {
            channel_name: channel_name.into(),
            role,
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_frame_bytes: default_max_frame_bytes(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Timing and size limits derived from this configuration.
    #[must_use]
    pub fn settings(&self) -> ExchangeSettings {
        ExchangeSettings {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            reconnect_interval: Duration::from_millis(self.reconnect_interval_ms),
            max_frame_bytes: self.max_frame_bytes,
        }
    }

    fn validate(&self) -> Result<()> {
        validate_channel_name(&self.channel_name)?;

        if !self.role.is_set() {
            return Err(AppError::Config(
                "role must be 'listener' or 'connector'".into(),
            ));
        }

        if self.connect_timeout_ms == 0 {
            return Err(AppError::Config(
                "connect_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.reconnect_interval_ms == 0 {
            return Err(AppError::Config(
                "reconnect_interval_ms must be greater than zero".into(),
            ));
        }

        if self.max_frame_bytes == 0 {
            return Err(AppError::Config(
                "max_frame_bytes must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

/// Check that a channel name is usable as a pipe name.
///
/// # Errors
///
/// Returns `AppError::Config` if the name is empty, contains a path
/// separator or a NUL byte.
pub fn validate_channel_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AppError::Config("channel_name must not be empty".into()));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(AppError::Config(format!(
            "channel_name '{name}' must not contain path separators or NUL"
        )));
    }
    Ok(())
}
