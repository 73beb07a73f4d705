//! Exchange role: which side of the pipe a coordinator owns.
//!
//! `ExchangeRole` doubles as the `--role` CLI flag value and the `role`
//! key of the TOML configuration.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::AppError;

/// Fixed, asymmetric role of one exchange peer.
///
/// Recorded once by the first `start` call and immutable afterwards.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeRole {
    /// No role recorded yet.
    #[default]
    #[value(skip)]
    Unset,
    /// Binds the named channel and accepts one peer.
    Listener,
    /// Dials an existing named channel.
    Connector,
}

impl ExchangeRole {
    /// Whether a concrete role has been chosen.
    #[must_use]
    pub fn is_set(self) -> bool {
        !matches!(self, Self::Unset)
    }

    /// Wire/config name of the role.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Listener => "listener",
            Self::Connector => "connector",
        }
    }
}

impl Display for ExchangeRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "listener" => Ok(Self::Listener),
            "connector" => Ok(Self::Connector),
            "unset" => Ok(Self::Unset),
            other => Err(AppError::Config(format!("unknown exchange role: {other}"))),
        }
    }
}
