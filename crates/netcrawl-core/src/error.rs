//! Per-device discovery errors

use std::time::Duration;
use thiserror::Error;

use crate::device::DeviceAddress;
use crate::platform::PlatformFamily;

/// Failure of one step of a device visit.
///
/// Every variant except `InvalidConfig` is recovered by the engine: the
/// address stays visited and the traversal moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("No credentials configured for {0}")]
    NoCredentials(DeviceAddress),
    #[error("Connection to {address} failed: {reason}")]
    Connection {
        address: DeviceAddress,
        reason: String,
    },
    #[error("Command '{command}' failed on {address}: {reason}")]
    Command {
        address: DeviceAddress,
        command: String,
        reason: String,
    },
    #[error("Unsupported platform '{0}'")]
    UnsupportedPlatform(String),
    #[error("Failed to parse {platform} output: {reason}")]
    Parse {
        platform: PlatformFamily,
        reason: String,
    },
    #[error("Visit to {address} timed out after {elapsed:?}")]
    Timeout {
        address: DeviceAddress,
        elapsed: Duration,
    },
    #[error("Invalid discovery configuration: {0}")]
    InvalidConfig(String),
}

impl DiscoveryError {
    /// Short stable label used when summarizing failures
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoCredentials(_) => "no_credentials",
            Self::Connection { .. } => "connection",
            Self::Command { .. } => "command",
            Self::UnsupportedPlatform(_) => "unsupported_platform",
            Self::Parse { .. } => "parse",
            Self::Timeout { .. } => "timeout",
            Self::InvalidConfig(_) => "invalid_config",
        }
    }
}
