use thiserror::Error;

use crate::config::ConfigError;
use crate::types::DeviceId;

/// Error type for session, registry and backend operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The device-discovery call itself failed.
    #[error("Discovery failed: {0}")]
    Discovery(String),
    /// A single device could not be opened or configured.
    #[error("Failed to open device {id}: {reason}")]
    Open { id: DeviceId, reason: String },
    /// Operation is not supported by the device or backend.
    #[error("Operation unsupported")]
    Unsupported,
    /// A transient read/write failure; the caller retries next tick.
    #[error("Device I/O error: {0}")]
    Io(String),
    /// The effect was released by its registry.
    #[error("Effect released")]
    Released,
    /// Requested device or slot is not known.
    #[error("Not found: {0}")]
    NotFound(u32),
    /// A generic backend error.
    #[error("Backend error: {0}")]
    Backend(String),
    /// The session config failed validation.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Convenient result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;
