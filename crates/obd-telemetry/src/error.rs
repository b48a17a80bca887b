//! Telemetry Error Types

use obd_protocol::ObdError;
use thiserror::Error;

/// Errors surfaced by the telemetry hub and its configuration
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// `start` was called without a prior successful `connect`
    #[error("No telemetry source prepared; call connect() first")]
    NotConnected,

    /// A producer is already publishing
    #[error("Telemetry producer already running")]
    AlreadyRunning,

    /// Configured device address is neither a Bluetooth MAC nor a device path
    #[error("Invalid device address: {0}")]
    InvalidAddress(String),

    /// Adapter communication failure
    #[error(transparent)]
    Obd(#[from] ObdError),

    /// Configuration sources could not be loaded or deserialized
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
