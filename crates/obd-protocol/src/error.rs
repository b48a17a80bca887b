//! OBD-II Error Types

use thiserror::Error;

/// Errors raised while opening the link to an adapter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// Address string is neither a Bluetooth MAC nor a device path
    #[error("Invalid device address: {0}")]
    InvalidAddress(String),

    /// Device could not be reached
    #[error("Device {address} unreachable: {reason}")]
    Unreachable { address: String, reason: String },

    /// No serial binding exists for this Bluetooth device
    #[error("Device {0} is not paired")]
    NotPaired(String),

    /// The OS refused access to the serial channel
    #[error("Permission denied opening {0}")]
    PermissionDenied(String),

    /// The serial channel could not be opened
    #[error("Serial channel to {address} refused: {reason}")]
    ChannelRefused { address: String, reason: String },
}

/// Errors that can occur during OBD-II communication
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObdError {
    /// Connection could not be established
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Read or write failure on an open link
    #[error("Serial I/O error: {0}")]
    Io(String),

    /// The link was closed by the adapter or locally
    #[error("OBD adapter disconnected")]
    Disconnected,
}

impl From<std::io::Error> for ObdError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::UnexpectedEof => ObdError::Disconnected,
            _ => ObdError::Io(err.to_string()),
        }
    }
}
