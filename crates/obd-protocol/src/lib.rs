//! OBD-II Protocol Implementation
//!
//! This crate provides async communication with ELM327-compatible OBD-II
//! adapters reached over a Bluetooth SPP serial link: the byte transport,
//! one-at-a-time command framing, and decoding of Mode 01 responses.

mod channel;
mod emulator;
mod error;
mod pid;
mod protocol;
mod serial;
mod transport;

pub use channel::{CommandChannel, ReadStrategy, DEFAULT_SETTLE};
pub use emulator::{Elm327Emulator, EmulatorConnector, EmulatorEvent, EmulatorProbe};
pub use error::{ConnectError, ObdError};
pub use pid::{decode_rpm, decode_speed, Pid, PidRequest, Reading};
pub use protocol::{AtCommand, ObdProtocol};
pub use serial::{SerialConnector, SerialSettings, SerialTransport};
pub use transport::{Connector, DeviceAddress, Transport, SPP_UUID};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Positive response offset added to the request mode
    pub const RESPONSE_OFFSET: u8 = 0x40;
}
