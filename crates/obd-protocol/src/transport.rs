//! Byte Transport to the Adapter
//!
//! A [`Transport`] is an owned point-to-point byte channel. A [`Connector`]
//! opens one for a [`DeviceAddress`]. Neither layer retries.

use crate::error::{ConnectError, ObdError};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Bluetooth Serial Port Profile service class
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// An open byte channel to an ELM327 adapter
#[async_trait]
pub trait Transport: Send {
    /// Write all bytes to the adapter
    async fn write(&mut self, bytes: &[u8]) -> Result<(), ObdError>;

    /// Return whatever bytes are pending without waiting for more.
    ///
    /// An empty vector means nothing has arrived yet.
    async fn read_available(&mut self) -> Result<Vec<u8>, ObdError>;

    /// Whether the link is still usable
    fn is_connected(&self) -> bool;

    /// Close the link and release OS resources
    async fn close(&mut self);
}

/// Opens transports; the adapter handle collaborators hand to the hub
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, address: &DeviceAddress) -> Result<Box<dyn Transport>, ConnectError>;
}

/// Where the adapter lives
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceAddress {
    /// Bluetooth MAC of a paired adapter
    Bluetooth([u8; 6]),
    /// Serial device path, e.g. `/dev/rfcomm0` or `COM5`
    SerialPath(String),
}

impl FromStr for DeviceAddress {
    type Err = ConnectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with('/') || s.to_ascii_uppercase().starts_with("COM") {
            return Ok(DeviceAddress::SerialPath(s.to_string()));
        }

        let octets: Vec<&str> = s.split([':', '-']).collect();
        if octets.len() != 6 {
            return Err(ConnectError::InvalidAddress(s.to_string()));
        }

        let mut mac = [0u8; 6];
        for (slot, octet) in mac.iter_mut().zip(&octets) {
            if octet.len() != 2 || !octet.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(ConnectError::InvalidAddress(s.to_string()));
            }
            *slot = u8::from_str_radix(octet, 16)
                .map_err(|_| ConnectError::InvalidAddress(s.to_string()))?;
        }
        Ok(DeviceAddress::Bluetooth(mac))
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceAddress::Bluetooth(mac) => write!(
                f,
                "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
                mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
            ),
            DeviceAddress::SerialPath(path) => f.write_str(path),
        }
    }
}
