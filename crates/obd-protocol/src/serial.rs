//! Serial Transport over Bluetooth SPP
//!
//! Paired SPP adapters are exposed by the OS as serial devices (an RFCOMM
//! TTY on Linux, an outgoing COM port on Windows). The connector resolves a
//! [`DeviceAddress`] to such a device and opens it with `tokio-serial`.

use crate::error::{ConnectError, ObdError};
use crate::transport::{Connector, DeviceAddress, Transport, SPP_UUID};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

/// How long a drain waits for the next chunk before declaring the input idle
const DRAIN_POLL: Duration = Duration::from_millis(5);

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Baud rate of the emulated serial line
    pub baud_rate: u32,
    /// Bluetooth MAC (`AA:BB:CC:DD:EE:FF`) to bound serial device path
    pub rfcomm_bindings: HashMap<String, String>,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            // ELM327 Bluetooth clones ship at 38400
            baud_rate: 38400,
            rfcomm_bindings: HashMap::new(),
        }
    }
}

/// Opens [`SerialTransport`]s for paired adapters
#[derive(Debug, Clone, Default)]
pub struct SerialConnector {
    settings: SerialSettings,
}

impl SerialConnector {
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }

    /// Resolve an address to the serial device that carries its SPP channel
    pub fn resolve(&self, address: &DeviceAddress) -> Result<String, ConnectError> {
        match address {
            DeviceAddress::SerialPath(path) => Ok(path.clone()),
            DeviceAddress::Bluetooth(_) => {
                let mac = address.to_string();
                self.settings
                    .rfcomm_bindings
                    .iter()
                    .find(|(bound, _)| bound.eq_ignore_ascii_case(&mac))
                    .map(|(_, path)| path.clone())
                    .ok_or(ConnectError::NotPaired(mac))
            }
        }
    }
}

#[async_trait]
impl Connector for SerialConnector {
    async fn connect(&self, address: &DeviceAddress) -> Result<Box<dyn Transport>, ConnectError> {
        let path = self.resolve(address)?;
        info!(
            "Opening SPP channel {} to {} via {} at {} baud",
            SPP_UUID, address, path, self.settings.baud_rate
        );

        let port = tokio_serial::new(&path, self.settings.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| map_open_error(&path, e))?;

        Ok(Box::new(SerialTransport::new(path, port)))
    }
}

fn map_open_error(path: &str, err: tokio_serial::Error) -> ConnectError {
    warn!("Failed to open {}: {}", path, err);
    match err.kind() {
        tokio_serial::ErrorKind::NoDevice
        | tokio_serial::ErrorKind::Io(std::io::ErrorKind::NotFound) => ConnectError::Unreachable {
            address: path.to_string(),
            reason: err.description,
        },
        tokio_serial::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            ConnectError::PermissionDenied(path.to_string())
        }
        _ => ConnectError::ChannelRefused {
            address: path.to_string(),
            reason: err.description,
        },
    }
}

/// An open serial link to the adapter
pub struct SerialTransport {
    path: String,
    port: Option<SerialStream>,
}

impl SerialTransport {
    fn new(path: String, port: SerialStream) -> Self {
        Self {
            path,
            port: Some(port),
        }
    }

    fn port(&mut self) -> Result<&mut SerialStream, ObdError> {
        self.port.as_mut().ok_or(ObdError::Disconnected)
    }

    fn mark_lost(&mut self, err: ObdError) -> ObdError {
        if err == ObdError::Disconnected {
            self.port = None;
        }
        err
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), ObdError> {
        let port = self.port()?;
        let result = async {
            port.write_all(bytes).await?;
            port.flush().await
        }
        .await;
        result.map_err(|e| self.mark_lost(e.into()))
    }

    async fn read_available(&mut self) -> Result<Vec<u8>, ObdError> {
        let port = self.port()?;
        let mut collected = Vec::new();
        let mut buf = [0u8; 256];

        loop {
            let polled = tokio::time::timeout(DRAIN_POLL, port.read(&mut buf)).await;
            match polled {
                // Nothing more pending
                Err(_) => break,
                Ok(Ok(0)) => return Err(self.mark_lost(ObdError::Disconnected)),
                Ok(Ok(n)) => collected.extend_from_slice(&buf[..n]),
                Ok(Err(e)) => return Err(self.mark_lost(e.into())),
            }
        }

        Ok(collected)
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    async fn close(&mut self) {
        if let Some(mut port) = self.port.take() {
            debug!("Closing serial link {}", self.path);
            if let Err(e) = port.shutdown().await {
                debug!("Shutdown of {} reported: {}", self.path, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_bound_mac() {
        let mut settings = SerialSettings::default();
        settings
            .rfcomm_bindings
            .insert("00:1d:a5:68:98:8b".into(), "/dev/rfcomm0".into());
        let connector = SerialConnector::new(settings);

        let addr: DeviceAddress = "00:1D:A5:68:98:8B".parse().unwrap();
        assert_eq!(connector.resolve(&addr).unwrap(), "/dev/rfcomm0");
    }

    #[test]
    fn test_resolve_unpaired_mac() {
        let connector = SerialConnector::default();
        let addr: DeviceAddress = "00:1D:A5:68:98:8B".parse().unwrap();
        assert_eq!(
            connector.resolve(&addr),
            Err(ConnectError::NotPaired("00:1D:A5:68:98:8B".into()))
        );
    }

    #[tokio::test]
    async fn test_connect_missing_device() {
        let connector = SerialConnector::default();
        let addr = DeviceAddress::SerialPath("/dev/obd-dashboard-missing-rfcomm".into());
        assert!(connector.connect(&addr).await.is_err());
    }
}
