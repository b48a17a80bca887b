//! In-Memory ELM327 Emulator
//!
//! A [`Transport`] that answers the AT and Mode 01 commands the dashboard
//! uses, for development without a vehicle and for tests. Engine values and
//! faults are driven through a shared [`EmulatorProbe`].

use crate::error::{ConnectError, ObdError};
use crate::protocol::ObdProtocol;
use crate::transport::{Connector, DeviceAddress, Transport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Something the emulator observed, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmulatorEvent {
    /// A complete command line was received
    Command(String),
    /// Pending output was drained; carries the byte count
    Drain(usize),
    /// The transport was closed
    Closed,
}

#[derive(Debug)]
struct ProbeState {
    rpm: u32,
    speed_kmh: u8,
    overrides: HashMap<String, String>,
    fail_write_at: Option<usize>,
    refuse_connect: bool,
    writes: usize,
    connects: usize,
    closes: usize,
    events: Vec<EmulatorEvent>,
}

/// Shared handle to inspect and steer emulated adapters
#[derive(Debug, Clone)]
pub struct EmulatorProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl Default for EmulatorProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl EmulatorProbe {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ProbeState {
                rpm: 850,
                speed_kmh: 0,
                overrides: HashMap::new(),
                fail_write_at: None,
                refuse_connect: false,
                writes: 0,
                connects: 0,
                closes: 0,
                events: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Engine speed reported for `010C`
    pub fn set_rpm(&self, rpm: u32) {
        self.lock().rpm = rpm;
    }

    /// Vehicle speed reported for `010D`
    pub fn set_speed(&self, speed_kmh: u8) {
        self.lock().speed_kmh = speed_kmh;
    }

    /// Reply to `command` with `response` verbatim instead of emulating it
    pub fn set_override(&self, command: &str, response: &str) {
        self.lock()
            .overrides
            .insert(command.to_ascii_uppercase(), response.to_string());
    }

    /// Make the `n`th write (1-based, counted across connections) fail
    pub fn fail_write_at(&self, n: usize) {
        self.lock().fail_write_at = Some(n);
    }

    /// Make the connector refuse new connections
    pub fn refuse_connect(&self, refuse: bool) {
        self.lock().refuse_connect = refuse;
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    /// Command lines received so far
    pub fn commands(&self) -> Vec<String> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                EmulatorEvent::Command(c) => Some(c.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn events(&self) -> Vec<EmulatorEvent> {
        self.lock().events.clone()
    }
}

/// An emulated ELM327 v1.5 adapter
pub struct Elm327Emulator {
    probe: EmulatorProbe,
    echo: bool,
    protocol: ObdProtocol,
    line: Vec<u8>,
    pending: Vec<u8>,
    connected: bool,
}

impl Elm327Emulator {
    pub fn new(probe: EmulatorProbe) -> Self {
        Self {
            probe,
            echo: true,
            protocol: ObdProtocol::Auto,
            line: Vec::new(),
            pending: Vec::new(),
            connected: true,
        }
    }

    /// Protocol most recently selected with `ATSPn`
    pub fn protocol(&self) -> ObdProtocol {
        self.protocol
    }

    fn process_command(&mut self, command: &str) -> String {
        let state = self.probe.lock();
        if let Some(response) = state.overrides.get(command) {
            return response.clone();
        }

        match command {
            "ATZ" => {
                drop(state);
                self.echo = true;
                self.protocol = ObdProtocol::Auto;
                "\r\rELM327 v1.5\r\r>".to_string()
            }
            "ATE0" | "ATE1" => {
                drop(state);
                self.echo = command == "ATE1";
                "OK\r\r>".to_string()
            }
            c if c.starts_with("ATSP") => match ObdProtocol::from_elm_command(c) {
                Some(protocol) => {
                    drop(state);
                    self.protocol = protocol;
                    "OK\r\r>".to_string()
                }
                None => "?\r\r>".to_string(),
            },
            "010C" => {
                let raw = state.rpm.saturating_mul(4).min(u32::from(u16::MAX));
                format!("41 0C {:02X} {:02X} \r\r>", raw >> 8, raw & 0xFF)
            }
            "010D" => format!("41 0D {:02X} \r\r>", state.speed_kmh),
            c if c.starts_with("01") => "NO DATA\r\r>".to_string(),
            _ => "?\r\r>".to_string(),
        }
    }
}

#[async_trait]
impl Transport for Elm327Emulator {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), ObdError> {
        if !self.connected {
            return Err(ObdError::Disconnected);
        }

        {
            let mut state = self.probe.lock();
            state.writes += 1;
            if state.fail_write_at == Some(state.writes) {
                drop(state);
                self.connected = false;
                return Err(ObdError::Io("injected write failure".to_string()));
            }
        }

        for &byte in bytes {
            match byte {
                b'\r' => {
                    let command = String::from_utf8_lossy(&self.line).trim().to_ascii_uppercase();
                    self.line.clear();
                    if command.is_empty() {
                        continue;
                    }
                    self.probe
                        .lock()
                        .events
                        .push(EmulatorEvent::Command(command.clone()));
                    // Echo reflects the setting in force when the line arrived
                    let echo = self.echo;
                    let response = self.process_command(&command);
                    debug!("Emulator {} -> {:?}", command, response);
                    if echo {
                        self.pending.extend_from_slice(command.as_bytes());
                        self.pending.push(b'\r');
                    }
                    self.pending.extend_from_slice(response.as_bytes());
                }
                b'\n' => {}
                other => self.line.push(other),
            }
        }
        Ok(())
    }

    async fn read_available(&mut self) -> Result<Vec<u8>, ObdError> {
        if !self.connected {
            return Err(ObdError::Disconnected);
        }
        let drained = std::mem::take(&mut self.pending);
        self.probe.lock().events.push(EmulatorEvent::Drain(drained.len()));
        Ok(drained)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn close(&mut self) {
        self.connected = false;
        let mut state = self.probe.lock();
        state.closes += 1;
        state.events.push(EmulatorEvent::Closed);
    }
}

/// Connector handing out [`Elm327Emulator`]s bound to one probe
#[derive(Debug, Clone, Default)]
pub struct EmulatorConnector {
    probe: EmulatorProbe,
}

impl EmulatorConnector {
    pub fn new(probe: EmulatorProbe) -> Self {
        Self { probe }
    }

    pub fn probe(&self) -> &EmulatorProbe {
        &self.probe
    }
}

#[async_trait]
impl Connector for EmulatorConnector {
    async fn connect(&self, address: &DeviceAddress) -> Result<Box<dyn Transport>, ConnectError> {
        {
            let mut state = self.probe.lock();
            if state.refuse_connect {
                return Err(ConnectError::Unreachable {
                    address: address.to_string(),
                    reason: "emulated adapter refused connection".to_string(),
                });
            }
            state.connects += 1;
        }
        Ok(Box::new(Elm327Emulator::new(self.probe.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn exchange(emu: &mut Elm327Emulator, cmd: &str) -> String {
        emu.write(format!("{cmd}\r").as_bytes()).await.unwrap();
        String::from_utf8(emu.read_available().await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_init_sequence_and_echo() {
        let mut emu = Elm327Emulator::new(EmulatorProbe::new());
        assert_eq!(exchange(&mut emu, "ATZ").await, "ATZ\r\r\rELM327 v1.5\r\r>");
        assert_eq!(exchange(&mut emu, "ATE0").await, "ATE0\rOK\r\r>");
        assert_eq!(exchange(&mut emu, "ATSP6").await, "OK\r\r>");
        assert_eq!(emu.protocol(), ObdProtocol::Iso15765_4Can11bit500);
    }

    #[tokio::test]
    async fn test_pid_replies() {
        let probe = EmulatorProbe::new();
        probe.set_rpm(1726);
        probe.set_speed(50);
        let mut emu = Elm327Emulator::new(probe);
        exchange(&mut emu, "ATE0").await;

        assert_eq!(exchange(&mut emu, "010C").await, "41 0C 1A F8 \r\r>");
        assert_eq!(exchange(&mut emu, "010D").await, "41 0D 32 \r\r>");
        assert_eq!(exchange(&mut emu, "0105").await, "NO DATA\r\r>");
        assert_eq!(exchange(&mut emu, "XYZ").await, "?\r\r>");
    }

    #[tokio::test]
    async fn test_injected_write_failure() {
        let probe = EmulatorProbe::new();
        probe.fail_write_at(2);
        let mut emu = Elm327Emulator::new(probe);

        assert!(emu.write(b"ATZ\r").await.is_ok());
        assert!(matches!(emu.write(b"ATE0\r").await, Err(ObdError::Io(_))));
        assert!(!emu.is_connected());
        assert_eq!(emu.read_available().await, Err(ObdError::Disconnected));
    }

    #[tokio::test]
    async fn test_connector_refusal() {
        let connector = EmulatorConnector::default();
        let addr = DeviceAddress::SerialPath("/dev/rfcomm0".into());
        assert!(connector.connect(&addr).await.is_ok());

        connector.probe().refuse_connect(true);
        assert!(matches!(
            connector.connect(&addr).await,
            Err(ConnectError::Unreachable { .. })
        ));
        assert_eq!(connector.probe().connects(), 1);
    }
}
