//! Published telemetry state

use obd_protocol::Reading;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Link status shown to collaborators
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    /// Live adapter data
    Connected,
    /// Fabricated data; never confuse with `Connected`
    Simulated,
    Failed(String),
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Simulated => f.write_str("simulated"),
            ConnectionState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Latest readings plus link status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Engine RPM
    pub rpm: u32,
    /// Vehicle speed (km/h)
    pub speed_kmh: u32,
    pub state: ConnectionState,
    /// Number of value publishes since creation or the last reset
    pub sequence: u64,
    /// Timestamp of the last value publish (Unix ms)
    pub updated_at_ms: u64,
}

impl TelemetrySnapshot {
    fn touch(&mut self) {
        self.sequence += 1;
        self.updated_at_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
    }
}

/// Write side of the hub's snapshot, handed to the single active producer
#[derive(Debug, Clone)]
pub struct Publisher {
    tx: Arc<watch::Sender<TelemetrySnapshot>>,
}

impl Publisher {
    pub(crate) fn new(tx: Arc<watch::Sender<TelemetrySnapshot>>) -> Self {
        Self { tx }
    }

    /// Store a decoded reading; `DecodeFailed` leaves the snapshot untouched.
    ///
    /// Returns whether anything was published.
    pub fn publish(&self, reading: Reading) -> bool {
        self.tx.send_if_modified(|snapshot| {
            match reading {
                Reading::Rpm(rpm) => snapshot.rpm = rpm,
                Reading::SpeedKmh(speed) => snapshot.speed_kmh = speed,
                Reading::DecodeFailed => return false,
            }
            snapshot.touch();
            true
        })
    }

    /// Store RPM and speed as one update
    pub fn publish_pair(&self, rpm: u32, speed_kmh: u32) {
        self.tx.send_modify(|snapshot| {
            snapshot.rpm = rpm;
            snapshot.speed_kmh = speed_kmh;
            snapshot.touch();
        });
    }

    /// Update the link status, keeping the last readings visible
    pub fn set_state(&self, state: ConnectionState) {
        self.tx.send_if_modified(|snapshot| {
            if snapshot.state == state {
                return false;
            }
            snapshot.state = state;
            true
        });
    }
}
