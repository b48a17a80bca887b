//! Live OBD-II Telemetry
//!
//! Turns request/response exchanges with an ELM327 adapter into a
//! continuously published feed of engine RPM, vehicle speed and connection
//! status, with a simulated source standing in when no adapter is reachable.

mod config;
mod error;
mod hub;
mod simulator;
mod snapshot;
mod telemetry_loop;

pub use self::config::{
    LogFormat, LoggingConfig, Mode, ReadStrategyKind, TelemetryConfig, TimingConfig, ENV_PREFIX,
};
pub use error::TelemetryError;
pub use hub::{ConnectOutcome, TelemetryHub};
pub use simulator::{SimulatedSource, RPM_BAND, SPEED_BAND};
pub use snapshot::{ConnectionState, Publisher, TelemetrySnapshot};
pub use telemetry_loop::{LoopState, StopReason, TelemetryLoop};
