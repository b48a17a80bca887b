//! Telemetry configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! TOML file, then `OBD_DASH_*` environment variables.

use crate::error::TelemetryError;
use obd_protocol::{DeviceAddress, ReadStrategy, SerialSettings};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix, e.g. `OBD_DASH_MOCK=false`
pub const ENV_PREFIX: &str = "OBD_DASH";

/// Where telemetry comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Poll a real adapter at this address
    Live(DeviceAddress),
    /// Fabricate plausible values
    Simulated,
}

/// Telemetry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Use the simulated source instead of a live adapter
    pub mock: bool,

    /// Bluetooth MAC or serial device path of the adapter
    pub device_address: String,

    /// Serial link settings
    pub serial: SerialSettings,

    /// Protocol and cadence timings
    pub timing: TimingConfig,

    /// Response collection strategy
    pub read_strategy: ReadStrategyKind,

    /// Upper bound on waiting for the `>` prompt (milliseconds)
    pub prompt_timeout_ms: u64,

    /// Log output settings
    pub logging: LoggingConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            mock: true,
            device_address: "/dev/rfcomm0".to_string(),
            serial: SerialSettings::default(),
            timing: TimingConfig::default(),
            read_strategy: ReadStrategyKind::Settle,
            prompt_timeout_ms: 500,
            logging: LoggingConfig::default(),
        }
    }
}

impl TelemetryConfig {
    /// Load defaults, then `path` (if given), then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, TelemetryError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Resolve the configured source
    pub fn mode(&self) -> Result<Mode, TelemetryError> {
        if self.mock {
            return Ok(Mode::Simulated);
        }
        self.device_address
            .parse()
            .map(Mode::Live)
            .map_err(|_| TelemetryError::InvalidAddress(self.device_address.clone()))
    }

    pub fn read_strategy(&self) -> ReadStrategy {
        match self.read_strategy {
            ReadStrategyKind::Settle => ReadStrategy::Settle,
            ReadStrategyKind::UntilPrompt => ReadStrategy::UntilPrompt {
                timeout: Duration::from_millis(self.prompt_timeout_ms),
            },
        }
    }
}

/// Serializable selector for [`ReadStrategy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadStrategyKind {
    Settle,
    UntilPrompt,
}

/// Delays used by the adapter handshake and polling cadence (milliseconds)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Wait after each command before draining the reply
    pub settle_ms: u64,
    /// Pause after `ATZ`
    pub reset_delay_ms: u64,
    /// Pause after `ATE0`
    pub echo_off_delay_ms: u64,
    /// Pause after `ATSP0`
    pub protocol_delay_ms: u64,
    /// Pause between live RPM+speed cycles
    pub cycle_pause_ms: u64,
    /// Publish interval of the simulated source
    pub simulated_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_ms: 100,
            reset_delay_ms: 1000,
            echo_off_delay_ms: 200,
            protocol_delay_ms: 500,
            cycle_pause_ms: 500,
            simulated_interval_ms: 1000,
        }
    }
}

impl TimingConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn cycle_pause(&self) -> Duration {
        Duration::from_millis(self.cycle_pause_ms)
    }

    pub fn simulated_interval(&self) -> Duration {
        Duration::from_millis(self.simulated_interval_ms)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Maximum level: `trace`, `debug`, `info`, `warn` or `error`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_simulated() {
        let config = TelemetryConfig::default();
        assert_eq!(config.mode().unwrap(), Mode::Simulated);
        assert_eq!(config.read_strategy(), ReadStrategy::Settle);
        assert_eq!(config.timing.settle(), Duration::from_millis(100));
    }

    #[test]
    fn test_live_mode_parses_address() {
        let config = TelemetryConfig {
            mock: false,
            device_address: "00:1D:A5:68:98:8B".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.mode().unwrap(),
            Mode::Live(DeviceAddress::Bluetooth(_))
        ));

        let bad = TelemetryConfig {
            mock: false,
            device_address: "elm327".to_string(),
            ..Default::default()
        };
        match bad.mode() {
            Err(TelemetryError::InvalidAddress(address)) => assert_eq!(address, "elm327"),
            other => panic!("expected InvalidAddress, got {other:?}"),
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
mock = false
device_address = "/dev/rfcomm1"
read_strategy = "until_prompt"
prompt_timeout_ms = 750

[timing]
settle_ms = 150

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = TelemetryConfig::load(Some(file.path())).unwrap();
        assert!(!config.mock);
        assert_eq!(config.device_address, "/dev/rfcomm1");
        assert_eq!(config.timing.settle_ms, 150);
        assert_eq!(config.timing.reset_delay_ms, 1000);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(
            config.read_strategy(),
            ReadStrategy::UntilPrompt {
                timeout: Duration::from_millis(750)
            }
        );
    }

    #[test]
    fn test_environment_overrides_defaults() {
        // Values agree with test_load_from_file, which may run concurrently
        std::env::set_var("OBD_DASH_MOCK", "false");
        std::env::set_var("OBD_DASH_TIMING__SETTLE_MS", "150");
        let loaded = TelemetryConfig::load(None);
        std::env::remove_var("OBD_DASH_MOCK");
        std::env::remove_var("OBD_DASH_TIMING__SETTLE_MS");

        let config = loaded.unwrap();
        assert!(!config.mock);
        assert_eq!(config.timing.settle_ms, 150);
        assert_eq!(config.timing.reset_delay_ms, 1000);
    }

    #[test]
    fn test_missing_file_is_error() {
        let missing = Path::new("/nonexistent/obd-dashboard.toml");
        assert!(matches!(
            TelemetryConfig::load(Some(missing)),
            Err(TelemetryError::Config(_))
        ));
    }
}
