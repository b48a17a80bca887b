//! OBD Dashboard
//!
//! Terminal front end for the telemetry hub: resolves configuration,
//! picks the adapter connector and renders RPM and speed as they change.

use anyhow::{Context, Result};
use clap::Parser;
use obd_protocol::{Connector, EmulatorConnector, EmulatorProbe, SerialConnector};
use obd_telemetry::{
    ConnectOutcome, ConnectionState, LogFormat, LoggingConfig, TelemetryConfig, TelemetryHub,
    TelemetrySnapshot,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Command-line options; each one overrides the file and environment layers
#[derive(Debug, Parser)]
#[command(name = "obd-dashboard", version, about = "Live engine RPM and vehicle speed from an ELM327 adapter")]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Show simulated data instead of polling an adapter
    #[arg(long, conflicts_with = "device")]
    pub mock: bool,

    /// Adapter Bluetooth MAC or serial device path (implies live mode)
    #[arg(short, long)]
    pub device: Option<String>,

    /// Poll a built-in ELM327 emulator instead of real hardware
    #[arg(long)]
    pub emulate: bool,

    /// Log level override
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Layer command-line overrides onto a loaded configuration
    pub fn apply(&self, config: &mut TelemetryConfig) {
        if let Some(device) = &self.device {
            config.device_address = device.clone();
            config.mock = false;
        }
        if self.mock {
            config.mock = true;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }

    /// Connector for live mode
    pub fn connector(&self, config: &TelemetryConfig) -> Arc<dyn Connector> {
        if self.emulate {
            info!("Using emulated ELM327 adapter");
            let probe = EmulatorProbe::new();
            probe.set_rpm(780);
            probe.set_speed(0);
            Arc::new(EmulatorConnector::new(probe))
        } else {
            Arc::new(SerialConnector::new(config.serial.clone()))
        }
    }
}

/// Install the global tracing subscriber, writing to stderr
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let level: Level = config
        .level
        .parse()
        .with_context(|| format!("invalid log level {:?}", config.level))?;

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    match config.format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    }
    .context("failed to set tracing subscriber")
}

/// One readout line
pub fn render(snapshot: &TelemetrySnapshot) -> String {
    let source = match &snapshot.state {
        ConnectionState::Simulated => "SIMULATED".to_string(),
        other => other.to_string(),
    };
    format!(
        "RPM {:>5} | {:>3} km/h | {}",
        snapshot.rpm, snapshot.speed_kmh, source
    )
}

/// Connect, stream until Ctrl-C, then stop
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = TelemetryConfig::load(cli.config.as_deref())
        .context("failed to load configuration")?;
    cli.apply(&mut config);
    init_logging(&config.logging)?;

    info!("=== OBD Dashboard v{} ===", env!("CARGO_PKG_VERSION"));

    let connector = cli.connector(&config);
    let hub = TelemetryHub::new(config, connector)?;

    match hub.connect().await {
        ConnectOutcome::Live => info!("Streaming live adapter data"),
        ConnectOutcome::Simulated => info!("Streaming simulated data"),
        ConnectOutcome::FellBack(e) => warn!("Adapter unavailable ({}); showing simulated data", e),
        ConnectOutcome::Cancelled => return Ok(()),
    }
    hub.start().await?;

    let mut rx = hub.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                println!("{}", render(&snapshot));
                if let ConnectionState::Failed(reason) = &snapshot.state {
                    warn!("Telemetry halted: {}", reason);
                    break;
                }
            }
        }
    }

    hub.stop().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_flag_enables_live_mode() {
        let cli = Cli::try_parse_from(["obd-dashboard", "--device", "00:1D:A5:68:98:8B"]).unwrap();
        let mut config = TelemetryConfig::default();
        cli.apply(&mut config);

        assert!(!config.mock);
        assert_eq!(config.device_address, "00:1D:A5:68:98:8B");
    }

    #[test]
    fn test_mock_flag_overrides_file() {
        let cli = Cli::try_parse_from(["obd-dashboard", "--mock", "--log-level", "debug"]).unwrap();
        let mut config = TelemetryConfig {
            mock: false,
            ..Default::default()
        };
        cli.apply(&mut config);

        assert!(config.mock);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_mock_conflicts_with_device() {
        assert!(Cli::try_parse_from(["obd-dashboard", "--mock", "--device", "/dev/rfcomm0"]).is_err());
    }

    #[test]
    fn test_render_marks_simulated_data() {
        let snapshot = TelemetrySnapshot {
            rpm: 1726,
            speed_kmh: 50,
            state: ConnectionState::Simulated,
            ..Default::default()
        };
        assert_eq!(render(&snapshot), "RPM  1726 |  50 km/h | SIMULATED");

        let live = TelemetrySnapshot {
            state: ConnectionState::Connected,
            ..snapshot
        };
        assert_eq!(render(&live), "RPM  1726 |  50 km/h | connected");
    }

    #[tokio::test(start_paused = true)]
    async fn test_emulated_connector_goes_live() {
        let cli = Cli::try_parse_from(["obd-dashboard", "--emulate", "--device", "/dev/rfcomm0"]).unwrap();
        let mut config = TelemetryConfig::default();
        cli.apply(&mut config);

        let hub = TelemetryHub::new(config.clone(), cli.connector(&config)).unwrap();
        assert_eq!(hub.connect().await, ConnectOutcome::Live);
        hub.stop().await;
    }
}
