//! Live polling loop
//!
//! `Idle -> Initializing -> Streaming -> Stopped`. The loop owns the command
//! channel for one run and closes the transport exactly once when it stops.

use crate::config::TelemetryConfig;
use crate::snapshot::Publisher;
use obd_protocol::{AtCommand, CommandChannel, ObdError, ObdProtocol, PidRequest, Transport};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Requests issued each cycle, in order
const CYCLE: [PidRequest; 2] = [PidRequest::RPM, PidRequest::SPEED];

/// Loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Initializing,
    Streaming,
    Stopped,
}

/// Why a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Stop was requested
    Cancelled,
    /// The transport failed or disconnected
    LinkLost(ObdError),
}

/// Adapter handshake step: command and the pause that follows it
#[derive(Debug, Clone, Copy)]
struct InitStep {
    command: AtCommand,
    delay: Duration,
}

/// Polls RPM and speed from a live adapter
pub struct TelemetryLoop {
    channel: CommandChannel,
    state: LoopState,
    init_steps: [InitStep; 3],
    cycle_pause: Duration,
}

impl TelemetryLoop {
    /// Wrap a freshly connected transport
    pub fn new(transport: Box<dyn Transport>, config: &TelemetryConfig) -> Self {
        let timing = &config.timing;
        let channel = CommandChannel::with_timing(transport, timing.settle(), config.read_strategy());

        Self {
            channel,
            state: LoopState::Idle,
            init_steps: [
                InitStep {
                    command: AtCommand::Reset,
                    delay: Duration::from_millis(timing.reset_delay_ms),
                },
                InitStep {
                    command: AtCommand::EchoOff,
                    delay: Duration::from_millis(timing.echo_off_delay_ms),
                },
                InitStep {
                    command: AtCommand::SelectProtocol(ObdProtocol::Auto),
                    delay: Duration::from_millis(timing.protocol_delay_ms),
                },
            ],
            cycle_pause: timing.cycle_pause(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run the adapter handshake.
    ///
    /// Replies are not inspected; the fixed delays are the completion signal.
    /// On success the loop is ready to stream.
    pub async fn initialize(&mut self) -> Result<(), ObdError> {
        self.state = LoopState::Initializing;
        info!("Initializing OBD adapter");

        for step in self.init_steps {
            let command = step.command.as_str();
            match self.channel.send(command).await {
                Ok(reply) => debug!("{} -> {:?}", command, reply),
                Err(e) => {
                    warn!("Adapter handshake failed at {}: {}", command, e);
                    self.state = LoopState::Stopped;
                    return Err(e);
                }
            }
            tokio::time::sleep(step.delay).await;
        }

        self.state = LoopState::Streaming;
        info!("OBD adapter initialized, streaming");
        Ok(())
    }

    /// One RPM + speed cycle; decode failures are skipped, link errors end the run
    async fn cycle(&self, publisher: &Publisher) -> Result<(), ObdError> {
        for request in CYCLE {
            let raw = self.channel.send(&request.command()).await?;
            let reading = request.decode(&raw);
            if !publisher.publish(reading) {
                warn!("Could not decode {} response: {:?}", request.command(), raw);
            }
        }
        Ok(())
    }

    /// Stream until cancelled or the link fails, then close the transport.
    ///
    /// An `Idle` loop is initialized first.
    pub async fn run(mut self, publisher: &Publisher, cancel: CancellationToken) -> StopReason {
        let reason = self.stream(publisher, &cancel).await;
        self.state = LoopState::Stopped;

        match &reason {
            StopReason::Cancelled => info!("Telemetry loop stopped"),
            StopReason::LinkLost(e) => error!("Telemetry loop lost adapter link: {}", e),
        }
        self.channel.close().await;
        reason
    }

    async fn stream(&mut self, publisher: &Publisher, cancel: &CancellationToken) -> StopReason {
        if self.state == LoopState::Idle {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return StopReason::Cancelled,
                result = self.initialize() => {
                    if let Err(e) = result {
                        return StopReason::LinkLost(e);
                    }
                }
            }
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return StopReason::Cancelled,
                result = self.cycle(publisher) => {
                    if let Err(e) = result {
                        return StopReason::LinkLost(e);
                    }
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return StopReason::Cancelled,
                _ = tokio::time::sleep(self.cycle_pause) => {}
            }
        }
    }

    /// Close the transport without streaming
    pub async fn close(mut self) {
        self.state = LoopState::Stopped;
        self.channel.close().await;
    }
}
