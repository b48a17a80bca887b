//! Telemetry hub
//!
//! Owns the published [`TelemetrySnapshot`] and the single producer task
//! (live loop or simulated source) that writes it. Collaborators subscribe
//! through a `watch` receiver: many readers, one writer, last value wins.

use crate::config::{Mode, TelemetryConfig};
use crate::error::TelemetryError;
use crate::simulator::SimulatedSource;
use crate::snapshot::{ConnectionState, Publisher, TelemetrySnapshot};
use crate::telemetry_loop::{StopReason, TelemetryLoop};
use obd_protocol::{Connector, DeviceAddress, ObdError};
use std::sync::{Arc, PoisonError};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Result of [`TelemetryHub::connect`]; always leaves a source ready to start
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Live adapter connected and initialized
    Live,
    /// Simulated mode was requested
    Simulated,
    /// Live connection failed; the simulated source stands in
    FellBack(ObdError),
    /// `stop` or `set_mode` interrupted the attempt; nothing was prepared
    Cancelled,
}

impl ConnectOutcome {
    /// Whether the data that will flow is fabricated
    pub fn is_simulated(&self) -> bool {
        matches!(self, ConnectOutcome::Simulated | ConnectOutcome::FellBack(_))
    }
}

/// Source prepared by `connect` and waiting for `start`
enum Prepared {
    Live(TelemetryLoop),
    Simulated,
}

struct Producer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Control {
    mode: Mode,
    prepared: Option<Prepared>,
    producer: Option<Producer>,
}

/// Publication point for live RPM, speed and connection status
pub struct TelemetryHub {
    tx: Arc<watch::Sender<TelemetrySnapshot>>,
    config: TelemetryConfig,
    connector: Arc<dyn Connector>,
    control: Mutex<Control>,
    /// Cancels the connect attempt in flight; replaced by every `connect`
    connecting: std::sync::Mutex<CancellationToken>,
}

impl TelemetryHub {
    /// Create a hub in the mode the configuration selects
    pub fn new(config: TelemetryConfig, connector: Arc<dyn Connector>) -> Result<Self, TelemetryError> {
        let mode = config.mode()?;
        Ok(Self::with_mode(config, connector, mode))
    }

    pub fn with_mode(config: TelemetryConfig, connector: Arc<dyn Connector>, mode: Mode) -> Self {
        let (tx, _rx) = watch::channel(TelemetrySnapshot::default());
        Self {
            tx: Arc::new(tx),
            config,
            connector,
            control: Mutex::new(Control {
                mode,
                prepared: None,
                producer: None,
            }),
            connecting: std::sync::Mutex::new(CancellationToken::new()),
        }
    }

    pub async fn mode(&self) -> Mode {
        self.control.lock().await.mode.clone()
    }

    /// Switch between live and simulated data; stops any running producer
    pub async fn set_mode(&self, mode: Mode) {
        self.cancel_connect();
        let mut control = self.control.lock().await;
        self.halt(&mut control).await;
        info!("Telemetry mode set to {:?}", mode);
        control.mode = mode;
        self.tx.send_replace(TelemetrySnapshot::default());
    }

    /// Prepare the configured source.
    ///
    /// In live mode this opens the transport and runs the adapter handshake.
    /// A failed attempt falls back to the simulated source rather than
    /// leaving the dashboard silent; the error is returned in the outcome.
    /// A concurrent `stop` or `set_mode` aborts the handshake, closes the
    /// transport and yields [`ConnectOutcome::Cancelled`].
    pub async fn connect(&self) -> ConnectOutcome {
        let cancel = CancellationToken::new();
        *self.connecting.lock().unwrap_or_else(PoisonError::into_inner) = cancel.clone();

        let mut control = self.control.lock().await;
        self.halt(&mut control).await;

        let address = match &control.mode {
            Mode::Simulated => {
                control.prepared = Some(Prepared::Simulated);
                self.set_state(ConnectionState::Simulated);
                info!("Telemetry in simulated mode");
                return ConnectOutcome::Simulated;
            }
            Mode::Live(address) => address.clone(),
        };

        self.set_state(ConnectionState::Connecting);
        match self.open_live(&address, &cancel).await {
            Ok(None) => {
                info!("Connection to {} cancelled", address);
                self.set_state(ConnectionState::Disconnected);
                ConnectOutcome::Cancelled
            }
            Ok(Some(telemetry_loop)) => {
                control.prepared = Some(Prepared::Live(telemetry_loop));
                self.set_state(ConnectionState::Connected);
                info!("Connected to OBD adapter at {}", address);
                ConnectOutcome::Live
            }
            Err(e) => {
                warn!("Live connection to {} failed ({}), falling back to simulation", address, e);
                control.prepared = Some(Prepared::Simulated);
                self.set_state(ConnectionState::Simulated);
                ConnectOutcome::FellBack(e)
            }
        }
    }

    /// Open and initialize the adapter; `Ok(None)` when cancelled
    async fn open_live(
        &self,
        address: &DeviceAddress,
        cancel: &CancellationToken,
    ) -> Result<Option<TelemetryLoop>, ObdError> {
        let transport = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            result = self.connector.connect(address) => result?,
        };

        let mut telemetry_loop = TelemetryLoop::new(transport, &self.config);
        let initialized = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = telemetry_loop.initialize() => Some(result),
        };

        match initialized {
            Some(Ok(())) => Ok(Some(telemetry_loop)),
            Some(Err(e)) => {
                telemetry_loop.close().await;
                Err(e)
            }
            None => {
                telemetry_loop.close().await;
                Ok(None)
            }
        }
    }

    fn cancel_connect(&self) {
        self.connecting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    /// Spawn the prepared producer
    pub async fn start(&self) -> Result<(), TelemetryError> {
        let mut control = self.control.lock().await;
        if control.producer.as_ref().is_some_and(|p| !p.handle.is_finished()) {
            return Err(TelemetryError::AlreadyRunning);
        }
        let prepared = control.prepared.take().ok_or(TelemetryError::NotConnected)?;

        let cancel = CancellationToken::new();
        let publisher = self.publisher();
        let token = cancel.clone();
        let handle = match prepared {
            Prepared::Live(telemetry_loop) => tokio::spawn(async move {
                if let StopReason::LinkLost(e) = telemetry_loop.run(&publisher, token).await {
                    publisher.set_state(ConnectionState::Failed(e.to_string()));
                }
            }),
            Prepared::Simulated => {
                let source = SimulatedSource::new(self.config.timing.simulated_interval());
                tokio::spawn(source.run(publisher, token))
            }
        };

        control.producer = Some(Producer { cancel, handle });
        Ok(())
    }

    /// Stop publishing, close any transport and reset the snapshot.
    ///
    /// Once this returns no further publish can occur.
    pub async fn stop(&self) {
        self.cancel_connect();
        let mut control = self.control.lock().await;
        self.halt(&mut control).await;
        self.tx.send_replace(TelemetrySnapshot::default());
        info!("Telemetry stopped");
    }

    /// Cancel and join the producer, and release an unstarted live link
    async fn halt(&self, control: &mut Control) {
        if let Some(producer) = control.producer.take() {
            producer.cancel.cancel();
            if let Err(e) = producer.handle.await {
                warn!("Telemetry producer ended abnormally: {}", e);
            }
        }
        if let Some(Prepared::Live(telemetry_loop)) = control.prepared.take() {
            telemetry_loop.close().await;
        }
    }

    pub async fn is_running(&self) -> bool {
        let control = self.control.lock().await;
        control
            .producer
            .as_ref()
            .is_some_and(|p| !p.handle.is_finished())
    }

    /// Receive every snapshot change
    pub fn subscribe(&self) -> watch::Receiver<TelemetrySnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.tx.borrow().clone()
    }

    pub fn rpm(&self) -> u32 {
        self.tx.borrow().rpm
    }

    pub fn speed_kmh(&self) -> u32 {
        self.tx.borrow().speed_kmh
    }

    pub fn state(&self) -> ConnectionState {
        self.tx.borrow().state.clone()
    }

    fn publisher(&self) -> Publisher {
        Publisher::new(Arc::clone(&self.tx))
    }

    fn set_state(&self, state: ConnectionState) {
        self.publisher().set_state(state);
    }
}

impl Drop for TelemetryHub {
    fn drop(&mut self) {
        // The producer owns its transport and closes it once cancelled
        if let Some(producer) = &self.control.get_mut().producer {
            producer.cancel.cancel();
        }
    }
}
