//! Command Framing for ELM327 Adapters
//!
//! Turns one ASCII command into one response string. Exactly one exchange
//! is ever outstanding on a channel: the transport sits behind an async
//! mutex that is held from the write until the response has been drained.

use crate::error::ObdError;
use crate::transport::Transport;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Default wait between writing a command and draining the reply
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(100);

/// Interval between polls while waiting for the `>` prompt
const PROMPT_POLL: Duration = Duration::from_millis(10);

/// How a response is collected after the command is written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadStrategy {
    /// Sleep the settle interval, then drain once
    #[default]
    Settle,
    /// Keep draining until a `>` prompt arrives or the timeout expires
    UntilPrompt { timeout: Duration },
}

/// Serialized request/response exchange over a [`Transport`]
pub struct CommandChannel {
    transport: Mutex<Box<dyn Transport>>,
    settle: Duration,
    strategy: ReadStrategy,
}

impl CommandChannel {
    /// Create a channel with the default settle interval
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self::with_timing(transport, DEFAULT_SETTLE, ReadStrategy::default())
    }

    pub fn with_timing(transport: Box<dyn Transport>, settle: Duration, strategy: ReadStrategy) -> Self {
        Self {
            transport: Mutex::new(transport),
            settle,
            strategy,
        }
    }

    /// Send `command` terminated by a carriage return and return the trimmed reply.
    ///
    /// An empty string means the adapter did not answer in time.
    pub async fn send(&self, command: &str) -> Result<String, ObdError> {
        let mut transport = self.transport.lock().await;
        if !transport.is_connected() {
            return Err(ObdError::Disconnected);
        }

        debug!("TX: {}", command);
        let mut frame = Vec::with_capacity(command.len() + 1);
        frame.extend_from_slice(command.as_bytes());
        frame.push(b'\r');
        transport.write(&frame).await?;

        tokio::time::sleep(self.settle).await;
        let mut raw = transport.read_available().await?;

        if let ReadStrategy::UntilPrompt { timeout } = self.strategy {
            let deadline = Instant::now() + timeout;
            while !raw.contains(&b'>') && Instant::now() < deadline {
                tokio::time::sleep(PROMPT_POLL).await;
                raw.extend(transport.read_available().await?);
            }
        }

        let response = clean_response(&raw);
        debug!("RX: {:?}", response);
        Ok(response)
    }

    /// Whether the underlying transport still reports a live link
    pub async fn is_connected(&self) -> bool {
        self.transport.lock().await.is_connected()
    }

    /// Close the transport, consuming the channel
    pub async fn close(self) {
        let mut transport = self.transport.into_inner();
        transport.close().await;
    }
}

/// Decode adapter output as ASCII and strip prompts and surrounding whitespace
fn clean_response(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_matches(|c: char| c == '>' || c.is_whitespace())
        .to_string()
}
