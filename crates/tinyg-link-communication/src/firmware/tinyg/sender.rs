//! Command sender
//!
//! The single entry point for commands that move the machine. A send writes
//! one payload under the link arbiter, then blocks until the reader task
//! reports the channel quiet (or a fault).

use crate::communication::{Channel, LinkArbiter, SessionLog};
use crate::firmware::tinyg::signals::LinkSignals;
use std::sync::Arc;
use std::time::Duration;
use tinyg_link_core::{ConnectionError, Result};
use tinyg_link_settings::LinkConfig;
use tokio::sync::{Mutex, MutexGuard};

/// Control byte (ASCII CAN, ctrl-X) that resets the controller after a hard stop
pub const HARD_RESET_BYTE: u8 = 0x18;

/// Timing applied to each send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderPolicy {
    /// Pause after a write before waiting on completion
    pub write_settle: Duration,
    /// Bound on the completion wait; `None` waits indefinitely
    pub completion_timeout: Option<Duration>,
}

impl Default for SenderPolicy {
    fn default() -> Self {
        Self {
            write_settle: Duration::from_millis(10),
            completion_timeout: None,
        }
    }
}

impl From<&LinkConfig> for SenderPolicy {
    fn from(config: &LinkConfig) -> Self {
        Self {
            write_settle: Duration::from_millis(config.polling.write_settle_ms),
            completion_timeout: config.completion_timeout(),
        }
    }
}

/// Write one payload to the channel
///
/// Appends the newline terminator if missing, flushes, and records the
/// payload in the session transcript. Returns the number of bytes written.
pub(crate) fn write_payload(
    channel: &mut dyn Channel,
    payload: &str,
    log: &SessionLog,
) -> Result<usize> {
    let mut line = payload.to_string();
    if !line.ends_with('\n') {
        line.push('\n');
    }

    channel
        .write_all(line.as_bytes())
        .and_then(|_| channel.flush())
        .map_err(|e| {
            tracing::error!("Failed to write to {}: {}", channel.name(), e);
            ConnectionError::from(e)
        })?;

    log.record_input(&line);
    Ok(line.len())
}

/// Sends commands and waits for the controller to finish them
///
/// Clones share one turn: a send holds it from the write until its
/// completion, so no write starts while another command is still pending.
#[derive(Clone)]
pub struct CommandSender {
    arbiter: Arc<LinkArbiter>,
    signals: Arc<LinkSignals>,
    log: Arc<SessionLog>,
    policy: SenderPolicy,
    turn: Arc<Mutex<()>>,
}

impl CommandSender {
    /// Create a sender over a shared arbiter and signal set
    pub fn new(
        arbiter: Arc<LinkArbiter>,
        signals: Arc<LinkSignals>,
        log: Arc<SessionLog>,
        policy: SenderPolicy,
    ) -> Self {
        Self {
            arbiter,
            signals,
            log,
            policy,
            turn: Arc::new(Mutex::new(())),
        }
    }

    /// Wait until no command is in flight and keep others from starting
    pub(crate) async fn take_turn(&self) -> MutexGuard<'_, ()> {
        self.turn.lock().await
    }

    /// Write `payload` and wait for motion completion
    ///
    /// Fails with a protocol fault without touching the channel if the link is
    /// faulted when the send starts or by the time it gets the channel, and
    /// after the wait if a fault arrived meanwhile. Transport errors from the
    /// write are returned as they are.
    pub async fn send(&self, payload: &str) -> Result<()> {
        self.signals.ensure_clear()?;
        let _turn = self.take_turn().await;

        let signals = &self.signals;
        let log = &self.log;
        self.arbiter
            .with_link(|channel| {
                signals.ensure_clear()?;
                signals.mark_pending();
                write_payload(channel, payload, log).inspect_err(|_| signals.mark_complete())
            })
            .await?;

        if !self.policy.write_settle.is_zero() {
            tokio::time::sleep(self.policy.write_settle).await;
        }

        self.signals
            .wait_complete(self.policy.completion_timeout)
            .await?;

        self.signals.ensure_clear()
    }

    /// Send each payload in order, stopping at the first failure
    pub async fn send_all<I, S>(&self, payloads: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for payload in payloads {
            self.send(payload.as_ref()).await?;
        }
        Ok(())
    }

    /// Timing in use
    pub fn policy(&self) -> SenderPolicy {
        self.policy
    }
}

/// Recover the controller after a hard stop
///
/// Flushes both directions of the channel and writes the reset byte. This is
/// the one operation allowed while the fault signal is raised; it does not
/// clear the fault, a new connection does.
pub async fn hard_reset(arbiter: &LinkArbiter, log: &SessionLog) -> Result<()> {
    arbiter
        .with_link(|channel| {
            tracing::warn!("Sending hard reset to {}", channel.name());
            channel
                .clear_input()
                .and_then(|_| channel.clear_output())
                .and_then(|_| channel.write_all(&[HARD_RESET_BYTE]))
                .and_then(|_| channel.flush())
                .map_err(ConnectionError::from)?;
            log.record_input("<CAN 0x18>");
            Ok(())
        })
        .await
}
