//! Reader task
//!
//! A background task that drains the channel whenever the arbiter is free,
//! classifies every line, and turns traffic silence into the completion
//! signal.
//!
//! Completion is a heuristic: once more than `quiet_poll_threshold`
//! consecutive polls have found nothing to read while a command is pending,
//! the command is assumed finished. The controller never acknowledges the end
//! of a move, so this only approximates it.

use crate::communication::{Channel, LineAssembler, LinkArbiter, SessionLog};
use crate::firmware::tinyg::response_parser::{LineKind, ProtocolLine, TinyGResponseParser};
use crate::firmware::tinyg::signals::LinkSignals;
use std::sync::Arc;
use std::time::Duration;
use tinyg_link_core::{ConnectionError, Error, ProtocolError, Result};
use tinyg_link_settings::LinkConfig;
use tokio::task::JoinHandle;

/// Reader cadence and completion heuristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderPolicy {
    /// Sleep between polls
    pub poll_interval: Duration,
    /// Empty polls that must be exceeded before completion is signalled
    pub quiet_poll_threshold: u32,
}

impl Default for ReaderPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            quiet_poll_threshold: 3,
        }
    }
}

impl From<&LinkConfig> for ReaderPolicy {
    fn from(config: &LinkConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            quiet_poll_threshold: config.polling.quiet_poll_threshold,
        }
    }
}

/// Read everything buffered on `channel` and classify it
///
/// Undecodable fragments are logged and skipped. All decoded text is written
/// to the transcript as one output block. A hard-stop report raises the fault
/// signal and ends the drain with `ProtocolError::HardStop`; lines decoded
/// before it are lost along with the session.
pub(crate) fn drain_channel(
    channel: &mut dyn Channel,
    assembler: &mut LineAssembler,
    signals: &LinkSignals,
    log: &SessionLog,
) -> Result<Vec<ProtocolLine>> {
    if channel.bytes_pending().map_err(ConnectionError::from)? == 0 {
        return Ok(Vec::new());
    }
    let bytes = channel.read_available().map_err(ConnectionError::from)?;

    let parser = TinyGResponseParser::new();
    let mut text = String::new();
    let mut lines = Vec::new();
    let mut fault = None;

    for decoded in assembler.push(&bytes) {
        let raw = match decoded {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Dropping undecodable fragment from {}: {}", channel.name(), e);
                continue;
            }
        };
        text.push_str(&raw);
        text.push('\n');

        match parser.parse(&raw) {
            Ok(line) if line.is_fault() => {
                fault.get_or_insert(line);
            }
            Ok(line) => lines.push(line),
            Err(e) => {
                tracing::warn!("{}", e);
                lines.push(ProtocolLine {
                    raw,
                    kind: LineKind::Text,
                });
            }
        }
    }

    if !text.is_empty() {
        log.record_output(&text);
    }

    if let Some(line) = fault {
        tracing::error!("Hard stop reported by controller: {}", line.raw);
        signals.raise_fault(line.raw.clone());
        return Err(ProtocolError::HardStop { payload: line.raw }.into());
    }

    Ok(lines)
}

/// Background reader for one link
pub struct ReaderTask {
    arbiter: Arc<LinkArbiter>,
    signals: Arc<LinkSignals>,
    log: Arc<SessionLog>,
    policy: ReaderPolicy,
    assembler: LineAssembler,
    quiet_polls: u32,
}

impl ReaderTask {
    /// Create a reader over a shared arbiter and signal set
    pub fn new(
        arbiter: Arc<LinkArbiter>,
        signals: Arc<LinkSignals>,
        log: Arc<SessionLog>,
        policy: ReaderPolicy,
    ) -> Self {
        Self {
            arbiter,
            signals,
            log,
            policy,
            assembler: LineAssembler::new(),
            quiet_polls: 0,
        }
    }

    /// Run on the tokio runtime; the handle resolves to the task's outcome
    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    /// Poll until the link closes or faults
    ///
    /// Returns `Ok(())` on a normal shutdown. Every failure raises the fault
    /// signal (which also releases completion waiters) before it is returned,
    /// so no sender is left waiting on a dead reader.
    pub async fn run(mut self) -> Result<()> {
        tracing::debug!("Reader task started");
        let result = self.poll_loop().await;

        match &result {
            Ok(()) => tracing::debug!("Reader task stopped"),
            Err(e) => {
                if !self.signals.is_faulted() {
                    self.signals.raise_fault(e.to_string());
                }
                tracing::error!("Reader task terminated: {}", e);
            }
        }

        if let Some(Ok(tail)) = self.assembler.take_partial() {
            tracing::debug!("Discarding unterminated output: {}", tail);
        }

        result
    }

    async fn poll_loop(&mut self) -> Result<()> {
        while self.signals.is_alive() {
            if self.signals.is_faulted() {
                return Err(self.signals.fault_error());
            }

            self.poll_once().map_err(escalate)?;
            tokio::time::sleep(self.policy.poll_interval).await;
        }
        Ok(())
    }

    fn poll_once(&mut self) -> Result<()> {
        let mut link = match self.arbiter.try_acquire() {
            Ok(Some(link)) => link,
            Ok(None) => {
                // Someone is writing or querying: the link is not quiet.
                self.quiet_polls = 0;
                return Ok(());
            }
            Err(_) if !self.signals.is_alive() => return Ok(()),
            Err(e) => return Err(e),
        };

        let pending = link.bytes_pending().map_err(ConnectionError::from)?;
        if pending > 0 {
            self.quiet_polls = 0;
            drain_channel(&mut *link, &mut self.assembler, &self.signals, &self.log)?;
            return Ok(());
        }
        drop(link);

        if !self.signals.is_complete() {
            self.quiet_polls += 1;
            if self.quiet_polls > self.policy.quiet_poll_threshold {
                tracing::trace!("Channel quiet for {} polls, motion complete", self.quiet_polls);
                self.quiet_polls = 0;
                self.signals.mark_complete();
            }
        }
        Ok(())
    }
}

/// Any failure inside the reader is treated as loss of the session
fn escalate(err: Error) -> Error {
    match err {
        Error::Protocol(_) => err,
        other => ProtocolError::ReaderTerminated {
            reason: other.to_string(),
        }
        .into(),
    }
}
