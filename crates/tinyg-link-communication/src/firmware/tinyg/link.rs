//! TinyG link
//!
//! Owns one controller session: the channel behind its arbiter, the shared
//! signals, the background reader and the sender built over them.

use crate::communication::{Channel, LineAssembler, LinkArbiter, SerialChannel, SessionLog};
use crate::firmware::tinyg::command_creator::{Axes, CommandCreator, HomeAxes, SavedPosition};
use crate::firmware::tinyg::config_sync::{
    ConfigMismatch, ConfigSet, ConfigSynchronizer, SyncPolicy, SyncReport,
};
use crate::firmware::tinyg::reader::{drain_channel, ReaderPolicy, ReaderTask};
use crate::firmware::tinyg::response_parser::ProtocolLine;
use crate::firmware::tinyg::sender::{hard_reset, write_payload, CommandSender, SenderPolicy};
use crate::firmware::tinyg::signals::LinkSignals;
use std::sync::Arc;
use std::time::Duration;
use tinyg_link_core::{ConnectionError, ProtocolError, Result};
use tinyg_link_settings::LinkConfig;
use tokio::task::JoinHandle;

/// An open session with a TinyG controller
pub struct TinyGLink {
    config: LinkConfig,
    arbiter: Arc<LinkArbiter>,
    signals: Arc<LinkSignals>,
    log: Arc<SessionLog>,
    sender: CommandSender,
    synchronizer: ConfigSynchronizer,
    commands: CommandCreator,
    reader: Option<JoinHandle<Result<()>>>,
}

impl TinyGLink {
    /// Open the configured serial port and set up the session
    pub async fn connect(config: LinkConfig) -> Result<Self> {
        config.validate()?;
        let channel = SerialChannel::open(&config.connection)?;
        Self::with_channel(Box::new(channel), config).await
    }

    /// Set up a session over an already open channel
    pub async fn with_channel(channel: Box<dyn Channel>, config: LinkConfig) -> Result<Self> {
        config.validate()?;

        let log = Arc::new(match &config.session.log_path {
            Some(path) => SessionLog::new(path.clone(), config.session.echo),
            None => SessionLog::disabled(config.session.echo),
        });
        let arbiter = Arc::new(LinkArbiter::new(channel));
        let signals = Arc::new(LinkSignals::new());

        if let Err(e) = Self::prepare(&arbiter, &signals, &log, &config).await {
            tracing::error!("Link setup failed: {}", e);
            signals.set_alive(false);
            if let Err(close_err) = arbiter.close().await {
                tracing::warn!("Failed to close channel after setup error: {}", close_err);
            }
            return Err(e);
        }

        let reader = ReaderTask::new(
            arbiter.clone(),
            signals.clone(),
            log.clone(),
            ReaderPolicy::from(&config),
        )
        .spawn();

        let sender = CommandSender::new(
            arbiter.clone(),
            signals.clone(),
            log.clone(),
            SenderPolicy::from(&config),
        );
        let synchronizer = ConfigSynchronizer::new(
            arbiter.clone(),
            signals.clone(),
            log.clone(),
            sender.clone(),
            SyncPolicy::from(&config),
        );

        tracing::info!("TinyG link ready");
        Ok(Self {
            config,
            arbiter,
            signals,
            log,
            sender,
            synchronizer,
            commands: CommandCreator::new(),
            reader: Some(reader),
        })
    }

    async fn prepare(
        arbiter: &LinkArbiter,
        signals: &LinkSignals,
        log: &SessionLog,
        config: &LinkConfig,
    ) -> Result<()> {
        let commands = CommandCreator::new();
        let hardware = config.connection.hardware_flow_control;
        let mut link = arbiter.acquire().await?;

        link.clear_input()
            .and_then(|_| link.clear_output())
            .map_err(ConnectionError::from)?;
        signals.set_alive(true);
        log.truncate();

        write_payload(&mut *link, &commands.flow_control(hardware), log)?;
        if hardware {
            link.set_hardware_flow_control(true)
                .map_err(ConnectionError::from)?;
        }
        write_payload(&mut *link, &commands.status_reports(0), log)?;

        tokio::time::sleep(Duration::from_millis(config.session.startup_settle_ms)).await;

        let banner = drain_channel(&mut *link, &mut LineAssembler::new(), signals, log)?;
        tracing::debug!("Controller sent {} line(s) during setup", banner.len());
        Ok(())
    }

    /// Send a payload and wait for the controller to go quiet
    pub async fn send(&self, payload: &str) -> Result<()> {
        self.sender.send(payload).await
    }

    /// Send payloads in order, stopping at the first failure
    pub async fn send_all<I, S>(&self, payloads: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.sender.send_all(payloads).await
    }

    /// Write a payload and read back whatever the controller answers
    ///
    /// Waits for any command in flight to complete first. The arbiter is held
    /// for one poll interval so the reader task cannot take the reply.
    pub async fn query(&self, payload: &str) -> Result<Vec<ProtocolLine>> {
        self.signals.ensure_clear()?;
        let _turn = self.sender.take_turn().await;
        let mut link = self.arbiter.acquire().await?;
        self.signals.ensure_clear()?;
        write_payload(&mut *link, payload, &self.log)?;
        tokio::time::sleep(self.config.poll_interval()).await;
        drain_channel(&mut *link, &mut LineAssembler::new(), &self.signals, &self.log)
    }

    /// Ask the controller for its position (M114)
    pub async fn position_report(&self) -> Result<Vec<ProtocolLine>> {
        self.query(&self.commands.position_report()).await
    }

    /// Compare the controller against a config set
    pub async fn verify_config(&self, set: &ConfigSet) -> Result<Vec<ConfigMismatch>> {
        self.synchronizer.verify(set).await
    }

    /// Verify and correct until the controller matches the set
    pub async fn synchronize_config(&self, set: &ConfigSet) -> Result<SyncReport> {
        self.synchronizer.synchronize(set).await
    }

    /// Write entries of a config set; `None` writes all of them
    pub async fn apply_config(&self, set: &ConfigSet, selection: Option<&[usize]>) -> Result<()> {
        self.synchronizer.apply(set, selection).await
    }

    /// Flush the channel and send the reset byte
    pub async fn hard_reset(&self) -> Result<()> {
        hard_reset(&self.arbiter, &self.log).await
    }

    /// Home Z, then X, then Y
    pub async fn home(&self) -> Result<()> {
        self.send_all(self.commands.home_sequence()).await
    }

    /// Home the selected axes together
    pub async fn home_axes(&self, axes: HomeAxes) -> Result<()> {
        self.send_optional(self.commands.home_axes(axes)).await
    }

    /// Declare the current position of axes without homing switches
    pub async fn set_position(&self, axes: Axes) -> Result<()> {
        self.send_optional(self.commands.set_position(axes)).await
    }

    /// Record the current position in a slot
    pub async fn save_position(&self, slot: SavedPosition) -> Result<()> {
        self.send(&self.commands.save_position(slot)).await
    }

    /// Move to a recorded position
    pub async fn go_to_saved_position(&self, slot: SavedPosition) -> Result<()> {
        self.send(&self.commands.go_to_saved_position(slot)).await
    }

    /// Jog at `feed_rate`
    pub async fn jog(&self, feed_rate: f64, axes: Axes) -> Result<()> {
        self.send_optional(self.commands.jog(feed_rate, axes)).await
    }

    /// Stop a jog and flush the planner queue
    pub async fn cancel_jog(&self) -> Result<()> {
        self.send(&self.commands.cancel_jog()).await
    }

    /// Linear feed move
    pub async fn move_linear(&self, feed_rate: f64, axes: Axes) -> Result<()> {
        self.send_optional(self.commands.move_linear(feed_rate, axes)).await
    }

    /// Rapid move, clamped to the machine limits
    pub async fn move_rapid(&self, axes: Axes) -> Result<()> {
        self.send_optional(self.commands.move_rapid(axes)).await
    }

    /// Start the spindle
    pub async fn spindle_on(&self) -> Result<()> {
        self.send(&self.commands.spindle_on()).await
    }

    /// Stop the spindle
    pub async fn spindle_off(&self) -> Result<()> {
        self.send(&self.commands.spindle_off()).await
    }

    async fn send_optional(&self, payload: Option<String>) -> Result<()> {
        match payload {
            Some(payload) => self.send(&payload).await,
            None => {
                tracing::debug!("No axis given, nothing sent");
                Ok(())
            }
        }
    }

    /// Check if the controller reported a hard stop
    pub fn is_faulted(&self) -> bool {
        self.signals.is_faulted()
    }

    /// The line or error that raised the fault
    pub fn fault_payload(&self) -> Option<String> {
        self.signals.fault_reason()
    }

    /// Check if no command is in flight
    pub fn is_motion_complete(&self) -> bool {
        self.signals.is_complete()
    }

    /// Shared signals of this link
    pub fn signals(&self) -> Arc<LinkSignals> {
        self.signals.clone()
    }

    /// Sender over this link, usable from other tasks
    ///
    /// Clones take turns: each send waits for the previous command to
    /// complete before writing.
    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    /// Command builders used by the convenience methods
    pub fn commands(&self) -> &CommandCreator {
        &self.commands
    }

    /// Configuration the link was opened with
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// End the session
    ///
    /// Stops the reader and waits for it. A reader that failed or did not
    /// stop in time leaves the controller in an unknown state, so it gets a
    /// hard reset. The channel is closed in every case and the reader's error
    /// is returned.
    pub async fn close(mut self) -> Result<()> {
        self.signals.set_alive(false);
        let limit = Duration::from_millis(self.config.session.shutdown_join_timeout_ms);

        let outcome = match self.reader.take() {
            None => Ok(()),
            Some(handle) => match tokio::time::timeout(limit, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(ProtocolError::ReaderTerminated {
                    reason: e.to_string(),
                }
                .into()),
                Err(_) => Err(ProtocolError::ReaderTerminated {
                    reason: format!("reader did not stop within {} ms", limit.as_millis()),
                }
                .into()),
            },
        };

        if let Err(e) = &outcome {
            tracing::warn!("Reader ended with error, resetting controller: {}", e);
            if let Err(reset_err) = self.hard_reset().await {
                tracing::error!("Hard reset failed: {}", reset_err);
            }
        }

        let closed = self.arbiter.close().await;
        tracing::info!("TinyG link closed");
        outcome.and(closed)
    }
}

impl Drop for TinyGLink {
    fn drop(&mut self) {
        // The reader exits on its next poll.
        self.signals.set_alive(false);
    }
}
