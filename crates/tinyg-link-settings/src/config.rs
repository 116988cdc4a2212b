//! Link configuration for tinyg-link
//!
//! Provides configuration file handling and validation for the link engine.
//! Supports JSON and TOML file formats.
//!
//! Configuration is organized into logical sections:
//! - Connection settings (port, baud rate, flow control)
//! - Polling policy (reader cadence and the quiet-channel completion heuristic)
//! - Synchronization policy (config verify cadence and bounds)
//! - Session settings (transcript log, operator echo, startup/shutdown timing)

use crate::error::{SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Port value that asks for USB discovery instead of a fixed device path
pub const AUTO_PORT: &str = "auto";

/// Connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial device path, or "auto" to discover the controller by USB id
    pub port: String,
    /// Baud rate for the serial link
    pub baud_rate: u32,
    /// Enable RTS/CTS on both ends after the device has been told to use it
    pub hardware_flow_control: bool,
    /// Read timeout of the serial handle in milliseconds
    pub timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: AUTO_PORT.to_string(),
            baud_rate: 115200,
            hardware_flow_control: true,
            timeout_ms: 10,
        }
    }
}

impl ConnectionSettings {
    /// Whether the port should be discovered rather than opened by name
    pub fn is_auto_port(&self) -> bool {
        self.port.eq_ignore_ascii_case(AUTO_PORT)
    }
}

/// Reader polling and completion heuristic settings
///
/// The controller has no "motion finished" acknowledgement. The reader treats
/// more than `quiet_poll_threshold` consecutive empty polls as completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    /// Sleep between reader polls in milliseconds
    pub poll_interval_ms: u64,
    /// Empty polls that must be exceeded before completion is signalled
    pub quiet_poll_threshold: u32,
    /// Pause after each write, once the arbiter is released and before the
    /// completion wait starts, in milliseconds
    pub write_settle_ms: u64,
    /// Upper bound on waiting for completion; `None` waits indefinitely
    pub completion_timeout_ms: Option<u64>,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            quiet_poll_threshold: 3,
            write_settle_ms: 10,
            completion_timeout_ms: None,
        }
    }
}

/// Config synchronization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Spacing between response reads during verification, in milliseconds
    pub query_interval_ms: u64,
    /// Bound on one verify pass; `None` waits for every key indefinitely
    pub verify_timeout_ms: Option<u64>,
    /// Bound on verify/correct rounds; `None` loops until convergence
    pub max_correction_rounds: Option<u32>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            query_interval_ms: 500,
            verify_timeout_ms: Some(30_000),
            max_correction_rounds: Some(10),
        }
    }
}

/// Session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Transcript file, truncated at connection setup; `None` disables it
    pub log_path: Option<PathBuf>,
    /// Echo device output to the operator log at info level
    pub echo: bool,
    /// Wait after the link setup writes before draining the banner, in milliseconds
    pub startup_settle_ms: u64,
    /// Bound on joining the reader task at shutdown, in milliseconds
    pub shutdown_join_timeout_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            log_path: Some(PathBuf::from("tinyg.log")),
            echo: false,
            startup_settle_ms: 1000,
            shutdown_join_timeout_ms: 60_000,
        }
    }
}

/// Complete link configuration
///
/// Aggregates all settings sections and provides file I/O operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LinkConfig {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Reader polling settings
    pub polling: PollingSettings,
    /// Config synchronization settings
    pub sync: SyncSettings,
    /// Session settings
    pub session: SessionSettings,
}

impl LinkConfig {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default location of the config file in the platform config directory
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tinyg-link")
            .join("config.toml")
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SettingsError::LoadError(format!("{}: {}", path.display(), e)))?;

        let config: Self = match Format::from_path(path)? {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load config from file, falling back to defaults when the file is absent
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match Format::from_path(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)
                .map_err(|e| SettingsError::SaveError(e.to_string()))?,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        if self.connection.port.trim().is_empty() {
            return Err(invalid("connection.port", "must not be empty"));
        }

        if self.connection.baud_rate == 0 {
            return Err(invalid("connection.baud_rate", "must be > 0"));
        }

        if self.polling.poll_interval_ms == 0 {
            return Err(invalid("polling.poll_interval_ms", "must be > 0"));
        }

        if self.polling.quiet_poll_threshold == 0 {
            return Err(invalid("polling.quiet_poll_threshold", "must be > 0"));
        }

        if self.polling.completion_timeout_ms == Some(0) {
            return Err(invalid("polling.completion_timeout_ms", "must be > 0 when set"));
        }

        if self.sync.query_interval_ms == 0 {
            return Err(invalid("sync.query_interval_ms", "must be > 0"));
        }

        if self.sync.verify_timeout_ms == Some(0) {
            return Err(invalid("sync.verify_timeout_ms", "must be > 0 when set"));
        }

        if self.sync.max_correction_rounds == Some(0) {
            return Err(invalid("sync.max_correction_rounds", "must be > 0 when set"));
        }

        Ok(())
    }

    /// Reader poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.polling.poll_interval_ms)
    }

    /// Completion wait bound, if any
    pub fn completion_timeout(&self) -> Option<Duration> {
        self.polling.completion_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Copy)]
enum Format {
    Json,
    Toml,
}

impl Format {
    fn from_path(path: &Path) -> SettingsResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Format::Json),
            Some("toml") => Ok(Format::Toml),
            other => Err(SettingsError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

fn invalid(key: &str, reason: &str) -> SettingsError {
    SettingsError::InvalidSetting {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
