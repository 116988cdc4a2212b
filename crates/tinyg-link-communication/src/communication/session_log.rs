//! Session transcript
//!
//! Every write to and read from the controller is appended to a plain-text
//! file as a timestamped block. The file is a human aid, not a data format:
//! failures to write it are logged and otherwise ignored.

use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const DELIMITER: &str = "________________________________________";

/// Direction of a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to device
    Input,
    /// Device to host
    Output,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => write!(f, "INPUT"),
            Self::Output => write!(f, "OUTPUT"),
        }
    }
}

/// Append-only transcript of device traffic
#[derive(Debug)]
pub struct SessionLog {
    path: Option<PathBuf>,
    echo: bool,
    write_lock: Mutex<()>,
}

impl SessionLog {
    /// Transcript written to `path`
    pub fn new(path: impl Into<PathBuf>, echo: bool) -> Self {
        Self {
            path: Some(path.into()),
            echo,
            write_lock: Mutex::new(()),
        }
    }

    /// Transcript that records nothing (echo still applies)
    pub fn disabled(echo: bool) -> Self {
        Self {
            path: None,
            echo,
            write_lock: Mutex::new(()),
        }
    }

    /// Transcript file, if enabled
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Delete the transcript left by a previous session
    pub fn truncate(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let _guard = self.write_lock.lock();
        match std::fs::remove_file(path) {
            Ok(()) => tracing::debug!("Removed previous session log {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove session log {}: {}", path.display(), e),
        }
    }

    /// Record a payload written to the device
    pub fn record_input(&self, text: &str) {
        tracing::debug!(target: "tinyg_link::wire", "-> {}", text.trim_end());
        self.append(Direction::Input, text);
    }

    /// Record text read from the device
    pub fn record_output(&self, text: &str) {
        if self.echo {
            tracing::info!(target: "tinyg_link::echo", "{}", text.trim_end());
        } else {
            tracing::debug!(target: "tinyg_link::wire", "<- {}", text.trim_end());
        }
        self.append(Direction::Output, text);
    }

    fn append(&self, direction: Direction, text: &str) {
        let Some(path) = &self.path else {
            return;
        };

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let mut block = format!("\n{}\n{}\n{}:\n{}", DELIMITER, timestamp, direction, text);
        if !block.ends_with('\n') {
            block.push('\n');
        }

        let _guard = self.write_lock.lock();
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(block.as_bytes()));
        if let Err(e) = result {
            tracing::warn!("Failed to append to session log {}: {}", path.display(), e);
        }
    }
}
