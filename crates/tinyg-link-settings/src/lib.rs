//! tinyg-link Settings Crate
//!
//! Handles the link configuration file: connection parameters, reader polling
//! policy, config synchronization bounds and session logging.

pub mod config;
pub mod error;

pub use config::{
    ConnectionSettings, LinkConfig, PollingSettings, SessionSettings, SyncSettings, AUTO_PORT,
};
pub use error::{SettingsError, SettingsResult};
