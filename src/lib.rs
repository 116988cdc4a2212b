//! # TinyG Link
//!
//! Host-side protocol engine for TinyG motion controllers over a serial
//! line.
//!
//! ## Architecture
//!
//! The workspace is split into crates:
//!
//! 1. **tinyg-link-core** - Error types
//! 2. **tinyg-link-settings** - Link configuration, loading and validation
//! 3. **tinyg-link-communication** - Serial channel, link arbiter, reader
//!    task, command sender and config synchronizer
//! 4. **tinyg-link** - This crate: logging setup and the command-line entry
//!
//! ## Features
//!
//! - **Serialized link access**: one writer or reader on the wire at a time
//! - **Hard-stop detection**: a `st:204` report faults the link until reset
//! - **Completion heuristic**: a send returns once the channel goes quiet
//! - **Config sync**: verify a settings file against the controller and
//!   rewrite only what differs

pub use tinyg_link_communication::{
    find_tinyg_port, list_ports, Axes, Channel, CommandCreator, CommandSender, ConfigSet,
    ConfigSynchronizer, HomeAxes, LinkArbiter, LinkSignals, ReaderTask, SavedPosition,
    SerialChannel, SerialPortInfo, SessionLog, SyncReport, TinyGLink,
};
pub use tinyg_link_core::{
    ConfigError, ConnectionError, DecodeError, Error, ProtocolError, Result,
};
pub use tinyg_link_settings::LinkConfig;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting
/// - RUST_LOG environment variable support
///
/// Device traffic is logged under the `tinyg_link::wire` target at debug
/// level, or `tinyg_link::echo` at info level when echo is enabled.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
