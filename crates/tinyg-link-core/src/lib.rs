//! # tinyg-link Core
//!
//! Core types shared by the tinyg-link crates: the unified error taxonomy
//! used by the transport, the protocol engine and config synchronization.

pub mod error;

pub use error::{ConfigError, ConnectionError, DecodeError, Error, ProtocolError, Result};
