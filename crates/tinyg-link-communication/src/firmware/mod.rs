//! Firmware implementations
//!
//! Supported controllers:
//! - TinyG: JSON-mode serial protocol

pub mod tinyg;
