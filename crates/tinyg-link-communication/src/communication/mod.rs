//! Communication layer
//!
//! The link engine talks to the controller through a [`Channel`]: a duplex
//! byte stream with a blocking write and non-blocking "what is available"
//! reads. All access goes through the [`LinkArbiter`].

pub mod arbiter;
pub mod lines;
pub mod serial;
pub mod session_log;

use std::io;

pub use arbiter::{LinkArbiter, LinkGuard};
pub use lines::LineAssembler;
pub use serial::{find_tinyg_port, list_ports, SerialChannel, SerialPortInfo};
pub use session_log::{Direction, SessionLog};

/// Duplex byte channel to the controller
///
/// Implementations must not block in [`Channel::bytes_pending`] or
/// [`Channel::read_available`]; an empty input buffer reads as zero bytes.
pub trait Channel: Send {
    /// Write every byte of `data`
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush buffered output to the device
    fn flush(&mut self) -> io::Result<()>;

    /// Number of received bytes waiting to be read
    fn bytes_pending(&self) -> io::Result<usize>;

    /// Read whatever is currently buffered, possibly nothing
    fn read_available(&mut self) -> io::Result<Vec<u8>>;

    /// Discard received but unread bytes
    fn clear_input(&mut self) -> io::Result<()>;

    /// Discard written but unsent bytes
    fn clear_output(&mut self) -> io::Result<()>;

    /// Switch RTS/CTS flow control on the host side
    fn set_hardware_flow_control(&mut self, _enabled: bool) -> io::Result<()> {
        Ok(())
    }

    /// Human readable channel name
    fn name(&self) -> String;

    /// Release the underlying device
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}
