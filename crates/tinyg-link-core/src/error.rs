//! Error handling for tinyg-link
//!
//! Provides error types for every layer of the link engine:
//! - Connection errors (the serial channel failed)
//! - Protocol errors (the device reported a hard stop, or the session is faulted)
//! - Decode errors (inbound bytes that are not a usable protocol line)
//! - Config errors (configuration set files and synchronization)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Connection error type
///
/// Represents failures of the byte channel to the device. These are surfaced
/// to the caller of the operation in progress and never retried by the engine.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// No port matched the discovery rules
    #[error("Port not found: {port}")]
    PortNotFound {
        /// The port name or discovery key that was searched for.
        port: String,
    },

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Operation attempted on a link that is not connected
    #[error("Link not connected")]
    NotConnected,

    /// Connection lost
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Read or write on the channel failed
    #[error("I/O error: {reason}")]
    IoError {
        /// The reason for the I/O error.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },
}

impl From<std::io::Error> for ConnectionError {
    fn from(err: std::io::Error) -> Self {
        ConnectionError::IoError {
            reason: err.to_string(),
        }
    }
}

/// Protocol error type
///
/// A fault is fatal to the current session: every later command fails fast
/// until a hard reset and a fresh connection.
#[derive(Error, Debug, Clone)]
pub enum ProtocolError {
    /// The device reported a hard stop
    #[error("Device hard stop: {payload}")]
    HardStop {
        /// The raw fault report as received from the device.
        payload: String,
    },

    /// The fault signal was already raised when the operation started
    #[error("Link is faulted: {reason}")]
    Faulted {
        /// The diagnostic recorded when the fault was raised.
        reason: String,
    },

    /// The reader task stopped unexpectedly
    #[error("Reader task terminated: {reason}")]
    ReaderTerminated {
        /// Why the task ended.
        reason: String,
    },

    /// Waiting for motion completion exceeded the configured bound
    #[error("Motion completion not observed after {timeout_ms}ms")]
    CompletionTimeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },
}

/// Decode error type
///
/// Inbound data that could not be turned into a protocol line. Recoverable:
/// the fragment is dropped and reading continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// The fragment is not valid UTF-8
    #[error("Invalid UTF-8 in {len} byte fragment: {reason}")]
    InvalidUtf8 {
        /// Length of the rejected fragment in bytes.
        len: usize,
        /// The decoder's explanation.
        reason: String,
    },

    /// The line is not a JSON object
    #[error("Malformed response line '{line}': {reason}")]
    MalformedLine {
        /// The offending line.
        line: String,
        /// The parser's explanation.
        reason: String,
    },
}

/// Config error type
///
/// Problems with a configuration set or with reconciling it against the device.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    /// The configuration set could not be read
    #[error("Failed to read config set {path}: {reason}")]
    Unreadable {
        /// The file that was read.
        path: String,
        /// The reason the read failed.
        reason: String,
    },

    /// A line of the configuration set is not a `{"key":value}` entry
    #[error("Invalid config line {line_number}: {reason}")]
    InvalidLine {
        /// One-based line number.
        line_number: usize,
        /// What was wrong with the line.
        reason: String,
    },

    /// The device did not answer for every key within the verify bound
    #[error("No response for {pending:?} after {timeout_ms}ms")]
    VerifyTimeout {
        /// Keys still waiting for a response.
        pending: Vec<String>,
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Mismatches remained after the allowed number of correction rounds
    #[error("Config did not converge after {rounds} rounds, still mismatched: {keys:?}")]
    NotConverged {
        /// Correction rounds performed.
        rounds: u32,
        /// Keys still mismatched.
        keys: Vec<String>,
    },

    /// Engine configuration rejected by validation
    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting {
        /// The setting name.
        key: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Main error type for tinyg-link
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Decode error
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Config error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this error means the session is faulted.
    ///
    /// A completion timeout is a protocol error but not a fault.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            Error::Protocol(
                ProtocolError::HardStop { .. }
                    | ProtocolError::Faulted { .. }
                    | ProtocolError::ReaderTerminated { .. }
            )
        )
    }

    /// Check if this is a transport failure
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Io(_))
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Protocol(ProtocolError::CompletionTimeout { .. })
                | Error::Config(ConfigError::VerifyTimeout { .. })
        )
    }

    /// Check if this is a decode error
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Error::Decode(_))
    }

    /// Check if this is a config error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::HardStop {
            payload: r#"{"er":{"st":204}}"#.to_string(),
        };
        assert_eq!(err.to_string(), r#"Device hard stop: {"er":{"st":204}}"#);

        let err = ConnectionError::PortNotFound {
            port: "VID:PID=0403:6015".to_string(),
        };
        assert_eq!(err.to_string(), "Port not found: VID:PID=0403:6015");

        let err = ConfigError::InvalidLine {
            line_number: 3,
            reason: "expected one key".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid config line 3: expected one key");
    }

    #[test]
    fn test_error_classification() {
        let fault: Error = ProtocolError::Faulted {
            reason: "limit switch".to_string(),
        }
        .into();
        assert!(fault.is_fault());
        assert!(!fault.is_transport());

        let timeout: Error = ProtocolError::CompletionTimeout { timeout_ms: 50 }.into();
        assert!(timeout.is_timeout());
        assert!(!timeout.is_fault());

        let io: Error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        assert!(io.is_transport());

        let conn: Error = ConnectionError::from(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "slow",
        ))
        .into();
        assert!(conn.is_transport());

        let decode: Error = DecodeError::InvalidUtf8 {
            len: 2,
            reason: "bad".to_string(),
        }
        .into();
        assert!(decode.is_decode_error());
    }
}
