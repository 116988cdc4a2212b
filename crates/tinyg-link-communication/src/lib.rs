//! # TinyG Link Communication
//!
//! Serial transport and the TinyG protocol engine: link arbitration, the
//! background reader, command sending with completion detection and
//! configuration synchronization.

pub mod communication;
pub mod firmware;

pub use communication::{
    find_tinyg_port, list_ports, Channel, Direction, LineAssembler, LinkArbiter, LinkGuard,
    SerialChannel, SerialPortInfo, SessionLog,
};

pub use firmware::tinyg::{
    hard_reset, Axes, CommandCreator, CommandSender, ConfigEntry, ConfigMismatch, ConfigSet,
    ConfigSynchronizer, HomeAxes, LineKind, LinkSignals, MachineLimits, ProtocolLine,
    ReaderPolicy, ReaderTask, SavedPosition, SenderPolicy, SyncPolicy, SyncReport, TinyGLink,
    TinyGResponse, TinyGResponseParser, HARD_RESET_BYTE,
};
