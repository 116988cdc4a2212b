//! TinyG firmware support
//!
//! The TinyG speaks line-delimited JSON over a serial link. Commands are
//! `{"gc":"..."}` or `{"key":value}` objects; the controller answers with
//! `{"r":{...},"f":[...]}` responses and reports hard stops as
//! `{"er":{...,"st":204,...}}`.

pub mod command_creator;
pub mod config_sync;
pub mod link;
pub mod reader;
pub mod response_parser;
pub mod sender;
pub mod signals;

pub use command_creator::{
    Axes, CommandCreator, HomeAxes, MachineLimits, RealTimeCommand, SavedPosition,
};
pub use config_sync::{
    ConfigEntry, ConfigMismatch, ConfigSet, ConfigSynchronizer, SyncPolicy, SyncReport,
};
pub use link::TinyGLink;
pub use reader::{ReaderPolicy, ReaderTask};
pub use response_parser::{
    FaultReport, Footer, LineKind, ProtocolLine, TinyGResponse, TinyGResponseParser,
    HARD_STOP_STATUS,
};
pub use sender::{hard_reset, CommandSender, SenderPolicy, HARD_RESET_BYTE};
pub use signals::LinkSignals;
