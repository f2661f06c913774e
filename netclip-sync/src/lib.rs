pub mod clipboard;
pub mod config;
pub mod engine;
pub mod service;
pub mod transport;

pub use clipboard::{
    ClipboardAccess, ClipboardError, ClipboardSelection, MockClipboard, SystemClipboard,
};
pub use config::{ConfigError, SyncArgs, SyncConfig};
pub use engine::{EngineSettings, LocalOutcome, RemoteOutcome, SyncEngine, SyncModes, Trigger};
pub use service::{HistoryItem, HistoryView, ServiceOptions, SyncEvent, SyncHandle, SyncService};
pub use transport::{Datagram, MockTransport, MulticastTransport, Transport, TransportError};

use netclip_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Clipboard(#[from] ClipboardError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("no history entry at index {0}")]
    NoSuchEntry(usize),
    #[error("nothing has been received yet")]
    NothingReceived,
    #[error("sync engine is not running")]
    EngineStopped,
}
