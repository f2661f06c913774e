mod mock;
mod system;

pub use mock::MockClipboard;
pub use system::SystemClipboard;

use async_trait::async_trait;
use netclip_core::ClipValue;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClipboardError {
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),
    #[error("clipboard write failed: {0}")]
    WriteFailed(String),
    #[error("clipboard worker stopped")]
    Closed,
}

/// Which selection is read and written.
///
/// `Primary` is the X11/Wayland "select to copy, middle click to paste"
/// selection; on other platforms it falls back to the regular clipboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipboardSelection {
    #[default]
    Clipboard,
    Primary,
}

impl ClipboardSelection {
    pub fn from_use_secondary(use_secondary_selection: bool) -> Self {
        if use_secondary_selection {
            Self::Primary
        } else {
            Self::Clipboard
        }
    }
}

#[async_trait]
pub trait ClipboardAccess: Send + Sync {
    /// Current text of the configured selection. `None` when the selection is
    /// empty or holds something other than text.
    async fn read(&self) -> Result<Option<ClipValue>, ClipboardError>;

    async fn write(&self, value: &ClipValue) -> Result<(), ClipboardError>;
}
