use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use netclip_core::ClipValue;

use super::{ClipboardAccess, ClipboardError};

/// In-memory clipboard for tests. Writes replace the current content, so a
/// value the engine applies is read back on the next poll like a real echo.
#[derive(Debug, Clone, Default)]
pub struct MockClipboard {
    inner: Arc<Mutex<MockClipboardInner>>,
}

#[derive(Debug, Default)]
struct MockClipboardInner {
    current: Option<String>,
    writes: Vec<String>,
    reads: usize,
    fail_next_read: Option<String>,
    fail_next_write: Option<String>,
}

impl MockClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the user copying `text`.
    pub fn set_text(&self, text: &str) {
        self.lock().current = Some(text.to_owned());
    }

    pub fn current(&self) -> Option<String> {
        self.lock().current.clone()
    }

    /// Every value written through `ClipboardAccess::write`, oldest first.
    pub fn writes(&self) -> Vec<String> {
        self.lock().writes.clone()
    }

    pub fn read_count(&self) -> usize {
        self.lock().reads
    }

    pub fn fail_next_read(&self, error: &str) {
        self.lock().fail_next_read = Some(error.to_owned());
    }

    pub fn fail_next_write(&self, error: &str) {
        self.lock().fail_next_write = Some(error.to_owned());
    }

    fn lock(&self) -> MutexGuard<'_, MockClipboardInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ClipboardAccess for MockClipboard {
    async fn read(&self) -> Result<Option<ClipValue>, ClipboardError> {
        let mut inner = self.lock();
        inner.reads += 1;
        if let Some(error) = inner.fail_next_read.take() {
            return Err(ClipboardError::Unavailable(error));
        }
        Ok(inner
            .current
            .clone()
            .and_then(|text| ClipValue::new(text).ok()))
    }

    async fn write(&self, value: &ClipValue) -> Result<(), ClipboardError> {
        let mut inner = self.lock();
        if let Some(error) = inner.fail_next_write.take() {
            return Err(ClipboardError::WriteFailed(error));
        }
        inner.writes.push(value.as_str().to_owned());
        inner.current = Some(value.as_str().to_owned());
        Ok(())
    }
}
