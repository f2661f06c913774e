use std::sync::mpsc as std_mpsc;

use arboard::Clipboard;
use async_trait::async_trait;
use netclip_core::ClipValue;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::{ClipboardAccess, ClipboardError, ClipboardSelection};

type Reply<T> = oneshot::Sender<Result<T, ClipboardError>>;

#[derive(Debug)]
enum ClipboardRequest {
    Read(Reply<Option<String>>),
    Write(String, Reply<()>),
}

/// Native clipboard access.
///
/// A dedicated thread owns the `arboard::Clipboard` for the life of the
/// process; on X11 the owner must stay alive for pasted content to remain
/// available to other applications.
#[derive(Debug)]
pub struct SystemClipboard {
    requests: std_mpsc::Sender<ClipboardRequest>,
}

impl SystemClipboard {
    pub fn spawn(selection: ClipboardSelection) -> Result<Self, ClipboardError> {
        if selection == ClipboardSelection::Primary && !PRIMARY_SUPPORTED {
            warn!("primary selection is not supported on this platform, using the clipboard");
        }

        let (requests, request_rx) = std_mpsc::channel();
        std::thread::Builder::new()
            .name("netclip-clipboard".to_owned())
            .spawn(move || clipboard_worker(selection, request_rx))
            .map_err(|err| ClipboardError::Unavailable(err.to_string()))?;

        Ok(Self { requests })
    }
}

#[async_trait]
impl ClipboardAccess for SystemClipboard {
    async fn read(&self) -> Result<Option<ClipValue>, ClipboardError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(ClipboardRequest::Read(reply_tx))
            .map_err(|_| ClipboardError::Closed)?;
        let text = reply_rx.await.map_err(|_| ClipboardError::Closed)??;
        Ok(text.and_then(|text| ClipValue::new(text).ok()))
    }

    async fn write(&self, value: &ClipValue) -> Result<(), ClipboardError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(ClipboardRequest::Write(value.as_str().to_owned(), reply_tx))
            .map_err(|_| ClipboardError::Closed)?;
        reply_rx.await.map_err(|_| ClipboardError::Closed)?
    }
}

fn clipboard_worker(
    selection: ClipboardSelection,
    request_rx: std_mpsc::Receiver<ClipboardRequest>,
) {
    let mut clipboard: Option<Clipboard> = None;

    while let Ok(request) = request_rx.recv() {
        if clipboard.is_none() {
            match Clipboard::new() {
                Ok(opened) => clipboard = Some(opened),
                Err(err) => warn!("failed to open clipboard: {}", err),
            }
        }

        match request {
            ClipboardRequest::Read(reply) => {
                let result = match clipboard.as_mut() {
                    Some(clipboard) => read_selection(clipboard, selection),
                    None => Err(ClipboardError::Unavailable(
                        "no clipboard connection".to_owned(),
                    )),
                };
                let _ = reply.send(result);
            }
            ClipboardRequest::Write(text, reply) => {
                let result = match clipboard.as_mut() {
                    Some(clipboard) => write_selection(clipboard, selection, text),
                    None => Err(ClipboardError::WriteFailed(
                        "no clipboard connection".to_owned(),
                    )),
                };
                let _ = reply.send(result);
            }
        }
    }

    debug!("clipboard worker stopped");
}

fn read_selection(
    clipboard: &mut Clipboard,
    selection: ClipboardSelection,
) -> Result<Option<String>, ClipboardError> {
    match platform::get_text(clipboard, selection) {
        Ok(text) => Ok(Some(text)),
        Err(arboard::Error::ContentNotAvailable) => Ok(None),
        Err(err) => Err(ClipboardError::Unavailable(err.to_string())),
    }
}

fn write_selection(
    clipboard: &mut Clipboard,
    selection: ClipboardSelection,
    text: String,
) -> Result<(), ClipboardError> {
    platform::set_text(clipboard, selection, text)
        .map_err(|err| ClipboardError::WriteFailed(err.to_string()))
}

#[cfg(all(
    unix,
    not(any(target_os = "macos", target_os = "android", target_os = "emscripten"))
))]
const PRIMARY_SUPPORTED: bool = true;

#[cfg(not(all(
    unix,
    not(any(target_os = "macos", target_os = "android", target_os = "emscripten"))
)))]
const PRIMARY_SUPPORTED: bool = false;

#[cfg(all(
    unix,
    not(any(target_os = "macos", target_os = "android", target_os = "emscripten"))
))]
mod platform {
    use arboard::{Clipboard, GetExtLinux, LinuxClipboardKind, SetExtLinux};

    use super::ClipboardSelection;

    fn kind(selection: ClipboardSelection) -> LinuxClipboardKind {
        match selection {
            ClipboardSelection::Clipboard => LinuxClipboardKind::Clipboard,
            ClipboardSelection::Primary => LinuxClipboardKind::Primary,
        }
    }

    pub(super) fn get_text(
        clipboard: &mut Clipboard,
        selection: ClipboardSelection,
    ) -> Result<String, arboard::Error> {
        clipboard.get().clipboard(kind(selection)).text()
    }

    pub(super) fn set_text(
        clipboard: &mut Clipboard,
        selection: ClipboardSelection,
        text: String,
    ) -> Result<(), arboard::Error> {
        clipboard.set().clipboard(kind(selection)).text(text)
    }
}

#[cfg(not(all(
    unix,
    not(any(target_os = "macos", target_os = "android", target_os = "emscripten"))
)))]
mod platform {
    use arboard::Clipboard;

    use super::ClipboardSelection;

    pub(super) fn get_text(
        clipboard: &mut Clipboard,
        _selection: ClipboardSelection,
    ) -> Result<String, arboard::Error> {
        clipboard.get_text()
    }

    pub(super) fn set_text(
        clipboard: &mut Clipboard,
        _selection: ClipboardSelection,
        text: String,
    ) -> Result<(), arboard::Error> {
        clipboard.set_text(text)
    }
}
