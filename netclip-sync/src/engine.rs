//! The synchronization state machine.
//!
//! `SyncEngine` owns the clip history and the loop guard and runs both flows
//! against them:
//!
//! - local to network: read the clipboard, record the value, broadcast it
//!   when autosend is on or the user asked for it;
//! - network to local: decode a datagram, record the value, apply it to the
//!   clipboard when autoreceive is on or the user asked for it.
//!
//! Every method takes `&mut self`, so whoever drives the engine serializes the
//! flows. `SyncService` does that with a single actor task.

use std::{net::SocketAddr, num::NonZeroUsize, sync::Arc, time::Duration};

use netclip_core::{
    ClipOrigin, ClipValue, CoreError, DEFAULT_ECHO_WINDOW, DEFAULT_MAX_HISTORY_COUNT,
    HistoryStore, LoopGuard, RecordOutcome, decode_datagram, encode_datagram,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    SyncError,
    clipboard::{ClipboardAccess, ClipboardError},
    transport::{Datagram, Transport},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SyncModes {
    pub autosend: bool,
    pub autoreceive: bool,
}

/// What started a local poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Timer,
    Explicit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub max_history_count: NonZeroUsize,
    pub echo_window: Duration,
    pub modes: SyncModes,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_history_count: NonZeroUsize::new(DEFAULT_MAX_HISTORY_COUNT)
                .unwrap_or(NonZeroUsize::MIN),
            echo_window: DEFAULT_ECHO_WINDOW,
            modes: SyncModes::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalOutcome {
    /// The clipboard was empty, held non-text content or could not be read.
    Unavailable,
    /// The value was sent or applied by this process moments ago.
    SelfEcho,
    /// The value is already in the history.
    Unchanged,
    /// New value recorded; autosend is off.
    Recorded(ClipValue),
    Sent(ClipValue),
    /// Recorded but too large for one datagram.
    Refused { value: ClipValue, error: CoreError },
    /// Recorded but the transport failed; not retried.
    SendFailed(ClipValue),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutcome {
    Dropped(CoreError),
    SelfEcho,
    Duplicate,
    /// New value recorded; autoreceive is off.
    Recorded { value: ClipValue, sender: SocketAddr },
    Applied { value: ClipValue, sender: SocketAddr },
    ApplyFailed {
        value: ClipValue,
        sender: SocketAddr,
        error: ClipboardError,
    },
}

pub struct SyncEngine {
    history: HistoryStore,
    guard: LoopGuard,
    modes: SyncModes,
    revision: u64,
    clipboard: Arc<dyn ClipboardAccess>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("history_len", &self.history.len())
            .field("modes", &self.modes)
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    pub fn new(
        settings: EngineSettings,
        clipboard: Arc<dyn ClipboardAccess>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            history: HistoryStore::new(settings.max_history_count),
            guard: LoopGuard::new(settings.echo_window),
            modes: settings.modes,
            revision: 0,
            clipboard,
            transport,
        }
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn get_history(&self, width_limit: usize) -> Vec<String> {
        self.history.list(width_limit)
    }

    /// Bumped whenever the history content or order changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn modes(&self) -> SyncModes {
        self.modes
    }

    pub fn set_autosend(&mut self, enabled: bool) {
        self.modes.autosend = enabled;
        info!(enabled, "autosend toggled");
    }

    pub fn set_autoreceive(&mut self, enabled: bool) {
        self.modes.autoreceive = enabled;
        info!(enabled, "autoreceive toggled");
    }

    /// Local to network flow.
    ///
    /// A timer poll only broadcasts values that are new to the history while
    /// autosend is on. An explicit poll is the user asking to share whatever
    /// is on the clipboard now, so it also broadcasts a value already in the
    /// history. Both skip values this process sent or applied inside the echo
    /// window.
    pub async fn poll_local(&mut self, trigger: Trigger) -> LocalOutcome {
        let value = match self.clipboard.read().await {
            Ok(Some(value)) => value,
            Ok(None) => return LocalOutcome::Unavailable,
            Err(err) => {
                warn!("clipboard read skipped: {}", err);
                return LocalOutcome::Unavailable;
            }
        };

        let explicit = trigger == Trigger::Explicit;
        if self.guard.is_self_echo(&value) {
            debug!(clip = %value.fingerprint_hex(), "local change is our own echo");
            return LocalOutcome::SelfEcho;
        }

        let outcome = self.record(&value, ClipOrigin::Local);
        if !outcome.is_new && !explicit {
            return LocalOutcome::Unchanged;
        }

        info!(
            clip = %value.fingerprint_hex(),
            bytes = value.byte_len(),
            "local clip recorded"
        );

        if self.modes.autosend || explicit {
            self.broadcast(value).await
        } else {
            LocalOutcome::Recorded(value)
        }
    }

    /// Records what is already on the clipboard at startup without sending
    /// it, so only changes made while running are shared.
    pub async fn prime_local(&mut self) -> Option<ClipValue> {
        match self.clipboard.read().await {
            Ok(Some(value)) => {
                self.record(&value, ClipOrigin::Local);
                Some(value)
            }
            Ok(None) => None,
            Err(err) => {
                warn!("initial clipboard read skipped: {}", err);
                None
            }
        }
    }

    pub async fn send_now(&mut self) -> LocalOutcome {
        self.poll_local(Trigger::Explicit).await
    }

    /// Network to local flow for one received datagram.
    pub async fn handle_datagram(&mut self, datagram: Datagram) -> RemoteOutcome {
        let value = match decode_datagram(&datagram.payload) {
            Ok(value) => value,
            Err(err) => {
                warn!(sender = %datagram.sender, "dropping datagram: {}", err);
                return RemoteOutcome::Dropped(err);
            }
        };

        if self.guard.is_self_echo(&value) {
            debug!(clip = %value.fingerprint_hex(), "datagram is our own echo");
            return RemoteOutcome::SelfEcho;
        }

        let sender = datagram.sender;
        let outcome = self.record(&value, ClipOrigin::Remote { sender });
        if !outcome.is_new {
            debug!(clip = %value.fingerprint_hex(), %sender, "duplicate datagram");
            return RemoteOutcome::Duplicate;
        }

        info!(
            clip = %value.fingerprint_hex(),
            bytes = value.byte_len(),
            %sender,
            "clip received"
        );

        if !self.modes.autoreceive {
            return RemoteOutcome::Recorded { value, sender };
        }

        match self.apply(&value).await {
            Ok(()) => RemoteOutcome::Applied { value, sender },
            Err(error) => {
                warn!("failed to apply received clip: {}", error);
                RemoteOutcome::ApplyFailed {
                    value,
                    sender,
                    error,
                }
            }
        }
    }

    /// Applies the most recent clip that arrived from the network.
    pub async fn receive_latest(&mut self) -> Result<ClipValue, SyncError> {
        let value = self
            .history
            .latest_remote()
            .map(|entry| entry.value().clone())
            .ok_or(SyncError::NothingReceived)?;
        self.apply(&value).await?;
        Ok(value)
    }

    /// Re-broadcasts the history entry at `index` (0 = most recent).
    pub async fn send_entry(&mut self, index: usize) -> Result<LocalOutcome, SyncError> {
        let value = self.entry_value(index)?;
        Ok(self.broadcast(value).await)
    }

    /// Writes the history entry at `index` to the clipboard.
    pub async fn copy_entry(&mut self, index: usize) -> Result<ClipValue, SyncError> {
        let value = self.entry_value(index)?;
        self.apply(&value).await?;
        Ok(value)
    }

    fn entry_value(&self, index: usize) -> Result<ClipValue, SyncError> {
        self.history
            .get(index)
            .map(|entry| entry.value().clone())
            .ok_or(SyncError::NoSuchEntry(index))
    }

    fn record(&mut self, value: &ClipValue, origin: ClipOrigin) -> RecordOutcome {
        let was_front = self
            .history
            .front()
            .is_some_and(|entry| entry.value() == value);
        let outcome = self.history.record(value.clone(), origin);
        if outcome.is_new || !was_front {
            self.revision = self.revision.wrapping_add(1);
        }
        outcome
    }

    async fn broadcast(&mut self, value: ClipValue) -> LocalOutcome {
        let payload = match encode_datagram(&value) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(clip = %value.fingerprint_hex(), "send refused: {}", error);
                return LocalOutcome::Refused { value, error };
            }
        };

        self.guard.mark_outgoing(&value);
        match self.transport.send(&payload).await {
            Ok(()) => {
                info!(clip = %value.fingerprint_hex(), bytes = payload.len(), "clip sent");
                LocalOutcome::Sent(value)
            }
            Err(err) => {
                warn!(clip = %value.fingerprint_hex(), "send skipped: {}", err);
                LocalOutcome::SendFailed(value)
            }
        }
    }

    async fn apply(&mut self, value: &ClipValue) -> Result<(), ClipboardError> {
        self.guard.mark_outgoing(value);
        self.clipboard.write(value).await?;
        info!(clip = %value.fingerprint_hex(), "clip applied to clipboard");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use netclip_core::MAX_DATAGRAM_BYTES;

    use super::*;
    use crate::{clipboard::MockClipboard, transport::MockTransport};

    struct Harness {
        engine: SyncEngine,
        clipboard: MockClipboard,
        transport: MockTransport,
    }

    fn harness(modes: SyncModes, echo_window: Duration) -> Harness {
        harness_with(modes, echo_window, MockTransport::new())
    }

    fn harness_with(modes: SyncModes, echo_window: Duration, transport: MockTransport) -> Harness {
        let clipboard = MockClipboard::new();
        let settings = EngineSettings {
            echo_window,
            modes,
            ..EngineSettings::default()
        };
        let engine = SyncEngine::new(
            settings,
            Arc::new(clipboard.clone()),
            Arc::new(transport.clone()),
        );
        Harness {
            engine,
            clipboard,
            transport,
        }
    }

    fn modes(autosend: bool, autoreceive: bool) -> SyncModes {
        SyncModes {
            autosend,
            autoreceive,
        }
    }

    fn clip(text: &str) -> ClipValue {
        ClipValue::new(text).unwrap()
    }

    fn peer() -> SocketAddr {
        SocketAddr::from(([192, 168, 1, 42], 10000))
    }

    fn datagram(payload: &'static [u8]) -> Datagram {
        Datagram {
            payload: Bytes::from_static(payload),
            sender: peer(),
        }
    }

    const WINDOW: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn autosend_sends_a_new_clip_exactly_once() {
        let mut h = harness(modes(true, false), WINDOW);
        h.clipboard.set_text("hello");

        assert_eq!(
            h.engine.poll_local(Trigger::Timer).await,
            LocalOutcome::Sent(clip("hello"))
        );
        let second = h.engine.poll_local(Trigger::Timer).await;
        assert!(matches!(
            second,
            LocalOutcome::SelfEcho | LocalOutcome::Unchanged
        ));
        assert_eq!(h.transport.sent(), vec![Bytes::from("hello")]);
    }

    #[tokio::test]
    async fn startup_content_is_recorded_but_not_sent() {
        let mut h = harness(modes(true, false), WINDOW);
        h.clipboard.set_text("already there");
        assert_eq!(h.engine.prime_local().await, Some(clip("already there")));
        assert_eq!(
            h.engine.poll_local(Trigger::Timer).await,
            LocalOutcome::Unchanged
        );
        assert_eq!(h.transport.sent_count(), 0);
        assert_eq!(h.engine.get_history(30), vec!["already there"]);
    }

    #[tokio::test]
    async fn unchanged_clipboard_is_not_resent_after_the_window() {
        let mut h = harness(modes(true, false), Duration::ZERO);
        h.clipboard.set_text("hello");
        h.engine.poll_local(Trigger::Timer).await;
        assert_eq!(
            h.engine.poll_local(Trigger::Timer).await,
            LocalOutcome::Unchanged
        );
        assert_eq!(h.transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn sent_clip_read_back_is_a_self_echo() {
        let mut h = harness(modes(true, false), WINDOW);
        h.clipboard.set_text("hello");
        h.engine.poll_local(Trigger::Timer).await;
        assert_eq!(
            h.engine.poll_local(Trigger::Timer).await,
            LocalOutcome::SelfEcho
        );
        assert_eq!(h.transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn autosend_off_records_without_sending() {
        let mut h = harness(modes(false, false), WINDOW);
        h.clipboard.set_text("quiet");
        assert_eq!(
            h.engine.poll_local(Trigger::Timer).await,
            LocalOutcome::Recorded(clip("quiet"))
        );
        assert_eq!(h.transport.sent_count(), 0);
        assert_eq!(h.engine.get_history(30), vec!["quiet"]);
    }

    #[tokio::test]
    async fn empty_or_failing_clipboard_is_skipped() {
        let mut h = harness(modes(true, false), WINDOW);
        assert_eq!(
            h.engine.poll_local(Trigger::Timer).await,
            LocalOutcome::Unavailable
        );
        h.clipboard.set_text("x");
        h.clipboard.fail_next_read("busy");
        assert_eq!(
            h.engine.poll_local(Trigger::Timer).await,
            LocalOutcome::Unavailable
        );
        assert!(h.engine.history().is_empty());
        assert_eq!(h.engine.poll_local(Trigger::Timer).await, LocalOutcome::Sent(clip("x")));
    }

    #[tokio::test]
    async fn oversized_clip_is_recorded_but_refused() {
        let mut h = harness(modes(true, false), WINDOW);
        let big = "y".repeat(MAX_DATAGRAM_BYTES + 1);
        h.clipboard.set_text(&big);

        let outcome = h.engine.poll_local(Trigger::Timer).await;
        assert!(matches!(
            outcome,
            LocalOutcome::Refused {
                error: CoreError::OversizedPayload { .. },
                ..
            }
        ));
        assert_eq!(h.transport.sent_count(), 0);
        assert_eq!(h.engine.history().len(), 1);
    }

    #[tokio::test]
    async fn send_failure_is_not_retried_on_next_tick() {
        let mut h = harness(modes(true, false), Duration::ZERO);
        h.clipboard.set_text("flaky");
        h.transport.fail_next_send("network down");
        assert_eq!(
            h.engine.poll_local(Trigger::Timer).await,
            LocalOutcome::SendFailed(clip("flaky"))
        );
        assert_eq!(
            h.engine.poll_local(Trigger::Timer).await,
            LocalOutcome::Unchanged
        );
        assert_eq!(h.transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn explicit_send_shares_a_known_value() {
        let mut h = harness(modes(false, false), WINDOW);
        h.clipboard.set_text("manual");
        h.engine.poll_local(Trigger::Timer).await;
        assert_eq!(h.transport.sent_count(), 0);

        assert_eq!(h.engine.send_now().await, LocalOutcome::Sent(clip("manual")));
        assert_eq!(h.transport.sent(), vec![Bytes::from("manual")]);
        assert_eq!(h.engine.history().len(), 1);
    }

    #[tokio::test]
    async fn explicit_send_does_not_bounce_an_applied_clip() {
        let mut h = harness(modes(false, true), WINDOW);
        assert!(matches!(
            h.engine.handle_datagram(datagram(b"from peer")).await,
            RemoteOutcome::Applied { .. }
        ));

        assert_eq!(h.engine.send_now().await, LocalOutcome::SelfEcho);
        assert_eq!(h.engine.send_now().await, LocalOutcome::SelfEcho);
        assert_eq!(h.transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn repeated_explicit_send_inside_the_window_sends_once() {
        let mut h = harness(modes(false, false), WINDOW);
        h.clipboard.set_text("manual");
        assert_eq!(h.engine.send_now().await, LocalOutcome::Sent(clip("manual")));
        assert_eq!(h.engine.send_now().await, LocalOutcome::SelfEcho);
        assert_eq!(h.transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn autoreceive_applies_a_new_clip_once() {
        let mut h = harness(modes(false, true), WINDOW);
        let first = h.engine.handle_datagram(datagram(b"world")).await;
        assert_eq!(
            first,
            RemoteOutcome::Applied {
                value: clip("world"),
                sender: peer()
            }
        );

        let second = h.engine.handle_datagram(datagram(b"world")).await;
        assert!(matches!(
            second,
            RemoteOutcome::SelfEcho | RemoteOutcome::Duplicate
        ));
        assert_eq!(h.clipboard.writes(), vec!["world"]);
        assert_eq!(h.engine.history().len(), 1);
    }

    #[tokio::test]
    async fn repeated_datagram_after_window_is_a_duplicate() {
        let mut h = harness(modes(false, true), Duration::ZERO);
        h.engine.handle_datagram(datagram(b"world")).await;
        assert_eq!(
            h.engine.handle_datagram(datagram(b"world")).await,
            RemoteOutcome::Duplicate
        );
        assert_eq!(h.clipboard.writes().len(), 1);
    }

    #[tokio::test]
    async fn applied_clip_is_not_bounced_back_to_the_network() {
        let mut h = harness(modes(true, true), WINDOW);
        h.engine.handle_datagram(datagram(b"from peer")).await;
        assert_eq!(h.clipboard.current().as_deref(), Some("from peer"));

        assert_eq!(
            h.engine.poll_local(Trigger::Timer).await,
            LocalOutcome::SelfEcho
        );
        assert_eq!(h.transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn own_datagram_looped_back_is_ignored() {
        let transport = MockTransport::new().with_loopback();
        let mut h = harness_with(modes(true, true), WINDOW, transport);
        h.clipboard.set_text("mine");
        h.engine.poll_local(Trigger::Timer).await;

        let echoed = h.transport.recv().await.unwrap();
        assert_eq!(
            h.engine.handle_datagram(echoed).await,
            RemoteOutcome::SelfEcho
        );
        assert!(h.clipboard.writes().is_empty());
    }

    #[tokio::test]
    async fn malformed_datagrams_are_dropped() {
        let mut h = harness(modes(false, true), WINDOW);
        let outcome = h.engine.handle_datagram(datagram(&[0xC3, 0x28])).await;
        assert!(matches!(
            outcome,
            RemoteOutcome::Dropped(CoreError::MalformedPayload(_))
        ));
        let outcome = h.engine.handle_datagram(datagram(b"")).await;
        assert!(matches!(outcome, RemoteOutcome::Dropped(_)));
        assert!(h.engine.history().is_empty());
    }

    #[tokio::test]
    async fn local_and_remote_race_on_the_same_value_is_idempotent() {
        let mut h = harness(modes(false, true), WINDOW);
        h.clipboard.set_text("same");
        h.engine.poll_local(Trigger::Timer).await;
        assert_eq!(
            h.engine.handle_datagram(datagram(b"same")).await,
            RemoteOutcome::Duplicate
        );
        assert!(h.clipboard.writes().is_empty());
        assert_eq!(h.engine.history().len(), 1);
    }

    #[tokio::test]
    async fn receive_latest_applies_the_newest_remote_clip() {
        let mut h = harness(modes(true, false), WINDOW);
        assert!(matches!(
            h.engine.receive_latest().await,
            Err(SyncError::NothingReceived)
        ));

        assert_eq!(
            h.engine.handle_datagram(datagram(b"remote")).await,
            RemoteOutcome::Recorded {
                value: clip("remote"),
                sender: peer()
            }
        );
        assert!(h.clipboard.writes().is_empty());

        assert_eq!(h.engine.receive_latest().await.unwrap(), clip("remote"));
        assert_eq!(h.clipboard.writes(), vec!["remote"]);
        // the applied value must not be broadcast back out
        assert_eq!(
            h.engine.poll_local(Trigger::Timer).await,
            LocalOutcome::SelfEcho
        );
        assert_eq!(h.transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn apply_failure_keeps_the_history_entry() {
        let mut h = harness(modes(false, true), WINDOW);
        h.clipboard.fail_next_write("no display");
        let outcome = h.engine.handle_datagram(datagram(b"lost")).await;
        assert!(matches!(outcome, RemoteOutcome::ApplyFailed { .. }));
        assert_eq!(h.engine.get_history(30), vec!["lost"]);
    }

    #[tokio::test]
    async fn entry_actions_address_history_by_index() {
        let mut h = harness(modes(false, false), WINDOW);
        h.engine.handle_datagram(datagram(b"older")).await;
        h.clipboard.set_text("newer");
        h.engine.poll_local(Trigger::Timer).await;

        assert_eq!(
            h.engine.send_entry(1).await.unwrap(),
            LocalOutcome::Sent(clip("older"))
        );
        assert_eq!(h.engine.copy_entry(1).await.unwrap(), clip("older"));
        assert_eq!(h.clipboard.writes(), vec!["older"]);
        assert!(matches!(
            h.engine.send_entry(5).await,
            Err(SyncError::NoSuchEntry(5))
        ));
        assert!(matches!(
            h.engine.copy_entry(2).await,
            Err(SyncError::NoSuchEntry(2))
        ));
    }

    #[tokio::test]
    async fn toggles_do_not_touch_history() {
        let mut h = harness(modes(false, false), WINDOW);
        h.clipboard.set_text("kept");
        h.engine.poll_local(Trigger::Timer).await;
        let revision = h.engine.revision();

        h.engine.set_autosend(true);
        h.engine.set_autoreceive(true);
        assert_eq!(h.engine.modes(), modes(true, true));
        assert_eq!(h.engine.revision(), revision);
        assert_eq!(h.engine.get_history(30), vec!["kept"]);
    }

    #[tokio::test]
    async fn revision_tracks_reordering() {
        let mut h = harness(modes(false, false), WINDOW);
        h.engine.handle_datagram(datagram(b"a")).await;
        h.engine.handle_datagram(datagram(b"b")).await;
        let before = h.engine.revision();

        h.engine.handle_datagram(datagram(b"b")).await;
        assert_eq!(h.engine.revision(), before);

        h.engine.handle_datagram(datagram(b"a")).await;
        assert_eq!(h.engine.revision(), before + 1);
        assert_eq!(h.engine.get_history(30), vec!["a", "b"]);
    }
}
