//! Text renderings of the sync state.
//!
//! The indicator frontend prints one-line status updates. The menu frontend
//! redraws a numbered menu split into clips copied here (to send) and clips
//! received from peers (to copy). Numbers are 1-based history positions and
//! are what `send <n>` and `copy <n>` take.

use std::fmt::Write as _;

use netclip_core::ClipOrigin;
use netclip_sync::{HistoryView, SyncEvent, SyncModes};

pub const SEND_SECTION_TITLE: &str = "Click to send on network:";
pub const COPY_SECTION_TITLE: &str = "Click to copy to clipboard:";
pub const NO_SEND_ITEMS: &str = "(no items to send yet)";
pub const NO_COPY_ITEMS: &str = "(no items received yet)";

pub trait Frontend: Send + Sync {
    fn render_history(&self, view: &HistoryView) -> String;

    /// Text for a notification, or `None` when it is not shown.
    fn render_event(&self, event: &SyncEvent) -> Option<String>;

    fn render_modes(&self, modes: SyncModes) -> String;

    /// Whether the history is printed again after every change.
    fn redraw_on_history_change(&self) -> bool {
        false
    }
}

pub fn frontend_for(legacy_presentation_mode: bool) -> Box<dyn Frontend> {
    if legacy_presentation_mode {
        Box::new(MenuFrontend)
    } else {
        Box::new(IndicatorFrontend)
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IndicatorFrontend;

impl Frontend for IndicatorFrontend {
    fn render_history(&self, view: &HistoryView) -> String {
        let mut out = format!(
            "netclip: {} of {} clips, {}\n",
            view.items.len(),
            view.max_count,
            self.render_modes(view.modes)
        );
        for item in &view.items {
            let source = match item.origin {
                ClipOrigin::Local => "local".to_owned(),
                ClipOrigin::Remote { sender } => sender.ip().to_string(),
            };
            let _ = writeln!(out, "  {:>2}. {} [{}]", item.index + 1, item.label, source);
        }
        out
    }

    fn render_event(&self, event: &SyncEvent) -> Option<String> {
        match event {
            SyncEvent::HistoryChanged => None,
            SyncEvent::ClipSent { label } => Some(format!("sent: {label}")),
            SyncEvent::SendFailed { label } => Some(format!("send failed: {label}")),
            SyncEvent::SendRefused { reason } => Some(format!("not sent: {reason}")),
            SyncEvent::ClipReceived {
                sender,
                label,
                applied: true,
            } => Some(format!("received from {}: {label}", sender.ip())),
            SyncEvent::ClipReceived {
                sender,
                label,
                applied: false,
            } => Some(format!(
                "received from {} (use `recv` to paste): {label}",
                sender.ip()
            )),
            SyncEvent::ClipApplied { label } => Some(format!("copied to clipboard: {label}")),
            SyncEvent::ModesChanged { modes } => Some(self.render_modes(*modes)),
        }
    }

    fn render_modes(&self, modes: SyncModes) -> String {
        format!(
            "autosend {}, autoreceive {}",
            on_off(modes.autosend),
            on_off(modes.autoreceive)
        )
    }
}

/// Numbered menu laid out like the legacy tray menu.
#[derive(Debug, Default, Clone, Copy)]
pub struct MenuFrontend;

impl Frontend for MenuFrontend {
    fn render_history(&self, view: &HistoryView) -> String {
        let mut out = String::new();
        let sections = [
            (SEND_SECTION_TITLE, NO_SEND_ITEMS, false),
            (COPY_SECTION_TITLE, NO_COPY_ITEMS, true),
        ];
        for (title, placeholder, remote) in sections {
            let _ = writeln!(out, "{title}");
            let mut shown = 0;
            for item in view
                .items
                .iter()
                .filter(|item| matches!(item.origin, ClipOrigin::Remote { .. }) == remote)
            {
                let _ = writeln!(out, "  {:>2}) {}", item.index + 1, item.label);
                shown += 1;
            }
            if shown == 0 {
                let _ = writeln!(out, "      {placeholder}");
            }
        }
        out.push_str(&self.render_modes(view.modes));
        out.push('\n');
        out
    }

    fn render_event(&self, event: &SyncEvent) -> Option<String> {
        match event {
            SyncEvent::SendRefused { reason } => Some(format!("not sent: {reason}")),
            SyncEvent::SendFailed { label } => Some(format!("send failed: {label}")),
            SyncEvent::ModesChanged { modes } => Some(self.render_modes(*modes)),
            _ => None,
        }
    }

    fn render_modes(&self, modes: SyncModes) -> String {
        let mark = |enabled| if enabled { "[x]" } else { "[ ]" };
        format!(
            "{} Autosend  {} Autoreceive",
            mark(modes.autosend),
            mark(modes.autoreceive)
        )
    }

    fn redraw_on_history_change(&self) -> bool {
        true
    }
}
