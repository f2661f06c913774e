use std::{collections::VecDeque, net::SocketAddr, num::NonZeroUsize};

use serde::Serialize;

use crate::{ClipValue, now_unix_ms};

/// Where a history entry was first seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClipOrigin {
    Local,
    Remote { sender: SocketAddr },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    value: ClipValue,
    origin: ClipOrigin,
    recorded_at_unix_ms: u64,
}

impl HistoryEntry {
    pub fn value(&self) -> &ClipValue {
        &self.value
    }

    pub fn origin(&self) -> ClipOrigin {
        self.origin
    }

    pub fn recorded_at_unix_ms(&self) -> u64 {
        self.recorded_at_unix_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOutcome {
    pub is_new: bool,
}

/// Most-recent-first clip history with no duplicate values and at most
/// `max_count` entries.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    entries: VecDeque<HistoryEntry>,
    max_count: NonZeroUsize,
}

impl HistoryStore {
    pub fn new(max_count: NonZeroUsize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_count.get().min(1024)),
            max_count,
        }
    }

    /// Records `value` at the front.
    ///
    /// A value already present is moved to the front unchanged (it keeps its
    /// original origin and timestamp) and the outcome is not new. Otherwise a
    /// fresh entry is inserted and the oldest entries are evicted down to
    /// `max_count`.
    pub fn record(&mut self, value: ClipValue, origin: ClipOrigin) -> RecordOutcome {
        if let Some(position) = self.entries.iter().position(|entry| entry.value == value) {
            if position > 0
                && let Some(existing) = self.entries.remove(position)
            {
                self.entries.push_front(existing);
            }
            return RecordOutcome { is_new: false };
        }

        self.entries.push_front(HistoryEntry {
            value,
            origin,
            recorded_at_unix_ms: now_unix_ms(),
        });
        self.entries.truncate(self.max_count.get());
        RecordOutcome { is_new: true }
    }

    /// Display labels front-to-back, each cut to `width_limit` characters.
    pub fn list(&self, width_limit: usize) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| entry.value.label(width_limit))
            .collect()
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn front(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    /// Most recent entry that arrived from the network.
    pub fn latest_remote(&self) -> Option<&HistoryEntry> {
        self.entries
            .iter()
            .find(|entry| matches!(entry.origin, ClipOrigin::Remote { .. }))
    }

    pub fn contains(&self, value: &ClipValue) -> bool {
        self.entries.iter().any(|entry| &entry.value == value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_count(&self) -> usize {
        self.max_count.get()
    }
}
