use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use crate::{ClipValue, Fingerprint};

/// Upper bound on remembered marks; the window normally expires them first.
const MAX_MARKS: usize = 64;

#[derive(Debug, Clone)]
struct Mark {
    fingerprint: Fingerprint,
    marked_at: Instant,
}

/// Remembers values this process just sent or applied, so their echo from the
/// clipboard or the multicast group is not treated as a fresh change.
///
/// Marks expire by age only; checking a value does not consume its mark, so
/// repeated echoes inside the window are all suppressed.
#[derive(Debug, Clone)]
pub struct LoopGuard {
    window: Duration,
    marks: VecDeque<Mark>,
}

impl LoopGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            marks: VecDeque::new(),
        }
    }

    pub fn mark_outgoing(&mut self, value: &ClipValue) {
        self.mark_outgoing_at(value, Instant::now());
    }

    pub fn mark_outgoing_at(&mut self, value: &ClipValue, now: Instant) {
        let window = self.window;
        self.marks
            .retain(|mark| now.saturating_duration_since(mark.marked_at) < window);

        let fingerprint = value.fingerprint();
        self.marks.retain(|mark| mark.fingerprint != fingerprint);
        self.marks.push_back(Mark {
            fingerprint,
            marked_at: now,
        });

        while self.marks.len() > MAX_MARKS {
            self.marks.pop_front();
        }
    }

    pub fn is_self_echo(&self, value: &ClipValue) -> bool {
        self.is_self_echo_at(value, Instant::now())
    }

    pub fn is_self_echo_at(&self, value: &ClipValue, now: Instant) -> bool {
        let fingerprint = value.fingerprint();
        self.marks.iter().any(|mark| {
            mark.fingerprint == fingerprint
                && now.saturating_duration_since(mark.marked_at) < self.window
        })
    }

    /// Number of marks still inside the window at `now`.
    pub fn active_marks_at(&self, now: Instant) -> usize {
        self.marks
            .iter()
            .filter(|mark| now.saturating_duration_since(mark.marked_at) < self.window)
            .count()
    }
}

impl Default for LoopGuard {
    fn default() -> Self {
        Self::new(crate::DEFAULT_ECHO_WINDOW)
    }
}
