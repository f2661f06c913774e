use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub mod history;
pub mod loop_guard;

pub use history::{ClipOrigin, HistoryEntry, HistoryStore, RecordOutcome};
pub use loop_guard::LoopGuard;

/// Largest clip that fits in one untagged UDP datagram on a 1500-byte MTU.
pub const MAX_DATAGRAM_BYTES: usize = 1472;
pub const DEFAULT_MULTICAST_ADDRESS: &str = "226.38.254.7";
pub const DEFAULT_PORT: u16 = 10000;
pub const DEFAULT_MAX_HISTORY_COUNT: usize = 15;
pub const DEFAULT_DISPLAY_WIDTH: usize = 30;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_ECHO_WINDOW: Duration = Duration::from_secs(2);

const FINGERPRINT_HEX_BYTES: usize = 8;

pub type Fingerprint = [u8; 32];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("clip is empty")]
    EmptyClip,
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("payload of {len} bytes exceeds datagram budget of {max} bytes")]
    OversizedPayload { len: usize, max: usize },
}

/// One clipboard snapshot. Compared by exact content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ClipValue(String);

impl ClipValue {
    pub fn new(text: impl Into<String>) -> Result<Self, CoreError> {
        let text = text.into();
        if text.is_empty() {
            return Err(CoreError::EmptyClip);
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn byte_len(&self) -> usize {
        self.0.len()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Sha256::digest(self.0.as_bytes()).into()
    }

    /// Short hex digest used in log lines instead of the clip itself.
    pub fn fingerprint_hex(&self) -> String {
        hex::encode(&self.fingerprint()[..FINGERPRINT_HEX_BYTES])
    }

    /// Single-line presentation label of at most `width_limit` characters.
    ///
    /// Line breaks become spaces and surrounding whitespace is dropped before
    /// the cut. The stored value is untouched.
    pub fn label(&self, width_limit: usize) -> String {
        let flattened = self.0.replace(['\r', '\n'], " ");
        flattened.trim().chars().take(width_limit).collect()
    }
}

impl std::fmt::Display for ClipValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<clip {} ({} bytes)>", self.fingerprint_hex(), self.byte_len())
    }
}

pub fn encode_datagram(value: &ClipValue) -> Result<Bytes, CoreError> {
    let len = value.byte_len();
    if len > MAX_DATAGRAM_BYTES {
        return Err(CoreError::OversizedPayload {
            len,
            max: MAX_DATAGRAM_BYTES,
        });
    }
    Ok(Bytes::copy_from_slice(value.as_str().as_bytes()))
}

pub fn decode_datagram(payload: &[u8]) -> Result<ClipValue, CoreError> {
    if payload.is_empty() {
        return Err(CoreError::MalformedPayload("empty datagram".to_owned()));
    }
    if payload.len() > MAX_DATAGRAM_BYTES {
        return Err(CoreError::OversizedPayload {
            len: payload.len(),
            max: MAX_DATAGRAM_BYTES,
        });
    }

    let text = std::str::from_utf8(payload)
        .map_err(|err| CoreError::MalformedPayload(err.to_string()))?;
    ClipValue::new(text)
}

pub fn now_unix_ms() -> u64 {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0));
    duration.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(text: &str) -> ClipValue {
        ClipValue::new(text).unwrap()
    }

    #[test]
    fn empty_clip_is_rejected() {
        assert_eq!(ClipValue::new(""), Err(CoreError::EmptyClip));
    }

    #[test]
    fn datagram_carries_raw_text() {
        let encoded = encode_datagram(&clip("hello netclip")).unwrap();
        assert_eq!(&encoded[..], b"hello netclip");
        assert_eq!(decode_datagram(&encoded).unwrap(), clip("hello netclip"));
    }

    #[test]
    fn oversized_clip_is_refused_at_send() {
        let big = clip(&"x".repeat(MAX_DATAGRAM_BYTES + 1));
        let err = encode_datagram(&big).unwrap_err();
        assert_eq!(
            err,
            CoreError::OversizedPayload {
                len: MAX_DATAGRAM_BYTES + 1,
                max: MAX_DATAGRAM_BYTES,
            }
        );

        let exact = clip(&"x".repeat(MAX_DATAGRAM_BYTES));
        assert!(encode_datagram(&exact).is_ok());
    }

    #[test]
    fn malformed_datagrams_are_rejected() {
        assert!(matches!(
            decode_datagram(b""),
            Err(CoreError::MalformedPayload(_))
        ));
        assert!(matches!(
            decode_datagram(&[0xFF, 0xFE, 0x00]),
            Err(CoreError::MalformedPayload(_))
        ));
        assert!(matches!(
            decode_datagram(&vec![b'a'; MAX_DATAGRAM_BYTES + 10]),
            Err(CoreError::OversizedPayload { .. })
        ));
    }

    #[test]
    fn label_truncates_to_width_without_touching_value() {
        let text: String = ('a'..='z').cycle().take(50).collect();
        let value = clip(&text);
        let label = value.label(30);
        assert_eq!(label.chars().count(), 30);
        assert_eq!(label, text[..30]);
        assert_eq!(value.as_str(), text);
    }

    #[test]
    fn label_flattens_line_breaks() {
        let value = clip("  first line\r\nsecond\n");
        assert_eq!(value.label(30), "first line  second");
    }

    #[test]
    fn label_counts_characters_not_bytes() {
        let value = clip("ééééé");
        assert_eq!(value.label(3), "ééé");
    }

    #[test]
    fn fingerprint_is_stable_and_distinct() {
        assert_eq!(clip("a").fingerprint(), clip("a").fingerprint());
        assert_ne!(clip("a").fingerprint(), clip("b").fingerprint());
        assert_eq!(clip("a").fingerprint_hex().len(), FINGERPRINT_HEX_BYTES * 2);
    }

    #[test]
    fn clip_serializes_as_plain_string() {
        let json = serde_json::to_string(&clip("hi")).unwrap();
        assert_eq!(json, "\"hi\"");
    }
}
