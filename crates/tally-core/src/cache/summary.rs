//! Cached span summaries
//!
//! Summaries produced by the background summarizer are cached by a
//! fingerprint of the evicted span, so re-compressing an identical span never
//! pays for a second LLM call.

use crate::cache::ttl::TtlCache;
use crate::types::Message;
use sha2::{Digest, Sha256};

/// Deterministic fingerprint of a message span
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpanFingerprint(String);

impl SpanFingerprint {
    /// Fingerprint a span by role, content, and round of each message
    ///
    /// Message ids and timestamps are excluded so a logically identical span
    /// reproduces the same fingerprint across conversations.
    pub fn of_span(span: &[Message]) -> Self {
        let mut hasher = Sha256::new();
        for message in span {
            hasher.update([message.importance.eviction_rank()]);
            hasher.update(format!("{:?}", message.role).as_bytes());
            hasher.update([0]);
            hasher.update(message.content.as_bytes());
            hasher.update(message.round_id.to_le_bytes());
        }
        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        Self(hex)
    }

    /// The hex digest backing this fingerprint
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// TTL cache of span summaries keyed by [`SpanFingerprint`]
pub type SummaryCache = TtlCache<SpanFingerprint, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_spans_share_a_fingerprint() {
        let a = vec![Message::user("hello").with_round(1)];
        let b = vec![Message::user("hello").with_round(1)];

        // Different ids and timestamps, same semantic content
        assert_eq!(SpanFingerprint::of_span(&a), SpanFingerprint::of_span(&b));
    }

    #[test]
    fn test_fingerprint_changes_with_content_and_round() {
        let base = vec![Message::user("hello").with_round(1)];

        let other_content = vec![Message::user("goodbye").with_round(1)];
        assert_ne!(
            SpanFingerprint::of_span(&base),
            SpanFingerprint::of_span(&other_content)
        );

        let other_round = vec![Message::user("hello").with_round(2)];
        assert_ne!(
            SpanFingerprint::of_span(&base),
            SpanFingerprint::of_span(&other_round)
        );
    }
}
