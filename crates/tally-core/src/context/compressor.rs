//! Compression strategies for conversation history
//!
//! Three strategies in increasing order of fidelity and cost: truncation,
//! importance-based extraction, and extraction plus background summarization.
//! Everything here is synchronous and LLM-free; the summarize strategy only
//! decides which span gets handed to the background summarizer.

use crate::context::accountant::TokenAccountant;
use crate::context::config::{ContextConfig, HighPressurePolicy};
use crate::types::{Importance, Message, truncate_utf8};

/// Compression strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionStrategy {
    /// Drop oldest non-critical messages until under budget
    Truncate,
    /// Partition by importance: drop Low, then Medium; placeholder High
    Extract,
    /// Extract synchronously, summarize the evicted span in the background
    Summarize,
}

/// Result of one compression pass
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    /// Strategy that ran
    pub strategy: CompressionStrategy,
    /// Token total before the pass
    pub tokens_before: usize,
    /// Token total after the pass
    pub tokens_after: usize,
    /// Messages removed from the live list
    pub messages_removed: usize,
    /// Messages rewritten to placeholders in place
    pub messages_placeholdered: usize,
    /// Removed messages in original order, for summarization
    pub evicted_span: Vec<Message>,
    /// Index in the compressed list where a summary of the span belongs
    pub splice_at: usize,
}

impl CompressionOutcome {
    /// Tokens reclaimed by this pass
    pub fn tokens_saved(&self) -> usize {
        self.tokens_before.saturating_sub(self.tokens_after)
    }

    /// Whether the pass changed anything
    pub fn changed(&self) -> bool {
        self.messages_removed > 0 || self.messages_placeholdered > 0
    }
}

/// Chooses and applies a compression strategy to a message history
///
/// Operates on cached per-message token counts; placeholder rewrites recount
/// through the accountant. Critical messages are never dropped, replaced, or
/// summarized, and a pass over an already-compressed history is a no-op.
#[derive(Debug, Clone)]
pub struct ContextCompressor {
    config: ContextConfig,
    accountant: TokenAccountant,
}

impl ContextCompressor {
    /// Create a new compressor
    pub fn new(config: ContextConfig) -> Self {
        Self {
            config,
            accountant: TokenAccountant::new(),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Pick a strategy for the current state, or `None` when under threshold
    pub fn select_strategy(
        &self,
        total_tokens: usize,
        message_count: usize,
        has_summarizer: bool,
    ) -> Option<CompressionStrategy> {
        if total_tokens <= self.config.threshold_tokens() {
            return None;
        }
        if message_count < self.config.summarization_threshold || !has_summarizer {
            Some(CompressionStrategy::Extract)
        } else {
            Some(CompressionStrategy::Summarize)
        }
    }

    /// Apply `strategy` to `messages` in place
    pub fn compress(
        &self,
        messages: &mut Vec<Message>,
        strategy: CompressionStrategy,
    ) -> CompressionOutcome {
        match strategy {
            CompressionStrategy::Truncate => self.truncate(messages),
            CompressionStrategy::Extract | CompressionStrategy::Summarize => {
                self.extract(messages, strategy)
            }
        }
    }

    /// Drop oldest non-critical messages until under budget
    fn truncate(&self, messages: &mut Vec<Message>) -> CompressionOutcome {
        let target = self.config.threshold_tokens();
        let tokens_before: usize = messages.iter().map(|m| m.token_count).sum();
        let mut total = tokens_before;

        let mut removed_indices = Vec::new();
        for (index, message) in messages.iter().enumerate() {
            if total <= target {
                break;
            }
            if !message.is_critical() {
                removed_indices.push(index);
                total -= message.token_count;
            }
        }

        let (evicted_span, splice_at) = self.take_removed(messages, &removed_indices);

        CompressionOutcome {
            strategy: CompressionStrategy::Truncate,
            tokens_before,
            tokens_after: total,
            messages_removed: evicted_span.len(),
            messages_placeholdered: 0,
            evicted_span,
            splice_at,
        }
    }

    /// Importance-partitioned eviction
    ///
    /// Low messages go first, oldest first; then Medium. High messages are
    /// only touched when the budget is still unmet: under the default policy
    /// they are rewritten to placeholders in place, and under
    /// `HighPressurePolicy::Summarize` (summarize strategy only) they join
    /// the evicted span instead.
    fn extract(
        &self,
        messages: &mut Vec<Message>,
        strategy: CompressionStrategy,
    ) -> CompressionOutcome {
        let target = self.config.threshold_tokens();
        let tokens_before: usize = messages.iter().map(|m| m.token_count).sum();
        let mut total = tokens_before;

        let mut removed_indices = Vec::new();
        for rank in [Importance::Low, Importance::Medium] {
            for (index, message) in messages.iter().enumerate() {
                if total <= target {
                    break;
                }
                if message.importance == rank {
                    removed_indices.push(index);
                    total -= message.token_count;
                }
            }
        }

        let summarize_high = strategy == CompressionStrategy::Summarize
            && self.config.high_pressure_policy == HighPressurePolicy::Summarize;

        let mut placeholdered = 0;
        if total > target && summarize_high {
            for (index, message) in messages.iter().enumerate() {
                if total <= target {
                    break;
                }
                if message.importance == Importance::High {
                    removed_indices.push(index);
                    total -= message.token_count;
                }
            }
        } else if total > target {
            for message in messages.iter_mut() {
                if total <= target {
                    break;
                }
                if message.importance != Importance::High || message.compressed {
                    continue;
                }
                if message.content.len() <= self.config.placeholder_prefix_chars {
                    continue;
                }
                let placeholder = format!(
                    "{}…",
                    truncate_utf8(&message.content, self.config.placeholder_prefix_chars)
                );
                let new_tokens = self.accountant.count(&placeholder, &self.config.model);
                total = total - message.token_count + new_tokens;
                message.content = placeholder;
                message.token_count = new_tokens;
                message.compressed = true;
                placeholdered += 1;
            }
        }

        removed_indices.sort_unstable();
        let (evicted_span, splice_at) = self.take_removed(messages, &removed_indices);

        if !evicted_span.is_empty() || placeholdered > 0 {
            tracing::debug!(
                removed = evicted_span.len(),
                placeholdered,
                tokens_before,
                tokens_after = total,
                "compressed conversation history"
            );
        }

        CompressionOutcome {
            strategy,
            tokens_before,
            tokens_after: total,
            messages_removed: evicted_span.len(),
            messages_placeholdered: placeholdered,
            evicted_span,
            splice_at,
        }
    }

    /// Remove `indices` (sorted) from `messages`, returning the removed
    /// messages in original order plus the index where they used to start
    fn take_removed(
        &self,
        messages: &mut Vec<Message>,
        indices: &[usize],
    ) -> (Vec<Message>, usize) {
        if indices.is_empty() {
            return (Vec::new(), messages.len());
        }

        let first = indices[0];
        let splice_at = first;

        let mut removed = Vec::with_capacity(indices.len());
        let mut cursor = 0;
        let mut kept = Vec::with_capacity(messages.len() - indices.len());
        for (index, message) in messages.drain(..).enumerate() {
            if cursor < indices.len() && indices[cursor] == index {
                removed.push(message);
                cursor += 1;
            } else {
                kept.push(message);
            }
        }
        *messages = kept;

        (removed, splice_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(importance: Importance, tokens: usize, label: &str) -> Message {
        Message::assistant(label)
            .with_importance(importance)
            .with_token_count(tokens)
    }

    fn compressor(max_tokens: usize) -> ContextCompressor {
        ContextCompressor::new(
            ContextConfig::new()
                .with_max_tokens(max_tokens)
                .with_threshold(0.8),
        )
    }

    #[test]
    fn test_select_strategy_under_threshold_is_noop() {
        let compressor = compressor(1000);
        assert_eq!(compressor.select_strategy(700, 10, true), None);
        assert_eq!(compressor.select_strategy(800, 10, true), None);
    }

    #[test]
    fn test_select_strategy_gates() {
        let compressor = ContextCompressor::new(
            ContextConfig::new()
                .with_max_tokens(1000)
                .with_threshold(0.8)
                .with_summarization_threshold(50),
        );

        // Few messages: extract even with a summarizer available
        assert_eq!(
            compressor.select_strategy(900, 10, true),
            Some(CompressionStrategy::Extract)
        );
        // Many messages but no summarizer: extract
        assert_eq!(
            compressor.select_strategy(900, 80, false),
            Some(CompressionStrategy::Extract)
        );
        // Many messages, summarizer configured: summarize
        assert_eq!(
            compressor.select_strategy(900, 80, true),
            Some(CompressionStrategy::Summarize)
        );
    }

    #[test]
    fn test_extract_drops_low_before_medium() {
        let compressor = compressor(1000);
        let mut messages = vec![
            msg(Importance::Medium, 300, "medium-old"),
            msg(Importance::Low, 300, "low-old"),
            msg(Importance::Medium, 300, "medium-new"),
            msg(Importance::Low, 200, "low-new"),
        ];

        // 1100 total, target 800: dropping the oldest Low suffices
        let outcome = compressor.compress(&mut messages, CompressionStrategy::Extract);

        assert_eq!(outcome.messages_removed, 1);
        assert_eq!(outcome.evicted_span[0].content, "low-old");
        assert!(messages.iter().any(|m| m.content == "medium-old"));
        assert_eq!(outcome.tokens_after, 800);
    }

    #[test]
    fn test_extract_falls_through_to_medium() {
        let compressor = compressor(1000);
        let mut messages = vec![
            msg(Importance::Medium, 400, "medium-old"),
            msg(Importance::Low, 200, "low"),
            msg(Importance::Medium, 400, "medium-new"),
            msg(Importance::High, 400, "high"),
        ];

        // 1400 total, target 800: Low (200) then oldest Medium (400)
        let outcome = compressor.compress(&mut messages, CompressionStrategy::Extract);

        assert_eq!(outcome.messages_removed, 2);
        assert_eq!(outcome.tokens_after, 800);
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["medium-new", "high"]);
    }

    #[test]
    fn test_critical_is_never_removed() {
        let compressor = compressor(100);
        let mut messages = vec![
            Message::system("pinned instructions").with_token_count(500),
            msg(Importance::Low, 500, "droppable"),
        ];

        let outcome = compressor.compress(&mut messages, CompressionStrategy::Extract);

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "pinned instructions");
        assert!(!messages[0].compressed);
        assert_eq!(outcome.messages_removed, 1);
    }

    #[test]
    fn test_high_gets_placeholder_under_pressure() {
        let compressor = ContextCompressor::new(
            ContextConfig::new().with_max_tokens(100).with_threshold(0.8),
        );
        let long_observation = "x".repeat(2000);
        let mut messages = vec![
            Message::tool(long_observation).with_token_count(600),
            msg(Importance::High, 50, "short-high"),
        ];

        let outcome = compressor.compress(&mut messages, CompressionStrategy::Extract);

        assert_eq!(outcome.messages_placeholdered, 1);
        assert!(messages[0].compressed);
        assert!(messages[0].content.ends_with('…'));
        assert!(messages[0].content.len() <= 204);
        // The short High message was not worth placeholdering
        assert!(!messages[1].compressed);
    }

    #[test]
    fn test_high_joins_span_under_summarize_policy() {
        let compressor = ContextCompressor::new(
            ContextConfig::new()
                .with_max_tokens(100)
                .with_threshold(0.8)
                .with_high_pressure_policy(HighPressurePolicy::Summarize),
        );
        let mut messages = vec![
            Message::tool("observation one").with_token_count(300),
            Message::system("keep").with_token_count(10),
        ];

        let outcome = compressor.compress(&mut messages, CompressionStrategy::Summarize);

        assert_eq!(outcome.messages_removed, 1);
        assert_eq!(outcome.evicted_span[0].content, "observation one");
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn test_truncate_drops_oldest_regardless_of_importance() {
        let compressor = compressor(1000);
        let mut messages = vec![
            msg(Importance::High, 400, "old-high"),
            msg(Importance::Low, 400, "mid-low"),
            msg(Importance::Medium, 400, "new-medium"),
        ];

        let outcome = compressor.compress(&mut messages, CompressionStrategy::Truncate);

        assert_eq!(outcome.messages_removed, 1);
        assert_eq!(outcome.evicted_span[0].content, "old-high");
        assert_eq!(outcome.tokens_after, 800);
    }

    #[test]
    fn test_compression_is_idempotent() {
        let compressor = compressor(1000);
        let mut messages = vec![
            msg(Importance::Low, 600, "low"),
            msg(Importance::Medium, 600, "medium"),
        ];

        let first = compressor.compress(&mut messages, CompressionStrategy::Extract);
        assert!(first.changed());

        let snapshot: Vec<String> = messages.iter().map(|m| m.content.clone()).collect();
        let second = compressor.compress(&mut messages, CompressionStrategy::Extract);

        assert!(!second.changed());
        let unchanged: Vec<String> = messages.iter().map(|m| m.content.clone()).collect();
        assert_eq!(snapshot, unchanged);
    }

    #[test]
    fn test_splice_at_points_where_span_was() {
        let compressor = compressor(1000);
        let mut messages = vec![
            Message::system("pinned").with_token_count(100),
            msg(Importance::Low, 600, "evicted"),
            msg(Importance::High, 600, "kept"),
        ];

        let outcome = compressor.compress(&mut messages, CompressionStrategy::Extract);

        // Span sat at index 1, after the pinned system message
        assert_eq!(outcome.splice_at, 1);
        assert_eq!(messages.len(), 2);
    }
}
