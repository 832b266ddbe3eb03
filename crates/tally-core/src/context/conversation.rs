//! Conversation context orchestration
//!
//! Tracks the running token total for one conversation, triggers compression
//! when an append crosses the threshold, and exposes the live message list
//! for the reasoning loop. Appends from parallel tool completions serialize
//! on the conversation's internal lock, so accounting and compression stay
//! atomic; messages land in completion order, not issue order.

use crate::cache::SpanFingerprint;
use crate::context::accountant::TokenAccountant;
use crate::context::compressor::{CompressionOutcome, CompressionStrategy, ContextCompressor};
use crate::context::config::ContextConfig;
use crate::context::summarizer::{SummaryJob, SummaryWorkerPool};
use crate::tools::types::ToolExecutionResult;
use crate::types::{Importance, Message, MessageRole};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Conversation lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStatus {
    /// Accepting appends
    Active,
    /// A compression pass is running
    Compressing,
}

/// Aggregate compression statistics for one conversation
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressionStats {
    /// Number of compression passes that changed anything
    pub events: u64,
    /// Total tokens reclaimed across all passes
    pub tokens_saved: usize,
    /// Fraction of pre-compression tokens reclaimed (0–1)
    pub rate: f32,
    /// Summaries spliced back by the background pool
    pub summaries_spliced: u64,
}

/// Context usage report
#[derive(Debug, Clone, Copy)]
pub struct ContextUsageStats {
    /// Current token total
    pub current_tokens: usize,
    /// Token budget
    pub max_tokens: usize,
    /// Compression trigger point
    pub threshold_tokens: usize,
    /// Usage as a percentage of the budget
    pub usage_percentage: f32,
    /// Live message count
    pub messages_count: usize,
    /// Whether the next append is likely to trigger compression
    pub is_over_threshold: bool,
}

/// Outcome of one append
#[derive(Debug, Clone)]
pub struct AppendReport {
    /// Tokens charged for the appended message
    pub token_count: usize,
    /// Token total after the append (and compression, if any)
    pub total_tokens: usize,
    /// Compression pass triggered by this append, if any
    pub compression: Option<CompressionOutcome>,
}

#[derive(Debug, Default)]
struct Inner {
    messages: Vec<Message>,
    total_tokens: usize,
    round: u64,
    compressing: bool,
    events: u64,
    tokens_saved: usize,
    tokens_before_sum: usize,
    summaries_spliced: u64,
}

/// Shared state of one conversation
///
/// Held behind an `Arc` so background summary jobs can keep a `Weak` handle:
/// a conversation that has been dropped or evicted silently discards its
/// pending summaries.
pub struct ConversationCore {
    id: String,
    config: ContextConfig,
    accountant: TokenAccountant,
    compressor: ContextCompressor,
    summaries: Option<Arc<SummaryWorkerPool>>,
    cancel: CancellationToken,
    inner: Mutex<Inner>,
}

impl ConversationCore {
    /// Splice a completed span summary back in as one synthetic message
    ///
    /// Called from the summary workers; a no-op once the conversation is
    /// cancelled.
    pub(crate) fn splice_summary(&self, splice_at: usize, summary: String, span_len: usize) {
        if self.cancel.is_cancelled() {
            return;
        }

        let mut message = Message::new(
            MessageRole::System,
            format!("[Summary of {} earlier messages]\n{}", span_len, summary),
            Importance::High,
        );
        message.compressed = true;
        message.token_count = self.accountant.count_message(&message, &self.config.model);

        let mut inner = self.inner.lock();
        let at = splice_at.min(inner.messages.len());
        inner.total_tokens += message.token_count;
        inner.messages.insert(at, message);
        inner.summaries_spliced += 1;
        tracing::debug!(conversation = %self.id, span_len, "spliced summary into history");
    }
}

/// Orchestrator for one conversation's budget and history
#[derive(Clone)]
pub struct ConversationContext {
    core: Arc<ConversationCore>,
}

impl ConversationContext {
    /// Create a conversation without background summarization
    pub fn new(id: impl Into<String>, config: ContextConfig) -> Self {
        Self::build(id, config, None, None)
    }

    /// Create a conversation with a summary pool for the summarize strategy
    pub fn with_summarization(
        id: impl Into<String>,
        config: ContextConfig,
        pool: Arc<SummaryWorkerPool>,
    ) -> Self {
        Self::build(id, config, Some(pool), None)
    }

    pub(crate) fn build(
        id: impl Into<String>,
        config: ContextConfig,
        summaries: Option<Arc<SummaryWorkerPool>>,
        parent: Option<&CancellationToken>,
    ) -> Self {
        let cancel = match parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let core = ConversationCore {
            id: id.into(),
            compressor: ContextCompressor::new(config.clone()),
            config,
            accountant: TokenAccountant::new(),
            summaries,
            cancel,
            inner: Mutex::new(Inner {
                round: 1,
                ..Inner::default()
            }),
        };
        Self {
            core: Arc::new(core),
        }
    }

    /// Conversation id
    pub fn id(&self) -> &str {
        &self.core.id
    }

    /// The configuration
    pub fn config(&self) -> &ContextConfig {
        &self.core.config
    }

    /// Append a message, compressing when the threshold is crossed
    ///
    /// A message arriving with a non-zero `token_count` keeps it; otherwise
    /// the accountant fills it in. Messages with `round_id` 0 are stamped
    /// with the current round.
    pub fn append(&self, mut message: Message) -> AppendReport {
        let core = &self.core;
        let mut inner = core.inner.lock();

        if message.token_count == 0 {
            message.token_count = core.accountant.count_message(&message, &core.config.model);
        }
        if message.round_id == 0 {
            message.round_id = inner.round;
        }
        let token_count = message.token_count;
        inner.total_tokens += token_count;
        inner.messages.push(message);

        let mut compression = None;
        let has_summarizer = core.summaries.is_some();
        if let Some(strategy) = core.compressor.select_strategy(
            inner.total_tokens,
            inner.messages.len(),
            has_summarizer,
        ) {
            inner.compressing = true;
            let outcome = core.compressor.compress(&mut inner.messages, strategy);
            inner.total_tokens = inner.messages.iter().map(|m| m.token_count).sum();
            if outcome.changed() {
                inner.events += 1;
                inner.tokens_saved += outcome.tokens_saved();
                inner.tokens_before_sum += outcome.tokens_before;
            }
            inner.compressing = false;
            compression = Some(outcome);
        }

        let total_tokens = inner.total_tokens;
        drop(inner);

        if let Some(outcome) = &compression {
            self.maybe_enqueue_summary(outcome);
        }

        AppendReport {
            token_count,
            total_tokens,
            compression,
        }
    }

    /// Convert a tool result and append it under the current round
    pub fn append_tool_result(&self, result: ToolExecutionResult) -> AppendReport {
        let round = self.core.inner.lock().round;
        self.append(result.into_message(round))
    }

    fn maybe_enqueue_summary(&self, outcome: &CompressionOutcome) {
        if outcome.strategy != CompressionStrategy::Summarize || outcome.evicted_span.is_empty() {
            return;
        }
        let Some(pool) = &self.core.summaries else {
            return;
        };

        let job = SummaryJob {
            fingerprint: SpanFingerprint::of_span(&outcome.evicted_span),
            span: outcome.evicted_span.clone(),
            splice_at: outcome.splice_at,
            conversation: Arc::downgrade(&self.core),
            cancel: self.core.cancel.clone(),
        };
        pool.enqueue(job);
    }

    /// The live ordered message list for submission to the reasoning loop
    pub fn snapshot(&self) -> Vec<Message> {
        self.core.inner.lock().messages.clone()
    }

    /// Current token total
    pub fn current_total_tokens(&self) -> usize {
        self.core.inner.lock().total_tokens
    }

    /// Live message count
    pub fn len(&self) -> usize {
        self.core.inner.lock().messages.len()
    }

    /// Whether the conversation has no messages
    pub fn is_empty(&self) -> bool {
        self.core.inner.lock().messages.is_empty()
    }

    /// Lifecycle state
    pub fn status(&self) -> ContextStatus {
        if self.core.inner.lock().compressing {
            ContextStatus::Compressing
        } else {
            ContextStatus::Active
        }
    }

    /// Current round id
    pub fn round(&self) -> u64 {
        self.core.inner.lock().round
    }

    /// Start the next round, returning its id
    pub fn advance_round(&self) -> u64 {
        let mut inner = self.core.inner.lock();
        inner.round += 1;
        inner.round
    }

    /// Aggregate compression statistics
    pub fn compression_stats(&self) -> CompressionStats {
        let inner = self.core.inner.lock();
        let rate = if inner.tokens_before_sum == 0 {
            0.0
        } else {
            inner.tokens_saved as f32 / inner.tokens_before_sum as f32
        };
        CompressionStats {
            events: inner.events,
            tokens_saved: inner.tokens_saved,
            rate,
            summaries_spliced: inner.summaries_spliced,
        }
    }

    /// Usage report against the budget
    pub fn usage_stats(&self) -> ContextUsageStats {
        let inner = self.core.inner.lock();
        let max_tokens = self.core.config.max_tokens;
        let threshold_tokens = self.core.config.threshold_tokens();
        ContextUsageStats {
            current_tokens: inner.total_tokens,
            max_tokens,
            threshold_tokens,
            usage_percentage: if max_tokens == 0 {
                0.0
            } else {
                inner.total_tokens as f32 / max_tokens as f32 * 100.0
            },
            messages_count: inner.messages.len(),
            is_over_threshold: inner.total_tokens > threshold_tokens,
        }
    }

    /// Token for aborting waits on this conversation's in-flight tool calls
    pub fn cancellation_token(&self) -> CancellationToken {
        self.core.cancel.clone()
    }

    /// Cancel the conversation: aborts in-flight waits and discards pending
    /// background summaries. Already-started side effects are not undone.
    pub fn cancel(&self) {
        self.core.cancel.cancel();
    }
}
