//! Context management configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How High-importance messages are treated when dropping Low and Medium
/// messages was not enough
///
/// Source behavior is ambiguous here, so it is a knob rather than a baked-in
/// choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighPressurePolicy {
    /// Rewrite High messages to a deterministic placeholder in place
    #[default]
    Placeholder,
    /// Allow High messages into the evicted span handed to the summarizer
    Summarize,
}

/// Configuration for conversation budgeting and compression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Maximum tokens a conversation snapshot may occupy
    pub max_tokens: usize,

    /// Fraction of `max_tokens` at which compression triggers (0–1)
    pub compression_threshold: f32,

    /// Minimum live message count before the summarize strategy is preferred
    /// over plain extraction
    pub summarization_threshold: usize,

    /// Model name used for token accounting
    pub model: String,

    /// Treatment of High messages under extreme pressure
    pub high_pressure_policy: HighPressurePolicy,

    /// Characters kept when a message is placeholder-replaced
    pub placeholder_prefix_chars: usize,

    /// TTL for cached span summaries
    #[serde(with = "humantime_serde")]
    pub summary_ttl: Duration,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: 128_000,
            compression_threshold: 0.8,
            summarization_threshold: 50,
            model: String::new(),
            high_pressure_policy: HighPressurePolicy::default(),
            placeholder_prefix_chars: 200,
            summary_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl ContextConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the token budget
    pub fn with_max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = max;
        self
    }

    /// Set the compression trigger fraction
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.compression_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set the summarization message-count gate
    pub fn with_summarization_threshold(mut self, count: usize) -> Self {
        self.summarization_threshold = count;
        self
    }

    /// Set the accounting model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the high-pressure policy
    pub fn with_high_pressure_policy(mut self, policy: HighPressurePolicy) -> Self {
        self.high_pressure_policy = policy;
        self
    }

    /// Tokens at which compression triggers
    pub fn threshold_tokens(&self) -> usize {
        let result = self.max_tokens as f32 * self.compression_threshold;
        if result.is_finite() && result >= 0.0 {
            result as usize
        } else {
            0
        }
    }
}
