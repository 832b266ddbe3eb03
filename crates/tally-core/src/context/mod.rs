//! Conversation context management
//!
//! Keeps a multi-turn conversation within a bounded token budget:
//!
//! - Token accounting with per-tokenizer-family safety margins
//! - Importance-based compression (truncate, extract, summarize)
//! - Non-blocking background summarization of evicted spans
//! - A bounded, LRU-evicted pool of live conversations
//!
//! # Example
//!
//! ```rust,ignore
//! use tally_core::context::{ContextConfig, ConversationContext};
//! use tally_core::types::Message;
//!
//! let config = ContextConfig::new().with_max_tokens(5_000).with_threshold(0.8);
//! let conversation = ConversationContext::new("conv-1", config);
//!
//! conversation.append(Message::user("hello"));
//! let snapshot = conversation.snapshot();
//! ```

pub mod accountant;
pub mod compressor;
pub mod config;
pub mod conversation;
pub mod pool;
pub mod summarizer;

pub use accountant::{TokenAccountant, TokenizerFamily};
pub use compressor::{CompressionOutcome, CompressionStrategy, ContextCompressor};
pub use config::{ContextConfig, HighPressurePolicy};
pub use conversation::{
    AppendReport, CompressionStats, ContextStatus, ContextUsageStats, ConversationContext,
    ConversationCore,
};
pub use pool::ConversationPool;
pub use summarizer::{
    LlmSpanSummarizer, SpanSummarizer, SummaryJob, SummaryPoolConfig, SummaryWorkerPool,
};
