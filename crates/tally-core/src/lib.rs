//! Tally core library
//!
//! The context-budget manager and tool-execution reliability layer of an LLM
//! agent pipeline: keeps conversations within a bounded token budget, decides
//! what to retain, compress, or summarize, and wraps side-effecting tool
//! calls with idempotent caching, timeouts, and retries.
//!
//! The LLM itself, tool bodies, and blob storage are injected capabilities;
//! this crate owns the accounting and the reliability guarantees around them.

pub mod blob;
pub mod cache;
pub mod context;
pub mod error;
pub mod llm;
pub mod tools;
pub mod types;

// Re-export commonly used types
pub use blob::{BlobRef, BlobStore, MemoryBlobStore};
pub use cache::{IdempotencyCache, IdempotencyKey, SummaryCache, TtlCache, TtlCacheConfig};
pub use context::{
    ContextConfig, ConversationContext, ConversationPool, SummaryPoolConfig, SummaryWorkerPool,
};
pub use error::{CoreError, CoreResult};
pub use llm::LlmInvoke;
pub use tools::{
    CachePolicy, PermissionLevel, RetryConfig, ToolError, ToolErrorKind, ToolExecutionResult,
    ToolInvocationRequest, ToolReliabilityLayer,
};
pub use types::{Importance, Message, MessageRole};
