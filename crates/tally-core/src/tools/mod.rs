//! Reliable tool execution
//!
//! Requests, the failure taxonomy, retry/backoff policy, and the reliability
//! layer that ties them to the idempotency cache.

pub mod reliability;
pub mod retry;
pub mod types;

pub use reliability::{BoxedExec, InvokeStats, ReliabilityConfig, ToolReliabilityLayer};
pub use retry::RetryConfig;
pub use types::{
    CachePolicy, PermissionLevel, RESULT_SCHEMA_VERSION, ToolError, ToolErrorKind,
    ToolExecutionResult, ToolInvocationRequest,
};
