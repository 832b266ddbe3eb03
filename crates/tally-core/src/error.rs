//! Error types for the Tally core

use thiserror::Error;

/// Result type alias for Tally core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Main error type for the Tally core
///
/// Tool execution failures never surface through this type: they are carried
/// as values inside [`crate::tools::ToolExecutionResult`] so they can be
/// appended to a conversation like any other observation.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// LLM capability errors (summarization backend)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Cache errors
    #[error("Cache error: {0}")]
    Cache(String),

    /// Blob store errors
    #[error("Blob store error: {0}")]
    Blob(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation was cancelled
    #[error("Operation was cancelled")]
    Cancelled,

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

impl CoreError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a new LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(message.into())
    }

    /// Create a new cache error
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache(message.into())
    }

    /// Create a new blob store error
    pub fn blob(message: impl Into<String>) -> Self {
        Self::Blob(message.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(error: anyhow::Error) -> Self {
        Self::Other(error.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error.to_string())
    }
}
