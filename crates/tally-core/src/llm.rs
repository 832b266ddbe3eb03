//! Injected LLM capability
//!
//! The core never talks to a provider directly. The outer reasoning loop and
//! the background span summarizer both go through this trait; implementations
//! live outside the crate.

use crate::error::CoreResult;
use crate::types::Message;
use async_trait::async_trait;

/// Capability for invoking an LLM with a prepared message list
#[async_trait]
pub trait LlmInvoke: Send + Sync {
    /// Send `messages` to `model` and return the completion text
    async fn invoke(&self, messages: &[Message], model: &str) -> CoreResult<String>;
}
