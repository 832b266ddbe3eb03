//! Core message types shared across the crate

use crate::blob::BlobRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instructions and synthetic markers (summaries)
    System,
    /// End-user input
    User,
    /// Model output
    Assistant,
    /// Tool observation
    Tool,
}

/// Importance tag controlling how a message is treated under compression
///
/// `Critical` messages are never dropped, replaced, or summarized.
/// `High` is the default for tool observations; `Low` and `Medium` messages
/// are the first candidates for eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Critical,
    High,
    Medium,
    Low,
}

impl Importance {
    /// Eviction order: lower rank is evicted first
    pub fn eviction_rank(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }
}

/// A single conversation message
///
/// Messages are owned by a [`crate::context::ConversationContext`] and are
/// immutable once appended, except for the compression annotation: placeholder
/// substitution rewrites `content` and sets `compressed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id
    pub id: Uuid,
    /// Message role
    pub role: MessageRole,
    /// Message text
    pub content: String,
    /// Compression importance tag
    pub importance: Importance,
    /// Cached token count, filled in at append time when zero
    pub token_count: usize,
    /// Conversation round that produced this message
    pub round_id: u64,
    /// Creation timestamp
    pub timestamp: DateTime<Utc>,
    /// Whether this message was rewritten by compression
    pub compressed: bool,
    /// Reference to an offloaded oversized observation, if any
    pub blob_ref: Option<BlobRef>,
}

impl Message {
    /// Create a new message
    pub fn new(role: MessageRole, content: impl Into<String>, importance: Importance) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            importance,
            token_count: 0,
            round_id: 0,
            timestamp: Utc::now(),
            compressed: false,
            blob_ref: None,
        }
    }

    /// Create a system message (defaults to `Critical`)
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content, Importance::Critical)
    }

    /// Create a user message (defaults to `High`)
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content, Importance::High)
    }

    /// Create an assistant message (defaults to `Medium`)
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content, Importance::Medium)
    }

    /// Create a tool observation message (defaults to `High`)
    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Tool, content, Importance::High)
    }

    /// Override the importance tag
    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = importance;
        self
    }

    /// Set the round id
    pub fn with_round(mut self, round_id: u64) -> Self {
        self.round_id = round_id;
        self
    }

    /// Pre-set the cached token count (skips recounting at append)
    pub fn with_token_count(mut self, tokens: usize) -> Self {
        self.token_count = tokens;
        self
    }

    /// Attach a blob reference
    pub fn with_blob_ref(mut self, blob_ref: BlobRef) -> Self {
        self.blob_ref = Some(blob_ref);
        self
    }

    /// Whether this message must survive compression untouched
    pub fn is_critical(&self) -> bool {
        self.importance == Importance::Critical
    }
}

/// Render a JSON value for display in logs and call previews
///
/// Dispatches over the tagged variants of [`serde_json::Value`]: scalars are
/// printed directly, sequences and mappings are rendered with bounded depth
/// and sorted keys so output is deterministic.
pub fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => {
            if s.len() > 64 {
                format!("\"{}…\"", truncate_utf8(s, 64))
            } else {
                format!("\"{}\"", s)
            }
        }
        serde_json::Value::Array(items) => {
            let rendered: Vec<String> = items.iter().take(8).map(format_value).collect();
            if items.len() > 8 {
                format!("[{}, …{} more]", rendered.join(", "), items.len() - 8)
            } else {
                format!("[{}]", rendered.join(", "))
            }
        }
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let rendered: Vec<String> = keys
                .iter()
                .take(8)
                .map(|k| format!("{}: {}", k, format_value(&map[k.as_str()])))
                .collect();
            if keys.len() > 8 {
                format!("{{{}, …{} more}}", rendered.join(", "), keys.len() - 8)
            } else {
                format!("{{{}}}", rendered.join(", "))
            }
        }
    }
}

/// Truncate a string to at most `max` bytes without splitting a character
pub fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
