//! Bounded pool of live conversations
//!
//! Conversation state (and its lock) is handed out from an LRU-evicted pool
//! keyed by conversation id, so abandoned conversations cannot grow the map
//! forever. Eviction cancels the conversation, which also discards any
//! background summaries it still has pending. Every conversation's token is
//! a child of the pool's root token, so one cancel shuts everything down.

use crate::context::config::ContextConfig;
use crate::context::conversation::ConversationContext;
use crate::context::summarizer::SummaryWorkerPool;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// LRU-evicted registry of conversations
pub struct ConversationPool {
    config: ContextConfig,
    summaries: Option<Arc<SummaryWorkerPool>>,
    root: CancellationToken,
    conversations: Mutex<LruCache<String, ConversationContext>>,
}

impl ConversationPool {
    /// Create a pool holding at most `capacity` live conversations
    pub fn new(capacity: usize, config: ContextConfig) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            summaries: None,
            root: CancellationToken::new(),
            conversations: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Attach a summary pool; new conversations get the summarize strategy
    pub fn with_summaries(mut self, pool: Arc<SummaryWorkerPool>) -> Self {
        self.summaries = Some(pool);
        self
    }

    /// Fetch a conversation, creating it when absent
    ///
    /// Creation may evict the least-recently-used conversation; the evicted
    /// one is cancelled so orphaned background work dies with it.
    pub fn get_or_create(&self, id: &str) -> ConversationContext {
        let mut conversations = self.conversations.lock();
        if let Some(existing) = conversations.get(id) {
            return existing.clone();
        }

        let created = ConversationContext::build(
            id,
            self.config.clone(),
            self.summaries.clone(),
            Some(&self.root),
        );
        if let Some((evicted_id, evicted)) = conversations.push(id.to_string(), created.clone()) {
            if evicted_id != id {
                tracing::warn!(conversation = %evicted_id, "evicting least-recently-used conversation");
                evicted.cancel();
            }
        }
        created
    }

    /// Fetch a conversation without creating one
    pub fn get(&self, id: &str) -> Option<ConversationContext> {
        self.conversations.lock().get(id).cloned()
    }

    /// Remove and cancel a conversation
    pub fn remove(&self, id: &str) -> bool {
        match self.conversations.lock().pop(id) {
            Some(conversation) => {
                conversation.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of live conversations
    pub fn len(&self) -> usize {
        self.conversations.lock().len()
    }

    /// Whether the pool holds no conversations
    pub fn is_empty(&self) -> bool {
        self.conversations.lock().is_empty()
    }

    /// Root token; cancelling it cancels every conversation
    pub fn root_token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Cancel every conversation in the pool
    pub fn shutdown(&self) {
        self.root.cancel();
    }
}
