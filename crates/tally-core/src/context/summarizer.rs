//! Background span summarization
//!
//! The summarize strategy never blocks its caller: the compressor evicts a
//! span synchronously and hands it to this bounded worker pool. Workers check
//! the summary cache by span fingerprint, call the injected LLM only on a
//! miss, and splice the summary back into the owning conversation if it is
//! still live. All of it is best-effort: a failure leaves the extraction
//! result standing.

use crate::cache::{SpanFingerprint, SummaryCache};
use crate::context::conversation::ConversationCore;
use crate::error::CoreResult;
use crate::llm::LlmInvoke;
use crate::types::{Message, MessageRole, truncate_utf8};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Capability for condensing an evicted message span
#[async_trait]
pub trait SpanSummarizer: Send + Sync {
    /// Produce a summary of `span`
    async fn summarize(&self, span: &[Message]) -> CoreResult<String>;
}

/// [`SpanSummarizer`] backed by an injected LLM
pub struct LlmSpanSummarizer {
    llm: Arc<dyn LlmInvoke>,
    model: String,
    max_summary_tokens: usize,
}

impl LlmSpanSummarizer {
    /// Create a summarizer using `model`
    pub fn new(llm: Arc<dyn LlmInvoke>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
            max_summary_tokens: 500,
        }
    }

    /// Set the summary length budget mentioned in the prompt
    pub fn with_max_summary_tokens(mut self, max: usize) -> Self {
        self.max_summary_tokens = max;
        self
    }

    fn build_prompt(&self, span: &[Message]) -> String {
        let conversation = span
            .iter()
            .map(|m| {
                let role = match m.role {
                    MessageRole::User => "USER",
                    MessageRole::Assistant => "ASSISTANT",
                    MessageRole::Tool => "TOOL",
                    MessageRole::System => "SYSTEM",
                };
                format!("{}: {}", role, truncate_utf8(&m.content, 500))
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            r#"Please summarize the following conversation excerpt concisely, preserving:

1. Key decisions and outcomes
2. Important tool results and findings
3. Current task context and progress
4. Any critical errors or warnings encountered

Be concise but comprehensive. Focus on information needed to continue the conversation effectively.

Maximum summary length: {} tokens.

---
EXCERPT TO SUMMARIZE:
{}
---

Provide a structured summary:"#,
            self.max_summary_tokens, conversation
        )
    }
}

#[async_trait]
impl SpanSummarizer for LlmSpanSummarizer {
    async fn summarize(&self, span: &[Message]) -> CoreResult<String> {
        let prompt = self.build_prompt(span);
        let request = vec![Message::user(prompt)];
        self.llm.invoke(&request, &self.model).await
    }
}

/// One span waiting to be summarized
pub struct SummaryJob {
    /// Fingerprint of the span, the cache key
    pub fingerprint: SpanFingerprint,
    /// The evicted messages, original order
    pub span: Vec<Message>,
    /// Where in the live list the summary belongs
    pub splice_at: usize,
    /// Owning conversation; a dead handle discards the job
    pub conversation: Weak<ConversationCore>,
    /// Conversation cancellation token
    pub cancel: CancellationToken,
}

/// Configuration for the summary worker pool
#[derive(Debug, Clone)]
pub struct SummaryPoolConfig {
    /// Number of worker tasks
    pub workers: usize,
    /// Queued jobs before enqueue starts dropping
    pub queue_capacity: usize,
    /// TTL for cached summaries
    pub summary_ttl: Duration,
}

impl Default for SummaryPoolConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 32,
            summary_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Bounded worker pool consuming [`SummaryJob`]s
///
/// Replaces fire-and-forget spawning: the queue is bounded, workers are
/// counted, and shutdown is a token cancel away.
pub struct SummaryWorkerPool {
    tx: mpsc::Sender<SummaryJob>,
    cache: Arc<SummaryCache>,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SummaryWorkerPool {
    /// Spawn `config.workers` workers around `summarizer`
    pub fn new(
        config: SummaryPoolConfig,
        summarizer: Arc<dyn SpanSummarizer>,
        cache: Arc<SummaryCache>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let shutdown = CancellationToken::new();
        let in_flight: Arc<DashMap<String, ()>> = Arc::new(DashMap::new());

        let mut handles = Vec::with_capacity(config.workers.max(1));
        for _ in 0..config.workers.max(1) {
            let rx = Arc::clone(&rx);
            let summarizer = Arc::clone(&summarizer);
            let cache = Arc::clone(&cache);
            let shutdown = shutdown.clone();
            let in_flight = Arc::clone(&in_flight);
            let ttl = config.summary_ttl;
            handles.push(tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = rx.lock().await;
                        tokio::select! {
                            _ = shutdown.cancelled() => return,
                            job = rx.recv() => job,
                        }
                    };
                    match job {
                        Some(job) => {
                            Self::process(job, &summarizer, &cache, &in_flight, ttl).await
                        }
                        None => return,
                    }
                }
            }));
        }

        Arc::new(Self {
            tx,
            cache,
            shutdown,
            handles: Mutex::new(handles),
        })
    }

    /// Enqueue a job; returns false when the queue is full or shut down
    pub fn enqueue(&self, job: SummaryJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "summary queue full, dropping span summarization");
                false
            }
        }
    }

    /// The summary cache backing this pool
    pub fn cache(&self) -> &Arc<SummaryCache> {
        &self.cache
    }

    /// Stop all workers
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Abort handles still running after shutdown
    pub fn abort_workers(&self) {
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }

    async fn process(
        job: SummaryJob,
        summarizer: &Arc<dyn SpanSummarizer>,
        cache: &Arc<SummaryCache>,
        in_flight: &Arc<DashMap<String, ()>>,
        ttl: Duration,
    ) {
        if job.cancel.is_cancelled() {
            tracing::debug!("discarding summary job for cancelled conversation");
            return;
        }

        let fp_key = job.fingerprint.as_str().to_string();
        if in_flight.insert(fp_key.clone(), ()).is_some() {
            return;
        }

        let summary = match cache.get(&job.fingerprint) {
            Some(cached) => cached,
            None => match summarizer.summarize(&job.span).await {
                Ok(summary) => {
                    cache.set(job.fingerprint.clone(), summary.clone(), ttl);
                    summary
                }
                Err(err) => {
                    tracing::warn!(error = %err, "span summarization failed, keeping extract result");
                    in_flight.remove(&fp_key);
                    return;
                }
            },
        };

        match job.conversation.upgrade() {
            Some(core) => core.splice_summary(job.splice_at, summary, job.span.len()),
            None => tracing::debug!("conversation dropped before summary completed"),
        }

        in_flight.remove(&fp_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlCacheConfig;
    use crate::error::CoreError;
    use crate::types::Importance;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingSummarizer {
        calls: AtomicU32,
        fail: bool,
    }

    impl CountingSummarizer {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl SpanSummarizer for CountingSummarizer {
        async fn summarize(&self, span: &[Message]) -> CoreResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(CoreError::llm("backend unavailable"))
            } else {
                Ok(format!("summary of {} messages", span.len()))
            }
        }
    }

    fn span() -> Vec<Message> {
        vec![
            Message::user("first").with_importance(Importance::Medium),
            Message::assistant("second"),
        ]
    }

    fn job(fingerprint: SpanFingerprint, cancel: CancellationToken) -> SummaryJob {
        SummaryJob {
            fingerprint,
            span: span(),
            splice_at: 0,
            conversation: Weak::new(),
            cancel,
        }
    }

    #[tokio::test]
    async fn test_summary_cached_after_first_call() {
        let summarizer = CountingSummarizer::new(false);
        let cache = Arc::new(SummaryCache::new(TtlCacheConfig::default()));
        let pool = SummaryWorkerPool::new(
            SummaryPoolConfig::default(),
            summarizer.clone(),
            cache.clone(),
        );

        let fp = SpanFingerprint::of_span(&span());
        assert!(pool.enqueue(job(fp.clone(), CancellationToken::new())));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
        assert!(cache.get(&fp).is_some());

        // Second job for the same span hits the cache, no new LLM call
        assert!(pool.enqueue(job(fp.clone(), CancellationToken::new())));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);

        pool.shutdown();
    }

    #[tokio::test]
    async fn test_cancelled_job_is_discarded() {
        let summarizer = CountingSummarizer::new(false);
        let cache = Arc::new(SummaryCache::new(TtlCacheConfig::default()));
        let pool = SummaryWorkerPool::new(
            SummaryPoolConfig::default(),
            summarizer.clone(),
            cache.clone(),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        pool.enqueue(job(SpanFingerprint::of_span(&span()), cancel));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);

        pool.shutdown();
    }

    #[tokio::test]
    async fn test_failure_is_swallowed() {
        let summarizer = CountingSummarizer::new(true);
        let cache = Arc::new(SummaryCache::new(TtlCacheConfig::default()));
        let pool = SummaryWorkerPool::new(
            SummaryPoolConfig::default(),
            summarizer.clone(),
            cache.clone(),
        );

        let fp = SpanFingerprint::of_span(&span());
        pool.enqueue(job(fp.clone(), CancellationToken::new()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
        // Nothing cached on failure
        assert!(cache.get(&fp).is_none());

        pool.shutdown();
    }

    #[test]
    fn test_llm_summarizer_prompt_shape() {
        struct NullLlm;
        #[async_trait]
        impl LlmInvoke for NullLlm {
            async fn invoke(&self, _messages: &[Message], _model: &str) -> CoreResult<String> {
                Ok(String::new())
            }
        }

        let summarizer =
            LlmSpanSummarizer::new(Arc::new(NullLlm), "claude-3.5-haiku").with_max_summary_tokens(300);
        let prompt = summarizer.build_prompt(&span());

        assert!(prompt.contains("300 tokens"));
        assert!(prompt.contains("USER: first"));
        assert!(prompt.contains("ASSISTANT: second"));
        assert!(prompt.contains("EXCERPT TO SUMMARIZE"));
    }
}
