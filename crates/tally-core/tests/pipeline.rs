//! End-to-end tests across the conversation budget and tool reliability layers

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tally_core::blob::MemoryBlobStore;
use tally_core::cache::{SummaryCache, TtlCacheConfig};
use tally_core::context::{
    ContextConfig, ConversationContext, ConversationPool, SpanSummarizer, SummaryPoolConfig,
    SummaryWorkerPool,
};
use tally_core::error::CoreResult;
use tally_core::tools::{
    CachePolicy, ReliabilityConfig, RetryConfig, ToolError, ToolExecutionResult,
    ToolInvocationRequest, ToolReliabilityLayer,
};
use tally_core::types::{Importance, Message};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("tally_core=debug")
        .with_test_writer()
        .try_init();
}

fn budget_config() -> ContextConfig {
    ContextConfig::new().with_max_tokens(5_000).with_threshold(0.8)
}

fn search_request(caller: &str) -> ToolInvocationRequest {
    ToolInvocationRequest::new("search")
        .with_argument("query", serde_json::json!({"text": "rust agents", "limit": 10}))
        .with_caller(caller)
        .with_cache_policy(CachePolicy::Cacheable)
        .with_retry(
            RetryConfig::limited(2).with_initial_delay(Duration::from_millis(5)),
        )
}

#[tokio::test]
async fn tool_results_flow_into_conversation_and_cache_across_rounds() {
    init_tracing();

    let layer = ToolReliabilityLayer::with_defaults();
    let conversation = ConversationContext::new("conv-1", budget_config());
    let executions = Arc::new(AtomicU32::new(0));

    // Round 1: the tool actually runs
    let calls = executions.clone();
    let first = layer
        .invoke(search_request("agent-7"), move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("42 matching documents".to_string())
            }
        })
        .await;
    assert!(!first.from_cache);
    conversation.append_tool_result(first);

    // Round 2: an identical call (new request object, new round) is served
    // from the idempotency cache with zero re-execution
    conversation.advance_round();
    let calls = executions.clone();
    let second = layer
        .invoke(search_request("agent-7"), move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("should not run".to_string())
            }
        })
        .await;
    assert!(second.from_cache);
    assert_eq!(second.observation, "42 matching documents");
    conversation.append_tool_result(second);

    assert_eq!(executions.load(Ordering::SeqCst), 1);

    let snapshot = conversation.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].round_id, 1);
    assert_eq!(snapshot[1].round_id, 2);
    assert_eq!(snapshot[0].content, snapshot[1].content);
}

#[tokio::test]
async fn failed_calls_are_appended_but_never_cached() {
    init_tracing();

    let layer = ToolReliabilityLayer::with_defaults();
    let conversation = ConversationContext::new("conv-1", budget_config());

    let result = layer
        .invoke(search_request("agent-7"), || async {
            Err(ToolError::execution("index unavailable"))
        })
        .await;

    assert!(!result.success);
    assert_eq!(result.retry_count, 0);
    assert!(layer.cache().is_empty());

    conversation.append_tool_result(result);
    assert_eq!(conversation.len(), 1);
    assert_eq!(conversation.snapshot()[0].importance, Importance::Medium);
}

#[tokio::test]
async fn oversized_observation_reaches_conversation_as_blob_ref() {
    init_tracing();

    let store = Arc::new(MemoryBlobStore::new());
    let layer = ToolReliabilityLayer::new(
        ReliabilityConfig::default().with_blob_threshold(1_000),
    )
    .with_blob_store(store.clone());
    let conversation = ConversationContext::new("conv-1", budget_config());

    let huge = "line of output\n".repeat(500);
    let result = layer
        .invoke(ToolInvocationRequest::new("read_log"), move || {
            let huge = huge.clone();
            async move { Ok(huge) }
        })
        .await;

    conversation.append_tool_result(result);

    let snapshot = conversation.snapshot();
    assert!(snapshot[0].blob_ref.is_some(), "message should carry the blob ref");
    assert!(snapshot[0].content.len() < 1_000);
    assert_eq!(store.len(), 1);
}

struct RecordingSummarizer {
    calls: AtomicU32,
}

#[async_trait]
impl SpanSummarizer for RecordingSummarizer {
    async fn summarize(&self, span: &[Message]) -> CoreResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("earlier work covered {} steps", span.len()))
    }
}

#[tokio::test]
async fn summarization_is_non_blocking_and_splices_back() {
    init_tracing();

    let summarizer = Arc::new(RecordingSummarizer {
        calls: AtomicU32::new(0),
    });
    let pool = SummaryWorkerPool::new(
        SummaryPoolConfig::default(),
        summarizer.clone(),
        Arc::new(SummaryCache::new(TtlCacheConfig::default())),
    );
    let config = budget_config().with_summarization_threshold(10);
    let conversation = ConversationContext::with_summarization("conv-1", config, pool);

    conversation.append(Message::system("mission brief").with_token_count(100));
    for i in 0..50 {
        let report = conversation.append(
            Message::assistant(format!("step {}", i))
                .with_importance(Importance::Medium)
                .with_token_count(100),
        );
        // Appends never block on the LLM: compression is synchronous extract
        assert!(report.total_tokens <= 5_000);
    }

    tokio::time::sleep(Duration::from_millis(150)).await;

    let snapshot = conversation.snapshot();
    assert!(snapshot[0].content.contains("mission brief"));
    assert!(
        snapshot.iter().any(|m| m.content.contains("earlier work covered")),
        "a summary should have been spliced back"
    );
    assert!(summarizer.calls.load(Ordering::SeqCst) >= 1);

    let sum: usize = snapshot.iter().map(|m| m.token_count).sum();
    assert_eq!(sum, conversation.current_total_tokens());
}

#[tokio::test]
async fn pool_shutdown_stops_all_conversation_work() {
    init_tracing();

    let pool = ConversationPool::new(8, budget_config());
    let a = pool.get_or_create("conv-a");
    let b = pool.get_or_create("conv-b");

    a.append(Message::user("hello"));
    b.append(Message::user("world"));

    pool.shutdown();

    assert!(a.cancellation_token().is_cancelled());
    assert!(b.cancellation_token().is_cancelled());
}
