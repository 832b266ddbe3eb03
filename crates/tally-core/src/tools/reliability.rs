//! Reliable tool invocation
//!
//! Wraps a tool body with idempotent caching, per-attempt timeouts, and
//! exponential-backoff retries. Failures come back as values: the layer never
//! returns `Err` to its caller.

use crate::blob::{BlobRef, BlobStore};
use crate::cache::{IdempotencyCache, IdempotencyKey, TtlCacheConfig};
use crate::tools::types::{ToolError, ToolErrorKind, ToolExecutionResult, ToolInvocationRequest};
use crate::types::truncate_utf8;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

/// Configuration for the reliability layer
#[derive(Debug, Clone)]
pub struct ReliabilityConfig {
    /// TTL used for `CachePolicy::Cacheable`
    pub default_cache_ttl: Duration,
    /// Observations longer than this are truncated in place
    pub max_observation_len: usize,
    /// Observations longer than this are offloaded to the blob store
    pub blob_threshold: usize,
    /// Preview kept inline when an observation is offloaded
    pub blob_preview_len: usize,
    /// Concurrent calls allowed within one batch
    pub max_concurrency: usize,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            default_cache_ttl: Duration::from_secs(3600),
            max_observation_len: 16 * 1024,
            blob_threshold: 1024 * 1024,
            blob_preview_len: 512,
            max_concurrency: 6,
        }
    }
}

impl ReliabilityConfig {
    /// Set the default cache TTL
    pub fn with_default_cache_ttl(mut self, ttl: Duration) -> Self {
        self.default_cache_ttl = ttl;
        self
    }

    /// Set the inline observation bound
    pub fn with_max_observation_len(mut self, len: usize) -> Self {
        self.max_observation_len = len;
        self
    }

    /// Set the blob offload threshold
    pub fn with_blob_threshold(mut self, threshold: usize) -> Self {
        self.blob_threshold = threshold;
        self
    }

    /// Set the batch concurrency bound
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }
}

/// Invocation statistics
#[derive(Debug, Clone, Default)]
pub struct InvokeStats {
    /// Tool body executions (attempts, not calls)
    pub executions: u64,
    /// Calls answered from the idempotency cache
    pub cache_hits: u64,
    /// Retries performed
    pub retries: u64,
    /// Attempts that timed out
    pub timeouts: u64,
    /// Calls that ended in a failed result
    pub failures: u64,
    /// Observations offloaded to the blob store
    pub blob_offloads: u64,
}

/// Boxed tool body usable in heterogeneous batches
pub type BoxedExec = Box<dyn FnMut() -> BoxFuture<'static, Result<String, ToolError>> + Send>;

/// Reliability wrapper around tool execution
pub struct ToolReliabilityLayer {
    cache: Arc<IdempotencyCache>,
    blobs: Option<Arc<dyn BlobStore>>,
    config: ReliabilityConfig,
    semaphore: Arc<Semaphore>,
    stats: Mutex<InvokeStats>,
}

impl ToolReliabilityLayer {
    /// Create a layer with its own cache and no blob store
    pub fn new(config: ReliabilityConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
        Self {
            cache: Arc::new(IdempotencyCache::new(TtlCacheConfig::default())),
            blobs: None,
            config,
            semaphore,
            stats: Mutex::new(InvokeStats::default()),
        }
    }

    /// Create with default config
    pub fn with_defaults() -> Self {
        Self::new(ReliabilityConfig::default())
    }

    /// Use a shared idempotency cache
    pub fn with_cache(mut self, cache: Arc<IdempotencyCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Attach a blob store for oversized observations
    pub fn with_blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// The idempotency cache backing this layer
    pub fn cache(&self) -> &Arc<IdempotencyCache> {
        &self.cache
    }

    /// Snapshot of the invocation statistics
    pub fn stats(&self) -> InvokeStats {
        self.stats.lock().clone()
    }

    /// Drop any cached result for a request
    pub fn invalidate(&self, request: &ToolInvocationRequest) -> bool {
        self.cache.invalidate(&IdempotencyKey::from_request(request))
    }

    /// Execute a tool call with caching, timeout, and retries
    pub async fn invoke<F, Fut>(
        &self,
        request: ToolInvocationRequest,
        exec_fn: F,
    ) -> ToolExecutionResult
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String, ToolError>>,
    {
        self.invoke_with_cancel(request, exec_fn, None).await
    }

    /// [`ToolReliabilityLayer::invoke`] with a cancellation token aborting
    /// waits between and during attempts
    pub async fn invoke_with_cancel<F, Fut>(
        &self,
        request: ToolInvocationRequest,
        mut exec_fn: F,
        cancel: Option<CancellationToken>,
    ) -> ToolExecutionResult
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String, ToolError>>,
    {
        let started = Instant::now();

        let key = request
            .cache_policy
            .is_cacheable()
            .then(|| IdempotencyKey::from_request(&request));

        if let Some(key) = &key {
            if let Some(mut hit) = self.cache.get(key) {
                hit.from_cache = true;
                self.stats.lock().cache_hits += 1;
                tracing::debug!(tool = %request.tool_name, "idempotency cache hit");
                return hit;
            }
        }

        let mut attempt: u32 = 0;
        loop {
            if let Some(token) = &cancel {
                if token.is_cancelled() {
                    return self.cancelled_result(&request, attempt, started);
                }
            }

            let attempt_timeout = request.retry.timeout_for(request.timeout, attempt);
            let outcome = match timeout(attempt_timeout, exec_fn()).await {
                Ok(Ok(observation)) => Ok(observation),
                Ok(Err(err)) => Err((err.kind, err.message)),
                Err(_) => Err((
                    ToolErrorKind::Timeout,
                    format!("attempt timed out after {:?}", attempt_timeout),
                )),
            };
            self.stats.lock().executions += 1;

            match outcome {
                Ok(observation) => {
                    let mut result = self.finish_success(&request, observation).await;
                    result.retry_count = attempt;
                    result.duration = started.elapsed();

                    if let (Some(key), Some(ttl)) = (
                        &key,
                        request.cache_policy.ttl(self.config.default_cache_ttl),
                    ) {
                        self.cache.put(key.clone(), &result, ttl);
                    }
                    return result;
                }
                Err((kind, message)) => {
                    if kind == ToolErrorKind::Timeout {
                        self.stats.lock().timeouts += 1;
                    }

                    if !request.retry.should_retry(kind, attempt) {
                        self.stats.lock().failures += 1;
                        tracing::warn!(
                            tool = %request.tool_name,
                            kind = kind.as_str(),
                            retries = attempt,
                            "tool call failed"
                        );
                        return ToolExecutionResult::failure(&request.tool_name, kind, message)
                            .with_retry_count(attempt)
                            .with_duration(started.elapsed());
                    }

                    let delay = request.retry.delay_for(attempt);
                    attempt += 1;
                    self.stats.lock().retries += 1;
                    tracing::debug!(
                        tool = %request.tool_name,
                        kind = kind.as_str(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying tool call"
                    );

                    match &cancel {
                        Some(token) => {
                            tokio::select! {
                                _ = token.cancelled() => {
                                    return self.cancelled_result(&request, attempt, started);
                                }
                                _ = sleep(delay) => {}
                            }
                        }
                        None => sleep(delay).await,
                    }
                }
            }
        }
    }

    /// Execute a batch of calls bounded by the concurrency limit
    ///
    /// Results come back in completion order, not issue order, matching how
    /// they would be appended to a conversation.
    pub async fn invoke_batch(
        &self,
        batch: Vec<(ToolInvocationRequest, BoxedExec)>,
        cancel: Option<CancellationToken>,
    ) -> Vec<ToolExecutionResult> {
        let mut in_flight = FuturesUnordered::new();
        for (request, exec_fn) in batch {
            let semaphore = Arc::clone(&self.semaphore);
            let cancel = cancel.clone();
            in_flight.push(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                self.invoke_with_cancel(request, exec_fn, cancel).await
            });
        }

        let mut results = Vec::with_capacity(in_flight.len());
        while let Some(result) = in_flight.next().await {
            results.push(result);
        }
        results
    }

    fn cancelled_result(
        &self,
        request: &ToolInvocationRequest,
        attempt: u32,
        started: Instant,
    ) -> ToolExecutionResult {
        self.stats.lock().failures += 1;
        ToolExecutionResult::failure(
            &request.tool_name,
            ToolErrorKind::ExecutionError,
            "cancelled before completion",
        )
        .with_retry_count(attempt)
        .with_duration(started.elapsed())
    }

    /// Bound or offload a successful observation
    async fn finish_success(
        &self,
        request: &ToolInvocationRequest,
        observation: String,
    ) -> ToolExecutionResult {
        if observation.len() > self.config.blob_threshold {
            if let Some(store) = &self.blobs {
                let blob_ref = BlobRef::generate();
                match store.put(&blob_ref, observation.clone().into_bytes()).await {
                    Ok(()) => {
                        self.stats.lock().blob_offloads += 1;
                        let preview = truncate_utf8(&observation, self.config.blob_preview_len);
                        let inline = format!(
                            "{}… [{} bytes stored as {}]",
                            preview,
                            observation.len(),
                            blob_ref
                        );
                        return ToolExecutionResult::success(&request.tool_name, inline)
                            .with_blob_ref(blob_ref);
                    }
                    Err(err) => {
                        tracing::warn!(
                            tool = %request.tool_name,
                            error = %err,
                            "blob offload failed, truncating observation inline"
                        );
                    }
                }
            }
        }

        let bounded = if observation.len() > self.config.max_observation_len {
            format!(
                "{}…",
                truncate_utf8(&observation, self.config.max_observation_len)
            )
        } else {
            observation
        };
        ToolExecutionResult::success(&request.tool_name, bounded)
    }
}

impl Default for ToolReliabilityLayer {
    fn default() -> Self {
        Self::with_defaults()
    }
}
