//! Idempotent caching of tool execution results
//!
//! The cache key is a fingerprint over a call's semantic inputs only. Any
//! per-call unique id is deliberately excluded, so the same call issued in
//! different rounds lands on the same entry and skips re-execution.

use crate::cache::ttl::{CacheStats, TtlCache, TtlCacheConfig};
use crate::tools::types::{ToolExecutionResult, ToolInvocationRequest};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Deterministic fingerprint of a tool call's semantic inputs
///
/// Covers tool name, tool version, canonicalized arguments, caller id, and
/// permission level.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Compute the key for a request
    pub fn from_request(request: &ToolInvocationRequest) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(request.tool_name.as_bytes());
        hasher.update([0]);
        hasher.update(request.tool_version.as_bytes());
        hasher.update([0]);
        for (name, value) in &request.arguments {
            hasher.update(name.as_bytes());
            hasher.update([0x1]);
            let canonical = canonicalize_json(value);
            hasher.update(canonical.to_string().as_bytes());
            hasher.update([0x1]);
        }
        hasher.update([0]);
        hasher.update(request.caller_id.as_bytes());
        hasher.update([0]);
        hasher.update(request.permission_level.as_str().as_bytes());

        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        Self(hex)
    }

    /// The hex digest backing this key
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Canonicalize JSON for consistent hashing
///
/// Object keys are sorted recursively; arrays keep their order because
/// argument order is significant.
pub fn canonicalize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by_key(|(k, _)| *k);

            let canonical: serde_json::Map<String, Value> = sorted
                .into_iter()
                .map(|(k, v)| (k.clone(), canonicalize_json(v)))
                .collect();

            Value::Object(canonical)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(canonicalize_json).collect()),
        other => other.clone(),
    }
}

/// TTL cache of tool execution results keyed by [`IdempotencyKey`]
///
/// Results are stored as versioned JSON so entries written by an older result
/// schema can be migrated on read. An entry that fails to decode is treated
/// as a miss and invalidated, never as a fatal error.
pub struct IdempotencyCache {
    inner: TtlCache<IdempotencyKey, Value>,
}

impl IdempotencyCache {
    /// Create a new cache
    pub fn new(config: TtlCacheConfig) -> Self {
        Self {
            inner: TtlCache::new(config),
        }
    }

    /// Create with default config
    pub fn with_defaults() -> Self {
        Self::new(TtlCacheConfig::default())
    }

    /// Look up a cached result
    pub fn get(&self, key: &IdempotencyKey) -> Option<ToolExecutionResult> {
        let raw = self.inner.get(key)?;
        match ToolExecutionResult::from_versioned_json(raw) {
            Ok(result) => Some(result),
            Err(err) => {
                tracing::warn!(key = key.as_str(), error = %err, "corrupted cache entry, treating as miss");
                self.inner.invalidate(key);
                None
            }
        }
    }

    /// Store a result with the given TTL
    pub fn put(&self, key: IdempotencyKey, result: &ToolExecutionResult, ttl: Duration) {
        self.inner.set(key, result.to_versioned_json(), ttl);
    }

    /// Remove a single entry
    pub fn invalidate(&self, key: &IdempotencyKey) -> bool {
        self.inner.invalidate(key)
    }

    /// Remove all entries
    pub fn clear(&self) {
        self.inner.clear()
    }

    /// Current entry count
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Snapshot of the cache statistics
    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}

impl Default for IdempotencyCache {
    fn default() -> Self {
        Self::with_defaults()
    }
}
