//! Tool invocation types
//!
//! Requests describe a tool call's semantic inputs plus its reliability
//! envelope (timeout, retry, cache policy). Results are plain values: a
//! failed call is still a result, never an error crossing the core boundary.

use crate::blob::BlobRef;
use crate::error::{CoreError, CoreResult};
use crate::tools::retry::RetryConfig;
use crate::types::{Importance, Message, format_value};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Permission level a call executes under
///
/// Part of the idempotency fingerprint: the same call at a different level is
/// a different call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    ReadOnly,
    Standard,
    Elevated,
}

impl PermissionLevel {
    /// Stable string form used in fingerprints
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOnly => "read_only",
            Self::Standard => "standard",
            Self::Elevated => "elevated",
        }
    }
}

/// Caching behavior for a tool call
///
/// `NoCache` is the default: side effects are cached only when the caller
/// opts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Never consult or populate the cache
    #[default]
    NoCache,
    /// Cache with the layer's default TTL
    Cacheable,
    /// Cache for 5 minutes
    TtlShort,
    /// Cache for 1 hour
    TtlMedium,
    /// Cache for 24 hours
    TtlLong,
}

impl CachePolicy {
    /// TTL for this policy, or `None` when caching is disabled
    pub fn ttl(&self, default_ttl: Duration) -> Option<Duration> {
        match self {
            Self::NoCache => None,
            Self::Cacheable => Some(default_ttl),
            Self::TtlShort => Some(Duration::from_secs(5 * 60)),
            Self::TtlMedium => Some(Duration::from_secs(60 * 60)),
            Self::TtlLong => Some(Duration::from_secs(24 * 60 * 60)),
        }
    }

    /// Whether this policy participates in caching at all
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, Self::NoCache)
    }
}

/// Fixed failure taxonomy for tool execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// The call exceeded its (possibly grown) timeout
    Timeout,
    /// The caller lacks permission for this operation
    PermissionDenied,
    /// Arguments failed validation
    InvalidParameters,
    /// The tool body failed
    ExecutionError,
    /// A backing resource was exhausted or unavailable
    ResourceError,
}

impl ToolErrorKind {
    /// Whether a local retry can plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::ResourceError)
    }

    /// Stable string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::PermissionDenied => "permission_denied",
            Self::InvalidParameters => "invalid_parameters",
            Self::ExecutionError => "execution_error",
            Self::ResourceError => "resource_error",
        }
    }
}

impl fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a tool body to the reliability layer
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ToolError {
    /// Taxonomy classification
    pub kind: ToolErrorKind,
    /// Human-readable detail
    pub message: String,
}

impl ToolError {
    /// Create an error with an explicit kind
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Execution failure (non-retryable)
    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::ExecutionError, message)
    }

    /// Permission denial (non-retryable)
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::PermissionDenied, message)
    }

    /// Argument validation failure (non-retryable)
    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::InvalidParameters, message)
    }

    /// Resource exhaustion (retryable)
    pub fn resource(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::ResourceError, message)
    }
}

/// A single tool invocation
///
/// Created per call and consumed once. `arguments` keeps insertion order;
/// canonicalization for fingerprinting happens at hash time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    /// Tool name
    pub tool_name: String,
    /// Tool implementation version; bumping it invalidates cached results
    pub tool_version: String,
    /// Ordered named arguments
    pub arguments: Vec<(String, Value)>,
    /// Identity of the caller
    pub caller_id: String,
    /// Permission level for this call
    pub permission_level: PermissionLevel,
    /// Caching behavior
    pub cache_policy: CachePolicy,
    /// Base timeout per attempt
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Retry behavior
    pub retry: RetryConfig,
}

impl ToolInvocationRequest {
    /// Create a request with defaults: no caching, standard permissions,
    /// 30 second timeout
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool_version: "1".to_string(),
            arguments: Vec::new(),
            caller_id: String::new(),
            permission_level: PermissionLevel::Standard,
            cache_policy: CachePolicy::default(),
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }

    /// Set the tool version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.tool_version = version.into();
        self
    }

    /// Append a named argument
    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.push((name.into(), value));
        self
    }

    /// Set the caller id
    pub fn with_caller(mut self, caller_id: impl Into<String>) -> Self {
        self.caller_id = caller_id.into();
        self
    }

    /// Set the permission level
    pub fn with_permission(mut self, level: PermissionLevel) -> Self {
        self.permission_level = level;
        self
    }

    /// Set the cache policy
    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Set the base timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry config
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Render the call for logs
    pub fn render(&self) -> String {
        let args: Vec<String> = self
            .arguments
            .iter()
            .map(|(name, value)| format!("{}={}", name, format_value(value)))
            .collect();
        format!("{}({})", self.tool_name, args.join(", "))
    }
}

/// Current result schema version
pub const RESULT_SCHEMA_VERSION: u32 = 2;

fn default_schema_version() -> u32 {
    1
}

/// Result of a tool execution
///
/// Produced by the reliability layer and appended to a conversation as a
/// `Tool` message. Serialized results carry a schema version so entries cached
/// by an older build migrate cleanly (see [`ToolExecutionResult::from_versioned_json`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    /// Tool that produced this result
    pub tool_name: String,
    /// Bounded observation text
    pub observation: String,
    /// Whether the call succeeded
    pub success: bool,
    /// Failure classification, if any
    pub error: Option<ToolErrorKind>,
    /// Failure detail, if any
    pub error_message: Option<String>,
    /// Number of retries performed (0 = first attempt answered)
    pub retry_count: u32,
    /// Wall-clock duration across all attempts
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Whether this result was served from the idempotency cache
    pub from_cache: bool,
    /// Reference to the full observation when it was offloaded
    pub blob_ref: Option<BlobRef>,
    /// Schema version this value was serialized with
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

impl ToolExecutionResult {
    /// Create a successful result
    pub fn success(tool_name: impl Into<String>, observation: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            observation: observation.into(),
            success: true,
            error: None,
            error_message: None,
            retry_count: 0,
            duration: Duration::ZERO,
            from_cache: false,
            blob_ref: None,
            schema_version: RESULT_SCHEMA_VERSION,
        }
    }

    /// Create a failed result
    pub fn failure(
        tool_name: impl Into<String>,
        kind: ToolErrorKind,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            tool_name: tool_name.into(),
            observation: format!("tool failed ({}): {}", kind, message),
            success: false,
            error: Some(kind),
            error_message: Some(message),
            retry_count: 0,
            duration: Duration::ZERO,
            from_cache: false,
            blob_ref: None,
            schema_version: RESULT_SCHEMA_VERSION,
        }
    }

    /// Set the retry count
    pub fn with_retry_count(mut self, retries: u32) -> Self {
        self.retry_count = retries;
        self
    }

    /// Set the duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Attach a blob reference
    pub fn with_blob_ref(mut self, blob_ref: BlobRef) -> Self {
        self.blob_ref = Some(blob_ref);
        self
    }

    /// Convert into a conversation message
    ///
    /// Tool observations default to `High` importance; failures drop to
    /// `Medium` so they are evicted before useful observations.
    pub fn into_message(self, round_id: u64) -> Message {
        let importance = if self.success {
            Importance::High
        } else {
            Importance::Medium
        };
        let mut message = Message::tool(self.observation)
            .with_importance(importance)
            .with_round(round_id);
        if let Some(blob_ref) = self.blob_ref {
            message = message.with_blob_ref(blob_ref);
        }
        message
    }

    /// Serialize with the current schema version
    pub fn to_versioned_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Null)
    }

    /// Deserialize, migrating older schema versions forward
    pub fn from_versioned_json(mut raw: Value) -> CoreResult<Self> {
        let version = raw
            .get("schema_version")
            .and_then(Value::as_u64)
            .unwrap_or(1)
            .max(1) as u32;

        if version > RESULT_SCHEMA_VERSION {
            return Err(CoreError::cache(format!(
                "result schema {} is newer than supported {}",
                version, RESULT_SCHEMA_VERSION
            )));
        }

        for migrate in &MIGRATIONS[(version as usize - 1)..] {
            raw = migrate(raw);
        }

        let result: Self = serde_json::from_value(raw)?;
        Ok(result)
    }
}

/// Pure migration steps: `MIGRATIONS[n]` lifts schema `n + 1` to `n + 2`
static MIGRATIONS: [fn(Value) -> Value; (RESULT_SCHEMA_VERSION - 1) as usize] = [migrate_v1_to_v2];

/// v1 named the cache flag `cached` and had no `tool_version` on requests
fn migrate_v1_to_v2(mut raw: Value) -> Value {
    if let Value::Object(map) = &mut raw {
        if let Some(flag) = map.remove("cached") {
            map.entry("from_cache").or_insert(flag);
        }
        map.insert("schema_version".to_string(), Value::from(2u32));
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_policy_ttls() {
        let default_ttl = Duration::from_secs(120);

        assert_eq!(CachePolicy::NoCache.ttl(default_ttl), None);
        assert_eq!(CachePolicy::Cacheable.ttl(default_ttl), Some(default_ttl));
        assert_eq!(
            CachePolicy::TtlShort.ttl(default_ttl),
            Some(Duration::from_secs(300))
        );
        assert_eq!(
            CachePolicy::TtlMedium.ttl(default_ttl),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(
            CachePolicy::TtlLong.ttl(default_ttl),
            Some(Duration::from_secs(86400))
        );
    }

    #[test]
    fn test_error_kind_retryability() {
        assert!(ToolErrorKind::Timeout.is_retryable());
        assert!(ToolErrorKind::ResourceError.is_retryable());
        assert!(!ToolErrorKind::PermissionDenied.is_retryable());
        assert!(!ToolErrorKind::InvalidParameters.is_retryable());
        assert!(!ToolErrorKind::ExecutionError.is_retryable());
    }

    #[test]
    fn test_request_render() {
        let request = ToolInvocationRequest::new("read_file")
            .with_argument("path", json!("/tmp/x"))
            .with_argument("limit", json!(10));

        assert_eq!(request.render(), "read_file(path=\"/tmp/x\", limit=10)");
    }

    #[test]
    fn test_failure_result_fields() {
        let result =
            ToolExecutionResult::failure("db_query", ToolErrorKind::ExecutionError, "boom");

        assert!(!result.success);
        assert_eq!(result.error, Some(ToolErrorKind::ExecutionError));
        assert_eq!(result.error_message.as_deref(), Some("boom"));
        assert!(result.observation.contains("execution_error"));
    }

    #[test]
    fn test_into_message_importance() {
        let ok = ToolExecutionResult::success("t", "obs").into_message(3);
        assert_eq!(ok.importance, Importance::High);
        assert_eq!(ok.round_id, 3);

        let failed = ToolExecutionResult::failure("t", ToolErrorKind::Timeout, "slow")
            .into_message(3);
        assert_eq!(failed.importance, Importance::Medium);
    }

    #[test]
    fn test_versioned_roundtrip() {
        let result = ToolExecutionResult::success("t", "obs").with_retry_count(2);
        let raw = result.to_versioned_json();

        let decoded = ToolExecutionResult::from_versioned_json(raw).unwrap();
        assert_eq!(decoded.retry_count, 2);
        assert_eq!(decoded.schema_version, RESULT_SCHEMA_VERSION);
    }

    #[test]
    fn test_v1_entry_migrates() {
        let v1 = json!({
            "tool_name": "t",
            "observation": "obs",
            "success": true,
            "error": null,
            "error_message": null,
            "retry_count": 0,
            "duration": "1s",
            "cached": true,
            "blob_ref": null
        });

        let decoded = ToolExecutionResult::from_versioned_json(v1).unwrap();
        assert!(decoded.from_cache);
        assert_eq!(decoded.schema_version, RESULT_SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let raw = json!({"schema_version": 99});
        assert!(ToolExecutionResult::from_versioned_json(raw).is_err());
    }
}
