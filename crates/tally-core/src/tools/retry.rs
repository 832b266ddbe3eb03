//! Retry and backoff configuration for tool execution
//!
//! Delays grow exponentially per attempt and are capped; timeouts grow on the
//! same schedule with their own multiplier so a slow-but-alive tool gets more
//! room on each retry.

use crate::tools::types::ToolErrorKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry behavior for a tool call
///
/// `max_retries` counts retries, not attempts: a call with `max_retries = 3`
/// runs at most 4 times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Cap on the delay between retries
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Multiplier for the retry delay
    pub backoff_multiplier: f64,
    /// Multiplier applied to the attempt timeout on each retry
    pub timeout_multiplier: f64,
    /// Cap on the grown attempt timeout
    #[serde(with = "humantime_serde")]
    pub max_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            timeout_multiplier: 1.5,
            max_timeout: Duration::from_secs(300),
        }
    }
}

impl RetryConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that never retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            timeout_multiplier: 1.0,
            max_timeout: Duration::from_secs(300),
        }
    }

    /// Create a config with a retry budget and defaults otherwise
    pub fn limited(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Set max retries
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    /// Set the delay before the first retry
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay cap
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the delay multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set the timeout growth multiplier
    pub fn with_timeout_multiplier(mut self, multiplier: f64) -> Self {
        self.timeout_multiplier = multiplier;
        self
    }

    /// Set the timeout cap
    pub fn with_max_timeout(mut self, timeout: Duration) -> Self {
        self.max_timeout = timeout;
        self
    }

    /// Decide whether to retry after `attempt` retries have already run
    pub fn should_retry(&self, kind: ToolErrorKind, attempt: u32) -> bool {
        kind.is_retryable() && attempt < self.max_retries
    }

    /// Delay before retry number `attempt + 1` (0-indexed), capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let raw = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = raw.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Attempt timeout for attempt number `attempt` (0-indexed), capped
    pub fn timeout_for(&self, base: Duration, attempt: u32) -> Duration {
        let raw = base.as_secs_f64() * self.timeout_multiplier.powi(attempt as i32);
        let capped = raw.min(self.max_timeout.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}
