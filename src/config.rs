//! Engine configuration.

use crate::retry::{RetryPolicy, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS};
use serde::Deserialize;
use std::time::Duration;

/// Retry settings applied to every remote write and to sign-in.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryConfig {
    /// Retries after the first attempt.
    /// Default: 5
    pub max_attempts: u32,

    /// Delay before the first retry, doubled for each further retry.
    /// Default: 1000
    pub initial_delay_ms: u64,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
        )
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: DEFAULT_INITIAL_DELAY.as_millis() as u64,
        }
    }
}

/// Engine configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Application scope segment of every storage path.
    pub app_scope: String,

    pub retry: RetryConfig,

    /// Snapshot events buffered per top-level listener.
    /// Default: 64
    pub snapshot_buffer: usize,
}

impl EngineConfig {
    /// Parse a JSON config document. Missing fields take their defaults.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn with_app_scope(mut self, app_scope: impl Into<String>) -> Self {
        self.app_scope = app_scope.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_scope: "default-app-id".to_string(),
            retry: RetryConfig::default(),
            snapshot_buffer: 64,
        }
    }
}
