//! Core types for talking to the management API.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry configuration for throttled or flaky API calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(15),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Connection settings for the HTTP transport.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Base URL of the management API, e.g. `https://example.duplocloud.net`
    pub host: String,
    /// API token, sent as a bearer token
    pub token: String,
    /// Optional user the calls are made on behalf of
    pub user_account: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl HttpSettings {
    pub fn new(host: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            token: token.into(),
            user_account: None,
            timeout: Duration::from_secs(30),
        }
    }
}
