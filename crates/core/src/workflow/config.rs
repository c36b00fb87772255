//! File workflow configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and retry settings for file workflows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// How often to poll a running transcode job (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Longest wait for one transcode job before it is abandoned (seconds).
    #[serde(default = "default_transcode_timeout")]
    pub transcode_timeout_secs: u64,

    /// Longest wait for one transcoder request, submit or poll (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Longest wait for one similarity score (seconds).
    #[serde(default = "default_score_timeout")]
    pub score_timeout_secs: u64,

    /// Longest wait for one object store call (seconds).
    #[serde(default = "default_storage_timeout")]
    pub storage_timeout_secs: u64,

    /// Transient error retries.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_poll_interval() -> u64 {
    5000 // 5 seconds
}

fn default_transcode_timeout() -> u64 {
    7200 // 2 hours
}

fn default_request_timeout() -> u64 {
    60
}

fn default_score_timeout() -> u64 {
    900 // 15 minutes
}

fn default_storage_timeout() -> u64 {
    300 // 5 minutes
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            transcode_timeout_secs: default_transcode_timeout(),
            request_timeout_secs: default_request_timeout(),
            score_timeout_secs: default_score_timeout(),
            storage_timeout_secs: default_storage_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

impl WorkflowConfig {
    pub fn with_poll_interval_ms(mut self, interval: u64) -> Self {
        self.poll_interval_ms = interval;
        self
    }

    pub fn with_transcode_timeout_secs(mut self, timeout: u64) -> Self {
        self.transcode_timeout_secs = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn transcode_timeout(&self) -> Duration {
        Duration::from_secs(self.transcode_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn score_timeout(&self) -> Duration {
        Duration::from_secs(self.score_timeout_secs)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }
}

/// Retry budget and backoff for transient errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Transient errors tolerated per file before it fails.
    #[serde(default = "default_max_retries")]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    2000 // 2 seconds
}

fn default_max_delay() -> u64 {
    60_000 // 1 minute
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_retries(),
            initial_delay_ms: default_retry_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Backoff before the retry following `retries_so_far` earlier ones.
    pub fn delay_for(&self, retries_so_far: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(retries_so_far.min(32) as i32);
        let millis = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(millis as u64)
    }

    /// No waiting between retries.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
        }
    }
}
