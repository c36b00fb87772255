//! Configuration for collaborator clients.

use serde::{Deserialize, Serialize};

/// Base URL and request timeout of one collaborator service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorConfig {
    pub url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl CollaboratorConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Default transcoder endpoint.
    pub fn transcoder() -> Self {
        Self::new("http://127.0.0.1:9000")
    }

    /// Default scorer endpoint.
    pub fn scorer() -> Self {
        Self::new("http://127.0.0.1:9100")
    }
}
