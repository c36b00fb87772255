//! Error types for external collaborators.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine error codes that clear up on their own.
pub const TRANSIENT_ENGINE_CODES: [i64; 4] = [1517, 1522, 1550, 1999];

/// Engine error codes caused by the job settings or the input file.
pub const INPUT_ENGINE_CODES: [i64; 3] = [1010, 1030, 1040];

/// Engine error codes caused by access rights.
pub const PERMISSION_ENGINE_CODES: [i64; 3] = [1401, 1432, 1433];

/// Category of a numeric engine error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Transient,
    ConfigOrInput,
    Permission,
    Unknown,
}

impl ErrorCategory {
    pub fn of(code: i64) -> Self {
        if TRANSIENT_ENGINE_CODES.contains(&code) {
            Self::Transient
        } else if INPUT_ENGINE_CODES.contains(&code) {
            Self::ConfigOrInput
        } else if PERMISSION_ENGINE_CODES.contains(&code) {
            Self::Permission
        } else {
            Self::Unknown
        }
    }

    /// Only transient codes are retried; unknown codes are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// Errors reported by (or while reaching) the transcoder or the scorer.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// Temporary failure; the same request may succeed later.
    #[error("Transient error{}: {message}", fmt_code(.code))]
    Transient { code: Option<i64>, message: String },

    /// The request itself cannot succeed (bad input, bad settings, no access).
    #[error("Permanent error{}: {message}", fmt_code(.code))]
    Permanent { code: Option<i64>, message: String },

    /// No answer within the allotted time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The collaborator answered with something unusable.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

fn fmt_code(code: &Option<i64>) -> String {
    code.map(|c| format!(" {}", c)).unwrap_or_default()
}

impl CollaboratorError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            code: None,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            code: None,
            message: message.into(),
        }
    }

    /// Classify a failure reported by the transcoding engine.
    pub fn from_engine_code(code: Option<i64>, message: impl Into<String>) -> Self {
        let message = message.into();
        match code.map(ErrorCategory::of) {
            Some(ErrorCategory::Transient) => Self::Transient { code, message },
            _ => Self::Permanent { code, message },
        }
    }

    /// Classify an unsuccessful HTTP response.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let message = format!("HTTP {}: {}", status, message.into());
        if status >= 500 || status == 429 || status == 408 {
            Self::transient(message)
        } else {
            Self::permanent(message)
        }
    }

    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout(_))
    }

    /// Engine error code, when the collaborator supplied one.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Transient { code, .. } | Self::Permanent { code, .. } => *code,
            _ => None,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        if self.is_retryable() {
            "transient"
        } else {
            "permanent"
        }
    }
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_http_status(status.as_u16(), e.to_string())
        } else if e.is_builder() {
            Self::Configuration(e.to_string())
        } else {
            Self::transient(e.to_string())
        }
    }
}
