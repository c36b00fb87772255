//! Error types for the object store.

use thiserror::Error;

/// Errors that can occur while talking to the object store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No object under this key.
    #[error("Object not found: {0}")]
    NotFound(String),

    /// The key cannot be mapped to a storage location.
    #[error("Invalid object key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// A signed URL did not verify.
    #[error("Invalid signature for {0}")]
    InvalidSignature(String),

    /// A signed URL is past its expiry.
    #[error("Signed URL for {0} has expired")]
    Expired(String),

    /// I/O failure on a specific key.
    #[error("I/O error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// The backend did not answer in time.
    #[error("Storage operation on {0} timed out")]
    Timeout(String),
}

impl StorageError {
    pub fn invalid_key(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Map an I/O error, turning `NotFound` into [`StorageError::NotFound`].
    pub fn io(key: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(key.to_string())
        } else {
            Self::Io {
                key: key.to_string(),
                source,
            }
        }
    }

    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Timeout(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
