//! Configuration for the filesystem object store.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::types::ChecksumAlgorithm;

/// Configuration for [`FsObjectStore`](super::FsObjectStore).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory objects are stored under.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Secret used to sign object URLs. A random one is generated at
    /// startup when unset, which invalidates URLs across restarts.
    #[serde(default)]
    pub signing_secret: Option<String>,

    /// Algorithm for output checksums.
    #[serde(default)]
    pub checksum: ChecksumAlgorithm,

    /// Read buffer size in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_root() -> PathBuf {
    PathBuf::from("data/objects")
}

fn default_buffer_size() -> usize {
    1024 * 1024 // 1 MB
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            signing_secret: None,
            checksum: ChecksumAlgorithm::default(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl StorageConfig {
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_signing_secret(mut self, secret: impl Into<String>) -> Self {
        self.signing_secret = Some(secret.into());
        self
    }

    pub fn with_checksum(mut self, checksum: ChecksumAlgorithm) -> Self {
        self.checksum = checksum;
        self
    }
}
