//! Trait definitions for the object store.

use async_trait::async_trait;
use chrono::Duration;

use super::error::StorageError;
use super::types::{ObjectMeta, PresignedUrl};

/// Gateway to the blob store holding sources, outputs and metadata.
///
/// Implementations do no locking. Deleting a missing object succeeds.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns the name of this store implementation.
    fn name(&self) -> &str;

    /// Write an object, replacing any previous content.
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError>;

    /// Read a whole object.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Size and checksum of an object, or `None` if it does not exist.
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StorageError>;

    /// Copy an object to another key.
    async fn copy(&self, from: &str, to: &str) -> Result<(), StorageError>;

    /// Delete an object. Returns whether something was actually removed.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// URL a client can upload the object to.
    fn upload_url(&self, key: &str, ttl: Duration) -> Result<PresignedUrl, StorageError>;

    /// URL a client can download the object from.
    fn download_url(&self, key: &str, ttl: Duration) -> Result<PresignedUrl, StorageError>;
}
