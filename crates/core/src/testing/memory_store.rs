//! In-memory object store for testing.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::storage::{
    encode_key, ChecksumAlgorithm, ObjectMeta, ObjectStore, PresignedUrl, StorageError,
};

/// Object store keeping everything in a map.
///
/// Presigned URLs point at `memory://` and are never verified. Deletes can
/// be made to fail to exercise log-only cleanup paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    deleted: Arc<RwLock<Vec<String>>>,
    fail_deletes: Arc<RwLock<bool>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object directly, bypassing the trait.
    pub async fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.objects.write().await.insert(key.into(), data.into());
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    /// All keys currently stored, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Keys passed to successful deletes, in call order.
    pub async fn deleted_keys(&self) -> Vec<String> {
        self.deleted.read().await.clone()
    }

    /// Make every delete fail with an I/O error.
    pub async fn set_fail_deletes(&self, fail: bool) {
        *self.fail_deletes.write().await = fail;
    }

    fn url(key: &str, method: &str, ttl: Duration) -> PresignedUrl {
        PresignedUrl {
            url: format!("memory://{}?method={}", encode_key(key), method),
            expires_at: Utc::now() + ttl,
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        self.insert(key, data).await;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StorageError> {
        let objects = self.objects.read().await;
        Ok(objects.get(key).map(|data| ObjectMeta {
            key: key.to_string(),
            size_bytes: data.len() as u64,
            checksum: format!("{:x}", Sha256::digest(data)),
            checksum_algorithm: ChecksumAlgorithm::Sha256,
            last_modified: Some(Utc::now()),
        }))
    }

    async fn copy(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let data = self.get(from).await?;
        self.insert(to, data).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        if *self.fail_deletes.read().await {
            return Err(StorageError::Io {
                key: key.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "delete refused"),
            });
        }
        let removed = self.objects.write().await.remove(key).is_some();
        self.deleted.write().await.push(key.to_string());
        Ok(removed)
    }

    fn upload_url(&self, key: &str, ttl: Duration) -> Result<PresignedUrl, StorageError> {
        Ok(Self::url(key, "PUT", ttl))
    }

    fn download_url(&self, key: &str, ttl: Duration) -> Result<PresignedUrl, StorageError> {
        Ok(Self::url(key, "GET", ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_copy_and_delete() {
        let store = MemoryObjectStore::new();
        store.put("a/b", b"hello".to_vec()).await.unwrap();
        store.copy("a/b", "c/d").await.unwrap();

        let meta = store.head("c/d").await.unwrap().unwrap();
        assert_eq!(meta.size_bytes, 5);
        assert!(meta.last_modified.is_some());

        assert!(store.delete("a/b").await.unwrap());
        assert!(!store.delete("a/b").await.unwrap());
        assert_eq!(store.keys().await, vec!["c/d".to_string()]);
    }

    #[tokio::test]
    async fn test_failing_deletes() {
        let store = MemoryObjectStore::new();
        store.insert("k", b"x".to_vec()).await;
        store.set_fail_deletes(true).await;

        assert!(store.delete("k").await.is_err());
        assert!(store.contains("k").await);
    }
}
