//! Filesystem object store implementation.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::Stream;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::debug;

use super::config::StorageConfig;
use super::error::StorageError;
use super::signer::UrlSigner;
use super::traits::ObjectStore;
use super::types::{ChecksumAlgorithm, ObjectMeta, PresignedUrl, UrlMethod};

/// Object store keeping each object as a file under a root directory.
///
/// Writes go to a temporary sibling file and are renamed into place, so a
/// reader never sees a partially written object.
pub struct FsObjectStore {
    root: PathBuf,
    signer: UrlSigner,
    checksum: ChecksumAlgorithm,
    buffer_size: usize,
}

impl FsObjectStore {
    pub fn new(config: &StorageConfig, signer: UrlSigner) -> Self {
        Self {
            root: config.root.clone(),
            signer,
            checksum: config.checksum,
            buffer_size: config.buffer_size.max(4096),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    /// Map a key to its file, rejecting keys that would escape the root.
    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() {
            return Err(StorageError::invalid_key(key, "empty key"));
        }
        if key.starts_with('/') || key.contains('\\') || key.contains('\0') {
            return Err(StorageError::invalid_key(key, "illegal character"));
        }
        if key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(StorageError::invalid_key(key, "illegal path segment"));
        }
        Ok(self.root.join(key))
    }

    async fn ensure_parent(key: &str, path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(key, e))?;
        }
        Ok(())
    }

    /// Fixed-length sibling name, so a key at the name length limit still
    /// has room for its temp file.
    fn temp_path(path: &Path) -> PathBuf {
        path.with_file_name(format!(".{}.part", uuid::Uuid::new_v4().simple()))
    }

    /// Start a streaming write of `key`.
    pub async fn writer(&self, key: &str) -> Result<ObjectWriter, StorageError> {
        let final_path = self.path_for(key)?;
        Self::ensure_parent(key, &final_path).await?;

        let temp_path = Self::temp_path(&final_path);
        let file = File::create(&temp_path)
            .await
            .map_err(|e| StorageError::io(key, e))?;

        Ok(ObjectWriter {
            key: key.to_string(),
            temp_path,
            final_path,
            writer: BufWriter::with_capacity(self.buffer_size, file),
            written: 0,
        })
    }

    /// Open `key` for streaming. Returns the object size and a chunk stream.
    pub async fn read_stream(
        &self,
        key: &str,
    ) -> Result<(u64, impl Stream<Item = std::io::Result<Vec<u8>>> + Send + 'static), StorageError>
    {
        let path = self.path_for(key)?;
        let file = File::open(&path)
            .await
            .map_err(|e| StorageError::io(key, e))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| StorageError::io(key, e))?
            .len();

        let buffer_size = self.buffer_size;
        let stream = futures::stream::try_unfold(file, move |mut file| async move {
            let mut buffer = vec![0u8; buffer_size];
            let bytes_read = file.read(&mut buffer).await?;
            if bytes_read == 0 {
                return Ok(None);
            }
            buffer.truncate(bytes_read);
            Ok::<_, std::io::Error>(Some((buffer, file)))
        });

        Ok((size, stream))
    }

    async fn calculate_checksum(&self, key: &str, path: &Path) -> Result<String, StorageError> {
        let file = File::open(path)
            .await
            .map_err(|e| StorageError::io(key, e))?;
        let mut reader = BufReader::with_capacity(self.buffer_size, file);
        let mut buffer = vec![0u8; self.buffer_size];

        match self.checksum {
            ChecksumAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                loop {
                    let bytes_read = reader
                        .read(&mut buffer)
                        .await
                        .map_err(|e| StorageError::io(key, e))?;
                    if bytes_read == 0 {
                        break;
                    }
                    hasher.update(&buffer[..bytes_read]);
                }
                Ok(format!("{:x}", hasher.finalize()))
            }
            ChecksumAlgorithm::Md5 => {
                let mut context = md5::Context::new();
                loop {
                    let bytes_read = reader
                        .read(&mut buffer)
                        .await
                        .map_err(|e| StorageError::io(key, e))?;
                    if bytes_read == 0 {
                        break;
                    }
                    context.consume(&buffer[..bytes_read]);
                }
                Ok(format!("{:x}", context.compute()))
            }
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        let mut writer = self.writer(key).await?;
        if let Err(e) = writer.write_chunk(&data).await {
            writer.abort().await;
            return Err(e);
        }
        writer.finish().await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        fs::read(&path).await.map_err(|e| StorageError::io(key, e))
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StorageError> {
        let path = self.path_for(key)?;
        let metadata = match fs::metadata(&path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(key, e)),
        };

        let checksum = self.calculate_checksum(key, &path).await?;

        Ok(Some(ObjectMeta {
            key: key.to_string(),
            size_bytes: metadata.len(),
            checksum,
            checksum_algorithm: self.checksum,
            last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        }))
    }

    async fn copy(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let source = self.path_for(from)?;
        let destination = self.path_for(to)?;
        Self::ensure_parent(to, &destination).await?;

        let temp_path = Self::temp_path(&destination);
        if let Err(e) = fs::copy(&source, &temp_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::io(from, e));
        }
        fs::rename(&temp_path, &destination)
            .await
            .map_err(|e| StorageError::io(to, e))?;

        debug!("Copied object {} to {}", from, to);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted object {}", key);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(key, e)),
        }
    }

    fn upload_url(&self, key: &str, ttl: Duration) -> Result<PresignedUrl, StorageError> {
        self.path_for(key)?;
        Ok(self.signer.sign(UrlMethod::Put, key, ttl))
    }

    fn download_url(&self, key: &str, ttl: Duration) -> Result<PresignedUrl, StorageError> {
        self.path_for(key)?;
        Ok(self.signer.sign(UrlMethod::Get, key, ttl))
    }
}

/// In-progress streaming write of one object.
pub struct ObjectWriter {
    key: String,
    temp_path: PathBuf,
    final_path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

impl ObjectWriter {
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        self.writer
            .write_all(chunk)
            .await
            .map_err(|e| StorageError::io(&self.key, e))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Flush and move the object into place. Returns its size.
    pub async fn finish(mut self) -> Result<u64, StorageError> {
        let result = async {
            self.writer.flush().await?;
            self.writer.get_mut().sync_all().await?;
            fs::rename(&self.temp_path, &self.final_path).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&self.temp_path).await;
            return Err(StorageError::io(&self.key, e));
        }
        Ok(self.written)
    }

    /// Drop the partial object.
    pub async fn abort(self) {
        drop(self.writer);
        let _ = fs::remove_file(&self.temp_path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use tempfile::TempDir;

    fn create_store(checksum: ChecksumAlgorithm) -> (TempDir, FsObjectStore) {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::default()
            .with_root(dir.path())
            .with_checksum(checksum);
        let store = FsObjectStore::new(&config, UrlSigner::new("k", "http://localhost:8080"));
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_get_head() {
        let (_dir, store) = create_store(ChecksumAlgorithm::Sha256);
        store
            .put("tasks/t1/source/f1/a.mov", b"hello".to_vec())
            .await
            .unwrap();

        assert_eq!(store.get("tasks/t1/source/f1/a.mov").await.unwrap(), b"hello");

        let meta = store.head("tasks/t1/source/f1/a.mov").await.unwrap().unwrap();
        assert_eq!(meta.size_bytes, 5);
        assert_eq!(
            meta.checksum,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(meta.checksum_algorithm.as_str(), "SHA256");
    }

    #[tokio::test]
    async fn test_md5_checksum() {
        let (_dir, store) = create_store(ChecksumAlgorithm::Md5);
        store.put("a/b", b"hello".to_vec()).await.unwrap();

        let meta = store.head("a/b").await.unwrap().unwrap();
        assert_eq!(meta.checksum, "5d41402abc4b2a76b9719d911017c592");
    }

    #[tokio::test]
    async fn test_head_missing_is_none() {
        let (_dir, store) = create_store(ChecksumAlgorithm::Sha256);
        assert!(store.head("output/t1/f1/x.mp4").await.unwrap().is_none());
        assert!(store
            .get("output/t1/f1/x.mp4")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_dir, store) = create_store(ChecksumAlgorithm::Sha256);
        store.put("output/t1/f1/x.mp4", vec![1, 2, 3]).await.unwrap();

        assert!(store.delete("output/t1/f1/x.mp4").await.unwrap());
        assert!(!store.delete("output/t1/f1/x.mp4").await.unwrap());
    }

    #[tokio::test]
    async fn test_copy() {
        let (_dir, store) = create_store(ChecksumAlgorithm::Sha256);
        store.put("src/one", b"payload".to_vec()).await.unwrap();

        store.copy("src/one", "dst/nested/two").await.unwrap();
        assert_eq!(store.get("dst/nested/two").await.unwrap(), b"payload");

        let missing = store.copy("src/none", "dst/three").await.unwrap_err();
        assert!(missing.is_not_found());
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let (_dir, store) = create_store(ChecksumAlgorithm::Sha256);
        for key in ["", "/etc/passwd", "a/../../b", "a//b", "a\\b", "./a"] {
            let result = store.put(key, vec![0]).await;
            assert!(
                matches!(result, Err(StorageError::InvalidKey { .. })),
                "key {:?} was accepted",
                key
            );
        }
    }

    #[tokio::test]
    async fn test_streaming_write_and_read() {
        let (dir, store) = create_store(ChecksumAlgorithm::Sha256);
        let mut writer = store.writer("tasks/t1/source/f1/big.mkv").await.unwrap();
        writer.write_chunk(b"abc").await.unwrap();
        writer.write_chunk(b"def").await.unwrap();

        // Nothing visible before finish.
        assert!(!dir.path().join("tasks/t1/source/f1/big.mkv").exists());
        assert_eq!(writer.finish().await.unwrap(), 6);

        let (size, stream) = store.read_stream("tasks/t1/source/f1/big.mkv").await.unwrap();
        let chunks: Vec<Vec<u8>> = stream.try_collect().await.unwrap();
        assert_eq!(size, 6);
        assert_eq!(chunks.concat(), b"abcdef");
    }

    #[tokio::test]
    async fn test_aborted_write_leaves_nothing() {
        let (dir, store) = create_store(ChecksumAlgorithm::Sha256);
        let mut writer = store.writer("x/y.mp4").await.unwrap();
        writer.write_chunk(b"partial").await.unwrap();
        writer.abort().await;

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("x")).unwrap().collect();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_presigned_urls() {
        let (_dir, store) = create_store(ChecksumAlgorithm::Sha256);
        let url = store
            .upload_url("tasks/t1/source/f1/a.mov", Duration::hours(1))
            .unwrap();
        assert!(url.url.contains("/api/v1/objects/tasks/t1/source/f1/a.mov?expires="));
        assert!(url.expires_at > Utc::now());

        assert!(store.download_url("../x", Duration::hours(1)).is_err());
    }

    #[tokio::test]
    async fn test_longest_filename_fits_every_derived_key() {
        use crate::preset::QualityPreset;
        use crate::storage::keys;

        let (_dir, store) = create_store(ChecksumAlgorithm::Sha256);
        let filename = format!("{}.a", "x".repeat(keys::MAX_SOURCE_FILENAME_LEN - 2));

        for key in [
            keys::source_key("t1", "f1", &filename),
            keys::attempt_output_key("t1", "f1", &filename, QualityPreset::HighPlus),
            keys::output_key("t1", "f1", &filename),
            keys::metadata_key("t1", "f1", &filename),
        ] {
            store.put(&key, b"x".to_vec()).await.unwrap();
            let mut writer = store.writer(&key).await.unwrap();
            writer.write_chunk(b"y").await.unwrap();
            writer.finish().await.unwrap();
            assert_eq!(store.get(&key).await.unwrap(), b"y");
        }
    }
}
