//! Content-addressed audio store.
//!
//! Synthesized audio is persisted under file names derived from a content
//! fingerprint of the input text, so identical requests are served from disk
//! without touching the vendor again. Entries are immutable once written and
//! never expire. A small in-memory hot layer in front of the filesystem keeps
//! recently played clips out of the I/O path.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use moka::future::Cache as MokaCache;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Maximum total size of the in-memory hot layer.
const HOT_LAYER_BYTES: u64 = 64 * 1024 * 1024;

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// I/O error occurred during filesystem operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Hit/miss/write counters for the store.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    hits: RwLock<u64>,
    misses: RwLock<u64>,
    writes: RwLock<u64>,
}

impl StoreMetrics {
    /// Records a cache hit.
    pub fn record_hit(&self) {
        *self.hits.write() += 1;
    }

    /// Records a cache miss.
    pub fn record_miss(&self) {
        *self.misses.write() += 1;
    }

    /// Records a write.
    pub fn record_write(&self) {
        *self.writes.write() += 1;
    }

    /// Returns current statistics as a tuple (hits, misses, writes).
    pub fn get_stats(&self) -> (u64, u64, u64) {
        (*self.hits.read(), *self.misses.read(), *self.writes.read())
    }
}

/// Filesystem-backed store for synthesized audio, keyed by fingerprint-derived
/// file names (`<fingerprint>.<ext>`). Files are sharded into subdirectories
/// by the first two fingerprint characters to keep directory listings small.
pub struct AudioStore {
    dir: PathBuf,
    url_prefix: String,
    hot: MokaCache<String, Bytes>,
    metrics: StoreMetrics,
}

impl AudioStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    /// `url_prefix` is the path prefix under which the serving layer exposes
    /// the stored files (for example `/audio`).
    pub async fn open(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;

        let hot = MokaCache::builder()
            .weigher(|_key, value: &Bytes| value.len().try_into().unwrap_or(u32::MAX))
            .max_capacity(HOT_LAYER_BYTES)
            .build();

        Ok(Self {
            dir,
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
            hot,
            metrics: StoreMetrics::default(),
        })
    }

    /// Absolute path a given file name is (or would be) stored at.
    pub fn path_for(&self, file_name: &str) -> PathBuf {
        let shard = file_name.get(0..2).unwrap_or("_");
        self.dir.join(shard).join(file_name)
    }

    /// Public URL path for a stored file.
    pub fn url_for(&self, file_name: &str) -> String {
        format!("{}/{}", self.url_prefix, file_name)
    }

    /// Whether an entry exists, without reading it.
    pub async fn contains(&self, file_name: &str) -> bool {
        if self.hot.contains_key(file_name) {
            return true;
        }
        fs::try_exists(self.path_for(file_name)).await.unwrap_or(false)
    }

    /// Retrieve an entry. A disk hit is promoted into the hot layer.
    pub async fn get(&self, file_name: &str) -> Result<Option<Bytes>> {
        if let Some(bytes) = self.hot.get(file_name).await {
            self.metrics.record_hit();
            debug!("hot cache hit: {}", file_name);
            return Ok(Some(bytes));
        }

        match fs::read(self.path_for(file_name)).await {
            Ok(data) => {
                let bytes = Bytes::from(data);
                self.hot.insert(file_name.to_string(), bytes.clone()).await;
                self.metrics.record_hit();
                debug!("disk cache hit: {}", file_name);
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.metrics.record_miss();
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persist an entry and return its path.
    ///
    /// The write goes to a temporary file first and is moved into place with a
    /// rename, so a concurrent reader never observes a partial file. Writing
    /// the same file name twice is harmless: content addressing guarantees the
    /// bytes are identical.
    pub async fn put(&self, file_name: &str, bytes: Bytes) -> Result<PathBuf> {
        let path = self.path_for(file_name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &path).await?;

        debug!("stored {} ({} bytes)", file_name, bytes.len());
        self.hot.insert(file_name.to_string(), bytes).await;
        self.metrics.record_write();
        Ok(path)
    }

    /// Returns the store metrics.
    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    /// Root directory of the store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = TempDir::new().unwrap();
        let store = AudioStore::open(dir.path(), "/audio").await.unwrap();

        store
            .put("abcd1234.wav", Bytes::from_static(b"RIFFdata"))
            .await
            .unwrap();

        let result = store.get("abcd1234.wav").await.unwrap();
        assert_eq!(result, Some(Bytes::from_static(b"RIFFdata")));
        assert!(store.contains("abcd1234.wav").await);
    }

    #[tokio::test]
    async fn test_missing_entry_is_none() {
        let dir = TempDir::new().unwrap();
        let store = AudioStore::open(dir.path(), "/audio").await.unwrap();

        assert_eq!(store.get("ffff0000.wav").await.unwrap(), None);
        assert!(!store.contains("ffff0000.wav").await);
    }

    #[tokio::test]
    async fn test_files_are_sharded_by_prefix() {
        let dir = TempDir::new().unwrap();
        let store = AudioStore::open(dir.path(), "/audio").await.unwrap();

        let path = store
            .put("beef7777.wav", Bytes::from_static(b"x"))
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("be").join("beef7777.wav"));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_rewrite_is_harmless() {
        let dir = TempDir::new().unwrap();
        let store = AudioStore::open(dir.path(), "/audio").await.unwrap();

        store.put("aa11.wav", Bytes::from_static(b"same")).await.unwrap();
        store.put("aa11.wav", Bytes::from_static(b"same")).await.unwrap();

        assert_eq!(
            store.get("aa11.wav").await.unwrap(),
            Some(Bytes::from_static(b"same"))
        );
    }

    #[tokio::test]
    async fn test_disk_entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = AudioStore::open(dir.path(), "/audio").await.unwrap();
            store.put("cafe0001.mp3", Bytes::from_static(b"mp3")).await.unwrap();
        }

        let reopened = AudioStore::open(dir.path(), "/audio").await.unwrap();
        assert_eq!(
            reopened.get("cafe0001.mp3").await.unwrap(),
            Some(Bytes::from_static(b"mp3"))
        );
    }

    #[tokio::test]
    async fn test_url_mapping() {
        let dir = TempDir::new().unwrap();
        let store = AudioStore::open(dir.path(), "/audio/").await.unwrap();
        assert_eq!(store.url_for("abcd.wav"), "/audio/abcd.wav");
    }

    #[tokio::test]
    async fn test_metrics() {
        let dir = TempDir::new().unwrap();
        let store = AudioStore::open(dir.path(), "/audio").await.unwrap();

        store.put("k1.wav", Bytes::from_static(b"v")).await.unwrap();
        let _ = store.get("k1.wav").await; // Hit
        let _ = store.get("k2.wav").await; // Miss

        let (hits, misses, writes) = store.metrics().get_stats();
        assert_eq!(hits, 1);
        assert_eq!(misses, 1);
        assert_eq!(writes, 1);
    }
}
