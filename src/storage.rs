//! Storage backend abstraction.
//!
//! The indexing jobs are polymorphic over where workspace files live: a
//! local filesystem or a remote reachable through the rclone
//! remote-control API. Both expose the same four operations; the jobs
//! never know which is active.

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{Config, StorageProvider};
use crate::storage_local::LocalStorage;
use crate::storage_rclone::RcloneStorage;

/// A file path paired with its MD5 content hash.
#[derive(Debug, Clone)]
pub struct HashedFile {
    pub file: String,
    pub hash: String,
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// List files under `dir` whose extension is in `allowed_exts`.
    ///
    /// Listing failures are reported as errors; callers treat them as an
    /// empty result for that directory and log a warning.
    async fn list(
        &self,
        dir: &str,
        allowed_exts: &[String],
        remote: Option<&str>,
    ) -> Result<Vec<String>>;

    /// Compute MD5 hashes for the given files. Per-file failures are
    /// logged and the file is omitted from the result.
    async fn hash(&self, files: &[String], remote: Option<&str>) -> Vec<HashedFile>;

    /// Read a file, verifying its live hash still equals `expected_md5`.
    /// A mismatch means the file changed mid-pipeline and is an error.
    async fn open(&self, file: &str, expected_md5: &str, remote: Option<&str>) -> Result<Vec<u8>>;

    /// Whether the file still exists in storage.
    async fn exists(&self, file: &str, remote: Option<&str>) -> Result<bool>;
}

/// Construct the backend selected by the configuration.
pub fn from_config(config: &Config) -> Result<Box<dyn StorageBackend>> {
    match config.storage.provider {
        StorageProvider::Local => Ok(Box::new(LocalStorage)),
        StorageProvider::Rclone => {
            let opts = config
                .storage
                .opts
                .clone()
                .ok_or_else(|| anyhow::anyhow!("rclone storage requires storage.opts"))?;
            Ok(Box::new(RcloneStorage::new(opts)?))
        }
    }
}

/// Hex MD5 digest of a byte buffer.
pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Extract a lowercase file extension without the dot.
pub fn extension(path: &str) -> Option<String> {
    std::path::Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
}
