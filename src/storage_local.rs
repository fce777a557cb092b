//! Local filesystem storage backend.

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::warn;
use walkdir::WalkDir;

use crate::storage::{extension, md5_hex, HashedFile, StorageBackend};

pub struct LocalStorage;

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn list(
        &self,
        dir: &str,
        allowed_exts: &[String],
        _remote: Option<&str>,
    ) -> Result<Vec<String>> {
        if !std::path::Path::new(dir).is_dir() {
            bail!("not a directory: {}", dir);
        }

        let mut results = Vec::new();
        for entry in WalkDir::new(dir) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("error accessing entry under {}: {}", dir, e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path().to_string_lossy().to_string();
            if let Some(ext) = extension(&path) {
                if allowed_exts.iter().any(|a| a.eq_ignore_ascii_case(&ext)) {
                    results.push(path);
                }
            }
        }

        // Deterministic ordering
        results.sort();
        Ok(results)
    }

    async fn hash(&self, files: &[String], _remote: Option<&str>) -> Vec<HashedFile> {
        let mut hashed = Vec::with_capacity(files.len());
        for file in files {
            match std::fs::read(file) {
                Ok(data) => hashed.push(HashedFile {
                    file: file.clone(),
                    hash: md5_hex(&data),
                }),
                Err(e) => warn!("error hashing file {}: {}", file, e),
            }
        }
        hashed
    }

    async fn open(&self, file: &str, expected_md5: &str, _remote: Option<&str>) -> Result<Vec<u8>> {
        let data = std::fs::read(file)?;
        let live_hash = md5_hex(&data);
        if live_hash != expected_md5 {
            bail!(
                "file {} changed since it was hashed (expected {}, got {})",
                file,
                expected_md5,
                live_hash
            );
        }
        Ok(data)
    }

    async fn exists(&self, file: &str, _remote: Option<&str>) -> Result<bool> {
        Ok(std::path::Path::new(file).exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_list_filters_by_extension() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.md"), "alpha").unwrap();
        fs::write(tmp.path().join("b.txt"), "beta").unwrap();
        fs::write(tmp.path().join("c.bin"), [0u8, 1, 2]).unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub/d.md"), "delta").unwrap();

        let storage = LocalStorage;
        let files = storage
            .list(
                tmp.path().to_str().unwrap(),
                &["md".to_string(), "txt".to_string()],
                None,
            )
            .await
            .unwrap();

        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|f| !f.ends_with(".bin")));
        assert!(files.iter().any(|f| f.ends_with("d.md")));
    }

    #[tokio::test]
    async fn test_list_missing_dir_is_error() {
        let storage = LocalStorage;
        assert!(storage
            .list("/definitely/not/here", &["md".to_string()], None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_hash_skips_unreadable_files() {
        let tmp = tempfile::tempdir().unwrap();
        let good = tmp.path().join("good.md");
        fs::write(&good, "hello").unwrap();

        let storage = LocalStorage;
        let hashed = storage
            .hash(
                &[
                    good.to_string_lossy().to_string(),
                    tmp.path().join("missing.md").to_string_lossy().to_string(),
                ],
                None,
            )
            .await;

        assert_eq!(hashed.len(), 1);
        assert_eq!(hashed[0].hash, md5_hex(b"hello"));
    }

    #[tokio::test]
    async fn test_open_verifies_hash() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("doc.md");
        fs::write(&path, "original").unwrap();
        let file = path.to_string_lossy().to_string();
        let hash = md5_hex(b"original");

        let storage = LocalStorage;
        assert_eq!(
            storage.open(&file, &hash, None).await.unwrap(),
            b"original".to_vec()
        );

        fs::write(&path, "changed underneath").unwrap();
        assert!(storage.open(&file, &hash, None).await.is_err());
    }

    #[tokio::test]
    async fn test_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("doc.md");
        fs::write(&path, "x").unwrap();
        let file = path.to_string_lossy().to_string();

        let storage = LocalStorage;
        assert!(storage.exists(&file, None).await.unwrap());
        fs::remove_file(&path).unwrap();
        assert!(!storage.exists(&file, None).await.unwrap());
    }
}
