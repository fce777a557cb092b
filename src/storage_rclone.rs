//! Storage backend speaking the rclone remote-control API.
//!
//! Listing and hashing go through `operations/list` and
//! `operations/hashsum`; file content is fetched over the serve-http
//! surface at `GET {url}/[{remote}:]/{file}`. All calls carry HTTP basic
//! auth.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

use crate::config::RcloneOpts;
use crate::storage::{extension, md5_hex, HashedFile, StorageBackend};

pub struct RcloneStorage {
    client: reqwest::Client,
    opts: RcloneOpts,
}

#[derive(Deserialize)]
struct ListResponse {
    list: Vec<ListEntry>,
}

#[derive(Deserialize)]
struct ListEntry {
    #[serde(rename = "Path")]
    path: String,
    #[serde(rename = "IsDir")]
    is_dir: bool,
}

#[derive(Deserialize)]
struct HashsumResponse {
    hashsum: Vec<String>,
}

impl RcloneStorage {
    pub fn new(opts: RcloneOpts) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("building rclone http client")?;
        Ok(Self { client, opts })
    }

    async fn rc_call<T: serde::de::DeserializeOwned>(
        &self,
        op: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let response = self
            .client
            .post(format!("{}/{}", self.opts.url, op))
            .basic_auth(&self.opts.username, Some(&self.opts.password))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("calling rclone {}", op))?;

        let status = response.status();
        if !status.is_success() {
            bail!("rclone {} returned {}", op, status);
        }
        Ok(response.json::<T>().await?)
    }

    fn list_body(&self, dir: &str, remote: Option<&str>, recurse: bool) -> serde_json::Value {
        let mut body = json!({ "remote": dir });
        if let Some(remote) = remote {
            body["fs"] = json!(format!("{}:", remote));
        }
        if recurse {
            body["opt"] = json!({ "recurse": true });
        }
        body
    }
}

#[async_trait]
impl StorageBackend for RcloneStorage {
    async fn list(
        &self,
        dir: &str,
        allowed_exts: &[String],
        remote: Option<&str>,
    ) -> Result<Vec<String>> {
        let body = self.list_body(dir, remote, true);
        let data: ListResponse = self.rc_call("operations/list", body).await?;

        let mut results: Vec<String> = data
            .list
            .into_iter()
            .filter(|entry| !entry.is_dir)
            .map(|entry| entry.path)
            .filter(|file| {
                extension(file)
                    .map(|ext| allowed_exts.iter().any(|a| a.eq_ignore_ascii_case(&ext)))
                    .unwrap_or(false)
            })
            .collect();
        results.sort();
        Ok(results)
    }

    async fn hash(&self, files: &[String], remote: Option<&str>) -> Vec<HashedFile> {
        let mut hashed = Vec::with_capacity(files.len());
        for file in files {
            let fs = match remote {
                Some(remote) => format!("{}:{}", remote, file),
                None => file.clone(),
            };
            let body = json!({ "fs": fs, "hashType": "MD5", "download": true });
            match self
                .rc_call::<HashsumResponse>("operations/hashsum", body)
                .await
            {
                Ok(data) => {
                    // hashsum lines are "<hash>  <file>"
                    match data
                        .hashsum
                        .first()
                        .and_then(|line| line.split("  ").next())
                    {
                        Some(hash) if !hash.is_empty() => hashed.push(HashedFile {
                            file: file.clone(),
                            hash: hash.to_string(),
                        }),
                        _ => warn!("empty hashsum response for {}", file),
                    }
                }
                Err(e) => warn!("error hashing file {}: {:#}", file, e),
            }
        }
        hashed
    }

    async fn open(&self, file: &str, expected_md5: &str, remote: Option<&str>) -> Result<Vec<u8>> {
        let remote = remote.unwrap_or_default();
        let response = self
            .client
            .get(format!("{}/[{}:]/{}", self.opts.url, remote, file))
            .basic_auth(&self.opts.username, Some(&self.opts.password))
            .send()
            .await
            .with_context(|| format!("fetching {}", file))?;

        let status = response.status();
        if !status.is_success() {
            bail!("rclone fetch of {} returned {}", file, status);
        }

        let data = response.bytes().await?.to_vec();
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

    async fn exists(&self, file: &str, remote: Option<&str>) -> Result<bool> {
        let dir = std::path::Path::new(file)
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        let body = self.list_body(&dir, remote, false);
        let data: ListResponse = self.rc_call("operations/list", body).await?;
        Ok(data.list.iter().any(|entry| entry.path == *file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> RcloneStorage {
        RcloneStorage::new(RcloneOpts {
            url: "http://127.0.0.1:5572".to_string(),
            username: "u".to_string(),
            password: "p".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_list_body_with_remote() {
        let body = storage().list_body("notes", Some("gdrive"), true);
        assert_eq!(body["fs"], "gdrive:");
        assert_eq!(body["remote"], "notes");
        assert_eq!(body["opt"]["recurse"], true);
    }

    #[test]
    fn test_list_body_without_remote() {
        let body = storage().list_body("/data/notes", None, false);
        assert!(body.get("fs").is_none());
        assert!(body.get("opt").is_none());
    }

    #[test]
    fn test_hashsum_line_parsing() {
        let line = "900150983cd24fb0d6963f7d28e17f72  notes/a.md";
        assert_eq!(
            line.split("  ").next(),
            Some("900150983cd24fb0d6963f7d28e17f72")
        );
    }
}
