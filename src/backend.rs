//! HTTP client for the document management API.
//!
//! The indexing jobs never touch the API database directly; every
//! document and embedding mutation goes through these endpoints so the
//! CLI can run on a different host from the server.

use anyhow::{bail, Context, Result};
use reqwest::header::HeaderMap;
use serde_json::json;
use std::time::Duration;

use crate::config::BackendConfig;
use crate::models::Document;

pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

/// Header flags for `list_documents`, mirroring the server's
/// x-mark-last-checked-at / x-omit-* switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListFlags {
    pub mark_last_checked_at: bool,
    pub omit_last_checked: bool,
    pub omit_last_updated: bool,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("building backend http client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.api_key {
            if let Ok(value) = key.parse() {
                headers.insert("x-api-key", value);
            }
        }
        headers
    }

    /// Look up a single document by path + workspace (optionally hash or id).
    /// A 404 is a normal "not registered yet" answer, not an error.
    pub async fn get_document(
        &self,
        workspace_id: &str,
        file_path: &str,
        file_md5_hash: Option<&str>,
        id: Option<&str>,
    ) -> Result<Option<Document>> {
        let mut request = self
            .client
            .get(format!("{}/document", self.base_url))
            .headers(self.auth_headers())
            .header("x-workspace-id", workspace_id)
            .header("x-file-path", file_path);
        if let Some(hash) = file_md5_hash {
            request = request.header("x-file-hash", hash);
        }
        if let Some(id) = id {
            request = request.header("x-id", id);
        }

        let response = request.send().await.context("fetching document")?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            bail!("document lookup returned {}", status);
        }
        Ok(Some(response.json().await?))
    }

    pub async fn create_document(
        &self,
        workspace_id: &str,
        file_remote: Option<&str>,
        file_path: &str,
    ) -> Result<Document> {
        let response = self
            .client
            .post(format!("{}/documents", self.base_url))
            .headers(self.auth_headers())
            .json(&json!({
                "workspace_id": workspace_id,
                "file_remote": file_remote,
                "file_path": file_path,
            }))
            .send()
            .await
            .context("creating document")?;

        let status = response.status();
        if !status.is_success() {
            bail!("document create returned {}", status);
        }
        Ok(response.json().await?)
    }

    /// Record the fully vectorized hash on the remote document.
    pub async fn update_document(&self, id: &str, file_md5_hash: &str) -> Result<()> {
        let response = self
            .client
            .put(format!("{}/documents/{}", self.base_url, id))
            .headers(self.auth_headers())
            .json(&json!({ "file_md5_hash": file_md5_hash }))
            .send()
            .await
            .context("updating document")?;

        let status = response.status();
        if !status.is_success() {
            bail!("document update for {} returned {}", id, status);
        }
        Ok(())
    }

    pub async fn list_documents(&self, flags: ListFlags) -> Result<Vec<Document>> {
        let mut request = self
            .client
            .get(format!("{}/documents", self.base_url))
            .headers(self.auth_headers());
        if flags.mark_last_checked_at {
            request = request.header("x-mark-last-checked-at", "true");
        }
        if flags.omit_last_checked {
            request = request.header("x-omit-last-checked", "true");
        }
        if flags.omit_last_updated {
            request = request.header("x-omit-last-updated", "true");
        }

        let response = request.send().await.context("listing documents")?;
        let status = response.status();
        if !status.is_success() {
            bail!("document list returned {}", status);
        }
        Ok(response.json().await?)
    }

    /// Delete a document; the server cascades to its embeddings.
    pub async fn delete_document(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/documents/{}", self.base_url, id))
            .headers(self.auth_headers())
            .send()
            .await
            .context("deleting document")?;

        let status = response.status();
        if !status.is_success() {
            bail!("document delete for {} returned {}", id, status);
        }
        Ok(())
    }

    pub async fn add_embedding(
        &self,
        document_id: &str,
        chunk_text: &str,
        embedding: &[f32],
    ) -> Result<()> {
        let response = self
            .client
            .post(format!(
                "{}/documents/{}/embeddings",
                self.base_url, document_id
            ))
            .headers(self.auth_headers())
            .json(&json!({
                "chunk_text": chunk_text,
                "embedding": embedding,
            }))
            .send()
            .await
            .context("storing embedding")?;

        let status = response.status();
        if !status.is_success() {
            bail!("embedding store for {} returned {}", document_id, status);
        }
        Ok(())
    }

    pub async fn delete_embeddings(&self, document_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!(
                "{}/documents/{}/embeddings",
                self.base_url, document_id
            ))
            .headers(self.auth_headers())
            .send()
            .await
            .context("deleting embeddings")?;

        let status = response.status();
        if !status.is_success() {
            bail!("embedding delete for {} returned {}", document_id, status);
        }
        Ok(())
    }
}
