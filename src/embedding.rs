//! Embedding providers and vector utilities.
//!
//! Three HTTP providers are supported — OpenAI-compatible, Ollama, and
//! Google Gemini — plus a `disabled` provider that fails every call.
//! The provider is selected once at config load; the rest of the crate
//! only sees [`Embedder`].
//!
//! Retry strategy for the HTTP providers:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::time::Duration;

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};

pub struct Embedder {
    config: EmbeddingConfig,
    client: reqwest::Client,
}

impl Embedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("building embedding http client")?;
        Ok(Self {
            config: config.clone(),
            client,
        })
    }

    pub fn dims(&self) -> usize {
        self.config.dims.unwrap_or(0)
    }

    /// Embed a batch of texts, returning one vector per input in order.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self.config.provider {
            EmbeddingProviderKind::Disabled => bail!("Embedding provider is disabled"),
            EmbeddingProviderKind::OpenAI => self.embed_openai(texts).await,
            EmbeddingProviderKind::Ollama => self.embed_ollama(texts).await,
            EmbeddingProviderKind::Google => self.embed_google(texts).await,
        }
    }

    /// Embed a single query text.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_texts(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }

    fn model(&self) -> Result<&str> {
        self.config
            .model
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("embeddings.model required"))
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("embeddings.api_key required"))
    }

    /// POST a JSON body with retry/backoff, returning the parsed response.
    async fn post_with_retry(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(url).json(body);
            if let Some(key) = bearer {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("embedding API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("embedding API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }

    async fn embed_openai(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1");
        let url = format!("{}/embeddings", base_url.trim_end_matches('/'));
        let body = json!({ "model": self.model()?, "input": texts });

        let json = self
            .post_with_retry(&url, Some(self.api_key()?), &body)
            .await?;

        let data = json
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing data array"))?;
        data.iter()
            .map(|item| {
                item.get("embedding")
                    .and_then(|e| e.as_array())
                    .map(json_floats)
                    .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing embedding"))
            })
            .collect()
    }

    async fn embed_ollama(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("http://127.0.0.1:11434");
        let url = format!("{}/api/embed", base_url.trim_end_matches('/'));
        let body = json!({ "model": self.model()?, "input": texts });

        let json = self.post_with_retry(&url, None, &body).await?;

        let embeddings = json
            .get("embeddings")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid ollama response: missing embeddings"))?;
        embeddings
            .iter()
            .map(|item| {
                item.as_array()
                    .map(json_floats)
                    .ok_or_else(|| anyhow::anyhow!("Invalid ollama response: non-array embedding"))
            })
            .collect()
    }

    async fn embed_google(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://generativelanguage.googleapis.com/v1beta");
        let model = self.model()?;
        let url = format!(
            "{}/models/{}:batchEmbedContents?key={}",
            base_url.trim_end_matches('/'),
            model,
            self.api_key()?
        );
        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|text| {
                json!({
                    "model": format!("models/{}", model),
                    "content": { "parts": [{ "text": text }] },
                })
            })
            .collect();
        let body = json!({ "requests": requests });

        let json = self.post_with_retry(&url, None, &body).await?;

        let embeddings = json
            .get("embeddings")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid google response: missing embeddings"))?;
        embeddings
            .iter()
            .map(|item| {
                item.get("values")
                    .and_then(|v| v.as_array())
                    .map(json_floats)
                    .ok_or_else(|| anyhow::anyhow!("Invalid google response: missing values"))
            })
            .collect()
    }
}

fn json_floats(values: &Vec<serde_json::Value>) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched
/// vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_empty_and_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_disabled_provider_errors() {
        let embedder = Embedder::new(&EmbeddingConfig::default()).unwrap();
        assert!(embedder.embed_query("hello").await.is_err());
    }
}
