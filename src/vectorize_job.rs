//! Vectorize job: convert, chunk, embed, and upload changed documents.

use anyhow::{Context, Result};
use futures::future::try_join_all;
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::backend::{BackendClient, ListFlags};
use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::markdown::to_plain_text;
use crate::models::{Chunk, Document, Version};
use crate::storage::StorageBackend;
use crate::versions;

/// Chunks embedded and uploaded concurrently per batch.
const CONCURRENT_LIMIT: usize = 8;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct VectorizeReport {
    pub processed_documents: u64,
    pub uploaded_chunks: u64,
}

/// One vectorize pass. Candidates come from the API (documents not
/// freshly updated); a document qualifies when its recorded hash differs
/// from the latest locally observed version. Documents are processed
/// sequentially; a failure is logged and the siblings continue.
pub async fn run_vectorize(
    config: &Config,
    storage: &dyn StorageBackend,
    backend: &BackendClient,
    embedder: &Embedder,
    cache: &SqlitePool,
) -> Result<VectorizeReport> {
    let documents = backend
        .list_documents(ListFlags {
            omit_last_updated: true,
            ..Default::default()
        })
        .await?;
    info!("Loaded {} document(s)", documents.len());

    let mut report = VectorizeReport::default();

    for document in &documents {
        let Some(latest) = versions::latest_version(cache, &document.id).await? else {
            continue;
        };
        if document.file_md5_hash.as_deref() == Some(latest.file_md5_hash.as_str()) {
            continue;
        }

        match process_document(config, storage, backend, embedder, cache, document, &latest)
            .await
        {
            Ok(uploaded) => {
                report.processed_documents += 1;
                report.uploaded_chunks += uploaded;
            }
            Err(e) => error!("error vectorizing {}: {:#}", document.file_path, e),
        }
    }

    Ok(report)
}

async fn process_document(
    config: &Config,
    storage: &dyn StorageBackend,
    backend: &BackendClient,
    embedder: &Embedder,
    cache: &SqlitePool,
    document: &Document,
    latest: &Version,
) -> Result<u64> {
    info!("Loaded file: {}", document.file_path);
    let mut completed = latest.completed_chunks as usize;

    backend.delete_embeddings(&document.id).await?;

    let remote = document.file_remote.as_deref();
    let data = storage
        .open(&document.file_path, &latest.file_md5_hash, remote)
        .await
        .with_context(|| format!("opening {}", document.file_path))?;

    let text = to_plain_text(&String::from_utf8_lossy(&data));
    let chunks = chunk_text(&text, config.chunking.max_tokens);
    if chunks.is_empty() {
        warn!("No chunks found in: {}", document.file_path);
        return Ok(0);
    }

    info!("Started processing total of {} chunks.", chunks.len());
    let mut uploaded = 0u64;

    while completed < chunks.len() {
        let batch: &[Chunk] = &chunks[completed..(completed + CONCURRENT_LIMIT).min(chunks.len())];

        try_join_all(batch.iter().map(|chunk| async {
            let vector = embedder.embed_query(&chunk.text).await?;
            backend
                .add_embedding(&document.id, &chunk.text, &vector)
                .await
        }))
        .await?;

        completed += batch.len();
        uploaded += batch.len() as u64;
        versions::update_progress(
            cache,
            &document.id,
            &latest.file_md5_hash,
            chunks.len() as i64,
            completed as i64,
        )
        .await?;
        if completed == chunks.len() {
            backend
                .update_document(&document.id, &latest.file_md5_hash)
                .await?;
        }
        info!(
            "Processed {} chunks, completed a total of {} chunks.",
            batch.len(),
            completed
        );
    }

    Ok(uploaded)
}
