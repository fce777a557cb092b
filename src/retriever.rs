//! Permission-scoped vector retrieval over the embeddings table.
//!
//! Retrieval is restricted to embeddings whose owning document belongs
//! to a workspace the caller can read; the restriction is applied in SQL
//! before any similarity is computed, so unauthorized content never
//! enters the candidate set.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use crate::embedding::{blob_to_vec, cosine_similarity, Embedder};
use crate::models::{RetrievedChunk, WorkspaceAccess};

/// The set of workspace ids a retrieval call may touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceFilter {
    pub workspace_ids: Vec<String>,
}

impl WorkspaceFilter {
    /// Keep only the workspaces the caller has read access to.
    pub fn from_permissions(permissions: &[WorkspaceAccess]) -> Self {
        let workspace_ids = permissions
            .iter()
            .filter(|access| access.read)
            .map(|access| access.workspace.clone())
            .collect();
        Self { workspace_ids }
    }

    pub fn is_empty(&self) -> bool {
        self.workspace_ids.is_empty()
    }
}

pub struct Retriever {
    pool: SqlitePool,
    embedder: Arc<Embedder>,
    k: usize,
}

impl Retriever {
    pub fn new(pool: SqlitePool, embedder: Arc<Embedder>, k: usize) -> Self {
        Self { pool, embedder, k }
    }

    /// Top-k chunks by cosine similarity within the filtered workspaces.
    pub async fn retrieve(
        &self,
        query: &str,
        filter: &WorkspaceFilter,
    ) -> Result<Vec<RetrievedChunk>> {
        if filter.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed_query(query).await?;

        // sqlx has no array binds for SQLite; expand placeholders
        let placeholders = vec!["?"; filter.workspace_ids.len()].join(", ");
        let sql = format!(
            r#"
            SELECT e.content, e.document_id, e.embedding, d.file_path
            FROM embeddings e
            JOIN documents d ON d.id = e.document_id
            WHERE e.embedding IS NOT NULL
              AND d.workspace_id IN ({})
            "#,
            placeholders
        );

        let mut query_builder = sqlx::query(&sql);
        for workspace_id in &filter.workspace_ids {
            query_builder = query_builder.bind(workspace_id);
        }
        let rows = query_builder.fetch_all(&self.pool).await?;

        let mut candidates: Vec<RetrievedChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                RetrievedChunk {
                    content: row.get("content"),
                    document_id: row.get("document_id"),
                    file_path: row.get("file_path"),
                    score: cosine_similarity(&query_vec, &vec),
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(self.k);

        Ok(candidates)
    }
}
