//! Schema migrations, idempotent by construction.
//!
//! The API database holds `documents` and `embeddings`; the CLI keeps a
//! separate local cache with `versions` (per-hash chunk progress). Both
//! are created by `rgw init`. `DB_MIGRATIONS_APPLY=false` skips migration
//! on server startup for deployments that manage schema out of band.

use anyhow::Result;
use sqlx::SqlitePool;

/// Create the API-side tables (`documents`, `embeddings`).
pub async fn run_api_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            workspace_id TEXT NOT NULL,
            file_path TEXT NOT NULL,
            file_remote TEXT,
            file_md5_hash TEXT,
            created_at INTEGER NOT NULL DEFAULT (unixepoch()),
            updated_at INTEGER,
            last_checked_at INTEGER,
            UNIQUE(workspace_id, file_path)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embeddings (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            content TEXT NOT NULL,
            metadata TEXT,
            embedding BLOB,
            created_at INTEGER NOT NULL DEFAULT (unixepoch()),
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_embeddings_document_id ON embeddings(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_workspace ON documents(workspace_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the CLI-side version cache table.
pub async fn run_cache_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS versions (
            id TEXT PRIMARY KEY,
            document_remote_id TEXT NOT NULL,
            file_path TEXT NOT NULL,
            file_md5_hash TEXT NOT NULL,
            total_chunks INTEGER NOT NULL DEFAULT 0,
            completed_chunks INTEGER NOT NULL DEFAULT 0,
            processed_at INTEGER,
            created_at INTEGER NOT NULL DEFAULT (unixepoch()),
            UNIQUE(document_remote_id, file_md5_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_versions_document ON versions(document_remote_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
