//! Version rows in the CLI's local cache database.
//!
//! A version is one observed content hash of a remote document plus the
//! chunk progress made against it. The vectorize job resumes from
//! `completed_chunks` after an interrupted run.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::Version;

pub async fn has_version(
    pool: &SqlitePool,
    document_remote_id: &str,
    file_md5_hash: &str,
) -> Result<bool> {
    let row = sqlx::query(
        "SELECT id FROM versions WHERE document_remote_id = ? AND file_md5_hash = ?",
    )
    .bind(document_remote_id)
    .bind(file_md5_hash)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

pub async fn create_version(
    pool: &SqlitePool,
    document_remote_id: &str,
    file_path: &str,
    file_md5_hash: &str,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO versions (id, document_remote_id, file_path, file_md5_hash) VALUES (?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(document_remote_id)
    .bind(file_path)
    .bind(file_md5_hash)
    .execute(pool)
    .await?;
    Ok(id)
}

/// Most recently created version for a document, if any.
pub async fn latest_version(
    pool: &SqlitePool,
    document_remote_id: &str,
) -> Result<Option<Version>> {
    let row = sqlx::query(
        "SELECT * FROM versions WHERE document_remote_id = ? ORDER BY created_at DESC, rowid DESC LIMIT 1",
    )
    .bind(document_remote_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| Version {
        id: row.get("id"),
        document_remote_id: row.get("document_remote_id"),
        file_path: row.get("file_path"),
        file_md5_hash: row.get("file_md5_hash"),
        total_chunks: row.get("total_chunks"),
        completed_chunks: row.get("completed_chunks"),
        processed_at: row.get("processed_at"),
        created_at: row.get("created_at"),
    }))
}

/// Persist chunk progress; the version is marked processed once every
/// chunk is done.
pub async fn update_progress(
    pool: &SqlitePool,
    document_remote_id: &str,
    file_md5_hash: &str,
    total_chunks: i64,
    completed_chunks: i64,
) -> Result<()> {
    if total_chunks == completed_chunks {
        sqlx::query(
            "UPDATE versions SET total_chunks = ?, completed_chunks = ?, processed_at = unixepoch() \
             WHERE document_remote_id = ? AND file_md5_hash = ?",
        )
    } else {
        sqlx::query(
            "UPDATE versions SET total_chunks = ?, completed_chunks = ? \
             WHERE document_remote_id = ? AND file_md5_hash = ?",
        )
    }
    .bind(total_chunks)
    .bind(completed_chunks)
    .bind(document_remote_id)
    .bind(file_md5_hash)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_versions(pool: &SqlitePool, document_remote_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM versions WHERE document_remote_id = ?")
        .bind(document_remote_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;

    async fn pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        migrate::run_cache_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_version_lifecycle() {
        let pool = pool().await;

        assert!(!has_version(&pool, "doc-1", "hash-a").await.unwrap());
        create_version(&pool, "doc-1", "notes/a.md", "hash-a")
            .await
            .unwrap();
        assert!(has_version(&pool, "doc-1", "hash-a").await.unwrap());

        let latest = latest_version(&pool, "doc-1").await.unwrap().unwrap();
        assert_eq!(latest.file_md5_hash, "hash-a");
        assert_eq!(latest.completed_chunks, 0);
    }

    #[tokio::test]
    async fn test_progress_marks_processed_when_complete() {
        let pool = pool().await;
        create_version(&pool, "doc-1", "notes/a.md", "hash-a")
            .await
            .unwrap();

        update_progress(&pool, "doc-1", "hash-a", 10, 4).await.unwrap();
        let version = latest_version(&pool, "doc-1").await.unwrap().unwrap();
        assert_eq!(version.completed_chunks, 4);
        assert!(version.processed_at.is_none());

        update_progress(&pool, "doc-1", "hash-a", 10, 10).await.unwrap();
        let version = latest_version(&pool, "doc-1").await.unwrap().unwrap();
        assert!(version.processed_at.is_some());
    }

    #[tokio::test]
    async fn test_latest_version_picks_newest() {
        let pool = pool().await;
        create_version(&pool, "doc-1", "notes/a.md", "hash-a")
            .await
            .unwrap();
        create_version(&pool, "doc-1", "notes/a.md", "hash-b")
            .await
            .unwrap();

        let latest = latest_version(&pool, "doc-1").await.unwrap().unwrap();
        assert_eq!(latest.file_md5_hash, "hash-b");
    }

    #[tokio::test]
    async fn test_delete_versions() {
        let pool = pool().await;
        create_version(&pool, "doc-1", "notes/a.md", "hash-a")
            .await
            .unwrap();
        delete_versions(&pool, "doc-1").await.unwrap();
        assert!(latest_version(&pool, "doc-1").await.unwrap().is_none());
    }
}
