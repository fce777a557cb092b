//! Reduce job: garbage-collect documents whose file disappeared.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::{error, info};

use crate::backend::{BackendClient, ListFlags};
use crate::storage::StorageBackend;
use crate::versions;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReduceReport {
    pub checked_documents: u64,
    pub removed_documents: u64,
}

/// One reduce pass. The server rate-limits re-checks by marking
/// `last_checked_at` on the rows it hands out; a document is removed
/// (with its embeddings and local versions) only when the storage
/// backend reports its file gone. Check failures are logged and skipped.
pub async fn run_reduce(
    storage: &dyn StorageBackend,
    backend: &BackendClient,
    cache: &SqlitePool,
) -> Result<ReduceReport> {
    let documents = backend
        .list_documents(ListFlags {
            mark_last_checked_at: true,
            omit_last_checked: true,
            ..Default::default()
        })
        .await?;
    info!("Loaded {} documents.", documents.len());

    let mut report = ReduceReport::default();

    for document in &documents {
        report.checked_documents += 1;
        let remote = document.file_remote.as_deref();
        match storage.exists(&document.file_path, remote).await {
            Ok(true) => {}
            Ok(false) => {
                backend.delete_document(&document.id).await?;
                versions::delete_versions(cache, &document.id).await?;
                report.removed_documents += 1;
                info!("Removed document for missing file: {}", document.file_path);
            }
            Err(e) => error!("error checking {}: {:#}", document.file_path, e),
        }
    }

    Ok(report)
}
