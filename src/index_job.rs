//! Index job: discover files and register documents/versions.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::backend::BackendClient;
use crate::config::Config;
use crate::storage::StorageBackend;
use crate::versions;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub created_documents: u64,
    pub created_versions: u64,
}

/// One pass over every workspace directory: list, hash, and upsert a
/// document (via the API) and a version row (locally) per file. A
/// listing failure yields an empty result for that directory; hashing
/// failures drop the file from the run.
pub async fn run_index(
    config: &Config,
    storage: &dyn StorageBackend,
    backend: &BackendClient,
    cache: &SqlitePool,
) -> Result<IndexReport> {
    let mut report = IndexReport::default();

    for workspace in &config.workspaces {
        let remote = workspace.remote.as_deref();
        for dir in &workspace.dirs {
            let files = match storage.list(dir, &workspace.extensions, remote).await {
                Ok(files) => files,
                Err(e) => {
                    warn!("error reading directory {}: {:#}", dir, e);
                    continue;
                }
            };
            let hashed = storage.hash(&files, remote).await;

            for entry in hashed {
                let document = match backend
                    .get_document(&workspace.id, &entry.file, None, None)
                    .await?
                {
                    Some(document) => document,
                    None => {
                        let created = backend
                            .create_document(&workspace.id, remote, &entry.file)
                            .await?;
                        report.created_documents += 1;
                        info!("Created document for file: {}", entry.file);
                        created
                    }
                };

                if !versions::has_version(cache, &document.id, &entry.hash).await? {
                    versions::create_version(cache, &document.id, &entry.file, &entry.hash)
                        .await?;
                    report.created_versions += 1;
                }
            }
        }
    }

    info!("Indexed {} file(s)", report.created_documents);
    info!("Versioned {} file(s)", report.created_versions);
    Ok(report)
}
