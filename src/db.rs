use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Open (creating if missing) a SQLite pool for the given file path.
///
/// `DB_PATH` overrides the configured path, matching the API server's
/// container deployment convention.
pub async fn connect(path: &Path) -> Result<SqlitePool> {
    let path = match std::env::var("DB_PATH") {
        Ok(p) if !p.is_empty() => std::path::PathBuf::from(p),
        _ => path.to_path_buf(),
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
