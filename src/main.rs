//! # RAG Gateway CLI (`rgw`)
//!
//! The `rgw` binary runs the API server and the indexing jobs that feed it.
//! One configuration file drives both sides.
//!
//! ## Usage
//!
//! ```bash
//! rgw --config ./rag-gateway.yml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rgw init` | Create both SQLite databases and run schema migrations |
//! | `rgw serve` | Start the chat + document API server |
//! | `rgw index` | Register workspace files as documents and versions |
//! | `rgw vectorize` | Chunk, embed, and upload changed documents |
//! | `rgw reduce` | Remove documents whose backing file disappeared |
//! | `rgw schedule` | Run all three jobs on their configured intervals |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the databases
//! rgw init --config ./rag-gateway.yml
//!
//! # Start the API server
//! rgw serve --config ./rag-gateway.yml
//!
//! # One indexing pass over every workspace
//! rgw index --config ./rag-gateway.yml
//!
//! # Embed everything the index pass picked up
//! rgw vectorize --config ./rag-gateway.yml
//!
//! # Run the whole pipeline on a timer
//! rgw schedule --config ./rag-gateway.yml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rag_gateway::backend::BackendClient;
use rag_gateway::embedding::Embedder;
use rag_gateway::{
    config, db, index_job, migrate, reduce_job, scheduler, server, storage, vectorize_job,
};

/// RAG Gateway CLI — an OpenAI-compatible chat gateway with
/// retrieval-augmented generation and a file indexing pipeline.
///
/// All commands accept a `--config` flag pointing to a YAML configuration
/// file. The `CONFIG_PATH` environment variable overrides the default path.
#[derive(Parser)]
#[command(
    name = "rgw",
    about = "RAG Gateway — an OpenAI-compatible chat gateway with retrieval-augmented generation",
    version,
    long_about = "RAG Gateway serves an OpenAI-compatible chat API grounded in documents \
    retrieved from a SQLite vector store, and ships the indexing jobs that discover, chunk, \
    and embed those documents from local directories or rclone remotes."
)]
struct Cli {
    /// Path to configuration file (YAML).
    ///
    /// Defaults to `./rag-gateway.yml`, or `CONFIG_PATH` when set. All
    /// server, workspace, provider, and permission settings are read from
    /// this file; `SECTION__KEY` environment variables override scalars.
    #[arg(long, global = true, env = "CONFIG_PATH", default_value = "./rag-gateway.yml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize both database schemas.
    ///
    /// Creates the API database (documents, embeddings) and the job cache
    /// database (versions). This command is idempotent — running it multiple
    /// times is safe.
    Init,

    /// Start the HTTP API server.
    ///
    /// Serves the OpenAI-compatible chat API under `/v1` and the document
    /// management API the indexing jobs talk to.
    Serve,

    /// Run one indexing pass.
    ///
    /// Lists every workspace directory, hashes the files, and registers a
    /// document (via the API) and a version row (locally) for each.
    Index,

    /// Run one vectorize pass.
    ///
    /// Converts, chunks, and embeds documents whose recorded hash differs
    /// from the latest observed version, uploading vectors through the API.
    /// Interrupted documents resume from their last completed chunk.
    Vectorize,

    /// Run one reduce pass.
    ///
    /// Checks documents against the storage backend and deletes those whose
    /// backing file no longer exists, embeddings included.
    Reduce,

    /// Run index, vectorize, and reduce on their configured intervals.
    ///
    /// Each job runs on its own timer; a pass that outlasts its interval
    /// delays the next trigger instead of overlapping it. Runs until the
    /// process is terminated.
    Schedule,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let api = db::connect(&cfg.db.path).await?;
            migrate::run_api_migrations(&api).await?;
            let cache = db::connect(&cfg.db.cache_path).await?;
            migrate::run_cache_migrations(&cache).await?;
            println!("Databases initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Index => {
            let cache = cache_pool(&cfg).await?;
            let storage = storage::from_config(&cfg)?;
            let backend = BackendClient::new(&cfg.backend)?;
            let report = index_job::run_index(&cfg, storage.as_ref(), &backend, &cache).await?;
            println!(
                "Created {} document(s), {} version(s).",
                report.created_documents, report.created_versions
            );
        }
        Commands::Vectorize => {
            let cache = cache_pool(&cfg).await?;
            let storage = storage::from_config(&cfg)?;
            let backend = BackendClient::new(&cfg.backend)?;
            let embedder = Embedder::new(&cfg.embeddings)?;
            let report =
                vectorize_job::run_vectorize(&cfg, storage.as_ref(), &backend, &embedder, &cache)
                    .await?;
            println!(
                "Vectorized {} document(s), {} chunk(s).",
                report.processed_documents, report.uploaded_chunks
            );
        }
        Commands::Reduce => {
            let cache = cache_pool(&cfg).await?;
            let storage = storage::from_config(&cfg)?;
            let backend = BackendClient::new(&cfg.backend)?;
            let report = reduce_job::run_reduce(storage.as_ref(), &backend, &cache).await?;
            println!(
                "Checked {} document(s), removed {}.",
                report.checked_documents, report.removed_documents
            );
        }
        Commands::Schedule => {
            scheduler::run_schedule(&cfg).await?;
        }
    }

    Ok(())
}

async fn cache_pool(cfg: &config::Config) -> anyhow::Result<sqlx::SqlitePool> {
    let cache = db::connect(&cfg.db.cache_path).await?;
    migrate::run_cache_migrations(&cache).await?;
    Ok(cache)
}
