//! End-to-end tests for the indexing pipeline: index, vectorize (with
//! checkpoint resume), reduce, and retrieval over the stored vectors.
//!
//! The jobs run in-process against a real API server on an ephemeral
//! port and a stub embedding upstream.

use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use sqlx::Row;
use tempfile::TempDir;

use rag_gateway::backend::BackendClient;
use rag_gateway::config::{
    BackendConfig, Config, EmbeddingConfig, EmbeddingProviderKind, PermissionGrant,
    WorkspaceConfig,
};
use rag_gateway::embedding::Embedder;
use rag_gateway::models::WorkspaceAccess;
use rag_gateway::retriever::{Retriever, WorkspaceFilter};
use rag_gateway::server::{router, AppState};
use rag_gateway::{db, index_job, migrate, reduce_job, vectorize_job, versions};

const API_KEY: &str = "pipeline-key";

async fn spawn_api(config: Config) -> (String, sqlx::SqlitePool, TempDir) {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect(&tmp.path().join("api.sqlite")).await.unwrap();
    migrate::run_api_migrations(&pool).await.unwrap();

    let state = AppState::new(Arc::new(config), pool.clone()).unwrap();
    let app = router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), pool, tmp)
}

/// Ollama-shaped embedding stub: one fixed vector per input text.
async fn spawn_embed_stub() -> String {
    async fn embed(Json(body): Json<Value>) -> Json<Value> {
        let count = body["input"].as_array().map(|a| a.len()).unwrap_or(0);
        let vectors: Vec<Value> = (0..count).map(|_| json!([1.0, 0.0])).collect();
        Json(json!({ "embeddings": vectors }))
    }

    let app = Router::new().route("/api/embed", post(embed));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

struct Env {
    config: Config,
    api_pool: sqlx::SqlitePool,
    cache: sqlx::SqlitePool,
    backend: BackendClient,
    embedder: Embedder,
    docs_dir: std::path::PathBuf,
    _tmp: TempDir,
    _api_tmp: TempDir,
}

async fn setup() -> Env {
    let tmp = TempDir::new().unwrap();
    let docs_dir = tmp.path().join("docs");
    fs::create_dir_all(&docs_dir).unwrap();

    let mut config = Config::minimal();
    config.permissions = vec![PermissionGrant {
        users: vec![],
        api_keys: vec![API_KEY.to_string()],
        workspaces: vec!["notes:rw".to_string()],
    }];
    let (api_base, api_pool, api_tmp) = spawn_api(config.clone()).await;

    let embed_base = spawn_embed_stub().await;
    config.embeddings = EmbeddingConfig {
        provider: EmbeddingProviderKind::Ollama,
        model: Some("stub-embed".to_string()),
        dims: Some(2),
        api_key: None,
        base_url: Some(embed_base),
        max_retries: 0,
        timeout_secs: 30,
    };
    config.backend = BackendConfig {
        base_url: api_base,
        api_key: Some(API_KEY.to_string()),
    };
    config.workspaces = vec![WorkspaceConfig {
        id: "notes".to_string(),
        remote: None,
        dirs: vec![docs_dir.to_string_lossy().to_string()],
        extensions: vec!["md".to_string(), "txt".to_string()],
    }];

    let cache = db::connect(&tmp.path().join("cache.sqlite")).await.unwrap();
    migrate::run_cache_migrations(&cache).await.unwrap();

    let backend = BackendClient::new(&config.backend).unwrap();
    let embedder = Embedder::new(&config.embeddings).unwrap();

    Env {
        config,
        api_pool,
        cache,
        backend,
        embedder,
        docs_dir,
        _tmp: tmp,
        _api_tmp: api_tmp,
    }
}

async fn embedding_count(pool: &sqlx::SqlitePool) -> i64 {
    sqlx::query("SELECT COUNT(*) AS n FROM embeddings")
        .fetch_one(pool)
        .await
        .unwrap()
        .get("n")
}

#[tokio::test]
async fn test_index_is_idempotent() {
    let env = setup().await;
    let storage = rag_gateway::storage::from_config(&env.config).unwrap();

    fs::write(env.docs_dir.join("a.md"), "# Alpha\n\nFirst document.").unwrap();
    fs::write(env.docs_dir.join("b.txt"), "Second document, plain text.").unwrap();
    fs::write(env.docs_dir.join("skip.bin"), [0u8, 1, 2]).unwrap();

    let report = index_job::run_index(&env.config, storage.as_ref(), &env.backend, &env.cache)
        .await
        .unwrap();
    assert_eq!(report.created_documents, 2);
    assert_eq!(report.created_versions, 2);

    // Unchanged files produce nothing new
    let report = index_job::run_index(&env.config, storage.as_ref(), &env.backend, &env.cache)
        .await
        .unwrap();
    assert_eq!(report.created_documents, 0);
    assert_eq!(report.created_versions, 0);

    // A content change yields a new version for the same document
    fs::write(env.docs_dir.join("a.md"), "# Alpha\n\nEdited.").unwrap();
    let report = index_job::run_index(&env.config, storage.as_ref(), &env.backend, &env.cache)
        .await
        .unwrap();
    assert_eq!(report.created_documents, 0);
    assert_eq!(report.created_versions, 1);
}

#[tokio::test]
async fn test_vectorize_and_retrieve() {
    let env = setup().await;
    let storage = rag_gateway::storage::from_config(&env.config).unwrap();

    fs::write(
        env.docs_dir.join("a.md"),
        "# Alpha\n\nHello world paragraph about gateways.",
    )
    .unwrap();
    index_job::run_index(&env.config, storage.as_ref(), &env.backend, &env.cache)
        .await
        .unwrap();

    let report = vectorize_job::run_vectorize(
        &env.config,
        storage.as_ref(),
        &env.backend,
        &env.embedder,
        &env.cache,
    )
    .await
    .unwrap();
    assert_eq!(report.processed_documents, 1);
    assert!(report.uploaded_chunks >= 1);
    assert!(embedding_count(&env.api_pool).await >= 1);

    // The document now carries the vectorized hash, so a second pass is a no-op
    let report = vectorize_job::run_vectorize(
        &env.config,
        storage.as_ref(),
        &env.backend,
        &env.embedder,
        &env.cache,
    )
    .await
    .unwrap();
    assert_eq!(report.processed_documents, 0);

    // Retrieval sees the stored vectors for a permitted workspace
    let retriever = Retriever::new(env.api_pool.clone(), Arc::new(env.embedder), 4);
    let filter = WorkspaceFilter::from_permissions(&[WorkspaceAccess {
        workspace: "notes".to_string(),
        read: true,
        write: true,
    }]);
    let chunks = retriever.retrieve("gateways", &filter).await.unwrap();
    assert!(!chunks.is_empty());
    assert!(chunks[0].content.contains("Hello world"));

    // ...and nothing for a workspace outside the grant
    let other = WorkspaceFilter::from_permissions(&[WorkspaceAccess {
        workspace: "elsewhere".to_string(),
        read: true,
        write: false,
    }]);
    assert!(retriever.retrieve("gateways", &other).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_vectorize_resumes_from_checkpoint() {
    let env = setup().await;
    let storage = rag_gateway::storage::from_config(&env.config).unwrap();

    // Three 8-char paragraphs; max_tokens=2 caps a chunk at 8 chars
    let mut config = env.config.clone();
    config.chunking.max_tokens = 2;
    fs::write(env.docs_dir.join("long.txt"), "aaaa aaa\n\nbbbb bbb\n\ncccc ccc").unwrap();

    index_job::run_index(&config, storage.as_ref(), &env.backend, &env.cache)
        .await
        .unwrap();

    let document = env
        .backend
        .get_document("notes", &env.docs_dir.join("long.txt").to_string_lossy(), None, None)
        .await
        .unwrap()
        .unwrap();
    let latest = versions::latest_version(&env.cache, &document.id)
        .await
        .unwrap()
        .unwrap();

    // Simulate an interrupted run that had finished one of three chunks
    versions::update_progress(&env.cache, &document.id, &latest.file_md5_hash, 3, 1)
        .await
        .unwrap();

    let report = vectorize_job::run_vectorize(
        &config,
        storage.as_ref(),
        &env.backend,
        &env.embedder,
        &env.cache,
    )
    .await
    .unwrap();
    assert_eq!(report.processed_documents, 1);
    assert_eq!(report.uploaded_chunks, 2);
    assert_eq!(embedding_count(&env.api_pool).await, 2);

    let version = versions::latest_version(&env.cache, &document.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(version.completed_chunks, 3);
    assert!(version.processed_at.is_some());

    let document = env
        .backend
        .get_document("notes", &env.docs_dir.join("long.txt").to_string_lossy(), None, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(document.file_md5_hash.as_deref(), Some(latest.file_md5_hash.as_str()));
}

#[tokio::test]
async fn test_reduce_removes_documents_for_missing_files() {
    let env = setup().await;
    let storage = rag_gateway::storage::from_config(&env.config).unwrap();

    fs::write(env.docs_dir.join("keep.md"), "# Keep\n\nStays around.").unwrap();
    fs::write(env.docs_dir.join("gone.md"), "# Gone\n\nWill be deleted.").unwrap();
    index_job::run_index(&env.config, storage.as_ref(), &env.backend, &env.cache)
        .await
        .unwrap();
    vectorize_job::run_vectorize(
        &env.config,
        storage.as_ref(),
        &env.backend,
        &env.embedder,
        &env.cache,
    )
    .await
    .unwrap();

    fs::remove_file(env.docs_dir.join("gone.md")).unwrap();

    let report = reduce_job::run_reduce(storage.as_ref(), &env.backend, &env.cache)
        .await
        .unwrap();
    assert_eq!(report.checked_documents, 2);
    assert_eq!(report.removed_documents, 1);

    // The survivor is still there; the removed one took its versions along
    let kept = env
        .backend
        .get_document("notes", &env.docs_dir.join("keep.md").to_string_lossy(), None, None)
        .await
        .unwrap();
    assert!(kept.is_some());
    let gone = env
        .backend
        .get_document("notes", &env.docs_dir.join("gone.md").to_string_lossy(), None, None)
        .await
        .unwrap();
    assert!(gone.is_none());

    // Freshly checked rows are rate-limited out of the next pass
    let report = reduce_job::run_reduce(storage.as_ref(), &env.backend, &env.cache)
        .await
        .unwrap();
    assert_eq!(report.checked_documents, 0);
}
