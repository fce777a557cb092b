//! HTTP API server.
//!
//! Two surfaces share one router: the OpenAI-compatible chat API under
//! `/v1` (consumed by chat frontends) and the document management API
//! (consumed by the indexing CLI). Chat routes authenticate with a
//! bearer token or the Open WebUI identity pair; document routes with
//! an api key or bearer token.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/v1/chat/completions` | Non-streaming chat completion |
//! | `GET`  | `/v1/models` | List configured output models |
//! | `GET`  | `/v1/models/{model}` | Single model object |
//! | `GET`  | `/document` | Look up one document by headers |
//! | `GET`  | `/documents` | Page of documents for the jobs |
//! | `POST` | `/documents` | Register a document |
//! | `PUT`  | `/documents/{id}` | Record a vectorized hash |
//! | `DELETE` | `/documents/{id}` | Delete document (+ embeddings) |
//! | `POST` | `/documents/{id}/embeddings` | Store one chunk vector |
//! | `DELETE` | `/documents/{id}/embeddings` | Drop a document's vectors |
//! | `GET`  | `/health` | Health check |

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use uuid::Uuid;

use crate::api_types::{
    missing_required_fields, model_object, no_model_found, streaming_not_supported, unauthorized,
    ChatCompletionRequest, ChatCompletionResponse, Choice, Usage,
};
use crate::auth::{authorize_chat, authorize_documents};
use crate::config::Config;
use crate::embedding::{vec_to_blob, Embedder};
use crate::models::{ChatMessage, Document};
use crate::rag::{check_limits, tokens, RagContext};
use crate::retriever::Retriever;
use crate::{db, migrate};

/// Documents re-qualify for a check/update pass after this many seconds.
const RECHECK_INTERVAL_SECS: i64 = 60;
/// Page size for `GET /documents`.
const DOCUMENTS_PAGE_LIMIT: i64 = 10;

#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
    rag: Arc<RagContext>,
}

impl AppState {
    /// Assemble the shared state from an already-connected pool.
    pub fn new(config: Arc<Config>, pool: SqlitePool) -> anyhow::Result<Self> {
        let embedder = Arc::new(Embedder::new(&config.embeddings)?);
        let retriever = Arc::new(Retriever::new(pool.clone(), embedder, config.retriever.k));
        let rag = Arc::new(RagContext {
            retriever,
            tools: config.tools.clone(),
            mcp_servers: config.mcp_servers.clone(),
        });
        Ok(Self { config, pool, rag })
    }
}

pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = db::connect(&config.db.path).await?;

    let apply_migrations = std::env::var("DB_MIGRATIONS_APPLY")
        .map(|v| v != "false")
        .unwrap_or(true);
    if apply_migrations {
        migrate::run_api_migrations(&pool).await?;
    }

    let state = AppState::new(Arc::new(config.clone()), pool)?;
    let app = router(state);

    info!("API server listening on http://{}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/chat/completions", post(handle_chat_completions))
        .route("/v1/models", get(handle_list_models))
        .route("/v1/models/{model}", get(handle_get_model))
        .route("/document", get(handle_get_document))
        .route("/documents", get(handle_list_documents))
        .route("/documents", post(handle_create_document))
        .route("/documents/{id}", put(handle_update_document))
        .route("/documents/{id}", delete(handle_delete_document))
        .route("/documents/{id}/embeddings", post(handle_create_embedding))
        .route(
            "/documents/{id}/embeddings",
            delete(handle_delete_embeddings),
        )
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, unauthorized())
    }

    fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, json!({ "error": message }))
    }

    fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, json!({ "error": message }))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        error!("database error: {:#}", e);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "Internal server error" }),
        )
    }
}

// ============ Chat surface ============

async fn handle_chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<ChatCompletionResponse>, ApiError> {
    let permissions = authorize_chat(&headers, &state.config.permissions)
        .map_err(|_| ApiError::unauthorized())?;

    let request: ChatCompletionRequest = serde_json::from_value(body)
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, missing_required_fields()))?;

    let Some(model) = state.config.output_model(&request.model) else {
        error!("no model found with name {}", request.model);
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            no_model_found(&request.model),
        ));
    };
    if request.stream {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            streaming_not_supported(),
        ));
    }

    check_limits(&request.messages, model).map_err(|e| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            json!({
                "error": {
                    "message": e.to_string(),
                    "type": "invalid_request_error",
                    "param": "messages",
                    "code": "invalid_request",
                }
            }),
        )
    })?;

    let rag_response = state
        .rag
        .perform(model, &request.messages, &permissions)
        .await;

    let prompt_tokens = tokens(&request.messages);
    let completion_tokens = tokens(&[ChatMessage::new("assistant", rag_response.clone())]);

    Ok(Json(ChatCompletionResponse {
        id: format!("chatcmpl-{}", Uuid::new_v4()),
        object: "chat.completion",
        created: Utc::now().timestamp(),
        model: request.model,
        choices: vec![Choice {
            index: 0,
            message: ChatMessage::new("assistant", rag_response),
            finish_reason: "stop",
        }],
        usage: Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        },
    }))
}

async fn handle_list_models(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    authorize_chat(&headers, &state.config.permissions).map_err(|_| ApiError::unauthorized())?;

    let created = Utc::now().timestamp();
    let data: Vec<Value> = state
        .config
        .output_models
        .iter()
        .map(|m| model_object(&m.id, &m.owned_by, created))
        .collect();
    Ok(Json(json!({ "object": "list", "data": data })))
}

async fn handle_get_model(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(model): Path<String>,
) -> Result<Json<Value>, ApiError> {
    authorize_chat(&headers, &state.config.permissions).map_err(|_| ApiError::unauthorized())?;

    match state.config.output_model(&model) {
        Some(m) => Ok(Json(model_object(&m.id, &m.owned_by, Utc::now().timestamp()))),
        None => Err(ApiError::new(StatusCode::NOT_FOUND, no_model_found(&model))),
    }
}

// ============ Document surface ============

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn header_flag(headers: &HeaderMap, name: &str) -> bool {
    header_str(headers, name)
        .map(|value| value == "true" || value == "1")
        .unwrap_or(false)
}

fn document_from_row(row: &sqlx::sqlite::SqliteRow) -> Document {
    Document {
        id: row.get("id"),
        workspace_id: row.get("workspace_id"),
        file_path: row.get("file_path"),
        file_remote: row.get("file_remote"),
        file_md5_hash: row.get("file_md5_hash"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        last_checked_at: row.get("last_checked_at"),
    }
}

async fn handle_get_document(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Document>, ApiError> {
    authorize_documents(&headers, &state.config.permissions)
        .map_err(|_| ApiError::unauthorized())?;

    let id = header_str(&headers, "x-id");
    let file_path = header_str(&headers, "x-file-path");
    let file_md5_hash = header_str(&headers, "x-file-hash");
    let workspace_id = header_str(&headers, "x-workspace-id");

    if id.is_none() && file_path.is_none() && file_md5_hash.is_none() && workspace_id.is_none() {
        return Err(ApiError::bad_request("Required fields missing"));
    }

    // Every provided header narrows the lookup
    let mut sql = String::from("SELECT * FROM documents WHERE 1=1");
    let mut binds: Vec<&str> = Vec::new();
    for (column, value) in [
        ("id", id),
        ("file_path", file_path),
        ("file_md5_hash", file_md5_hash),
        ("workspace_id", workspace_id),
    ] {
        if let Some(value) = value {
            sql.push_str(&format!(" AND {} = ?", column));
            binds.push(value);
        }
    }

    let mut query = sqlx::query(&sql);
    for value in binds {
        query = query.bind(value);
    }
    let row = query.fetch_optional(&state.pool).await?;

    match row {
        Some(row) => Ok(Json(document_from_row(&row))),
        None => Err(ApiError::not_found("Document not found")),
    }
}

async fn handle_create_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    authorize_documents(&headers, &state.config.permissions)
        .map_err(|_| ApiError::unauthorized())?;

    let workspace_id = body.get("workspace_id").and_then(|v| v.as_str());
    let file_path = body.get("file_path").and_then(|v| v.as_str());
    let file_remote = body.get("file_remote").and_then(|v| v.as_str());
    let (Some(workspace_id), Some(file_path)) = (workspace_id, file_path) else {
        return Err(ApiError::bad_request(
            "workspace_id and file_path are required",
        ));
    };

    let existing = sqlx::query("SELECT id FROM documents WHERE workspace_id = ? AND file_path = ?")
        .bind(workspace_id)
        .bind(file_path)
        .fetch_optional(&state.pool)
        .await?;
    if let Some(row) = existing {
        let id: String = row.get("id");
        return Ok((
            StatusCode::CONFLICT,
            Json(json!({
                "error": "Document with this path already exists",
                "id": id,
            })),
        )
            .into_response());
    }

    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO documents (id, workspace_id, file_path, file_remote) VALUES (?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(workspace_id)
    .bind(file_path)
    .bind(file_remote)
    .execute(&state.pool)
    .await?;

    let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.pool)
        .await?;
    Ok((StatusCode::CREATED, Json(document_from_row(&row))).into_response())
}

async fn handle_update_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    authorize_documents(&headers, &state.config.permissions)
        .map_err(|_| ApiError::unauthorized())?;

    let Some(file_md5_hash) = body.get("file_md5_hash").and_then(|v| v.as_str()) else {
        return Err(ApiError::bad_request("id, file_md5_hash are required"));
    };

    let result = sqlx::query("UPDATE documents SET file_md5_hash = ? WHERE id = ?")
        .bind(file_md5_hash)
        .bind(&id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Document not found"));
    }

    Ok(Json(json!({ "id": id, "file_md5_hash": file_md5_hash })))
}

async fn handle_list_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Document>>, ApiError> {
    authorize_documents(&headers, &state.config.permissions)
        .map_err(|_| ApiError::unauthorized())?;

    let mark_last_checked = header_flag(&headers, "x-mark-last-checked-at");
    let omit_last_checked = header_flag(&headers, "x-omit-last-checked");
    let omit_last_updated = header_flag(&headers, "x-omit-last-updated");

    let cutoff = Utc::now().timestamp() - RECHECK_INTERVAL_SECS;

    let mut sql = String::from("SELECT * FROM documents WHERE 1=1");
    if omit_last_checked {
        sql.push_str(" AND (last_checked_at IS NULL OR last_checked_at < ?)");
    }
    if omit_last_updated {
        sql.push_str(" AND (updated_at IS NULL OR updated_at < ?)");
    }
    sql.push_str(" ORDER BY updated_at ASC, last_checked_at ASC LIMIT ?");

    let mut query = sqlx::query(&sql);
    if omit_last_checked {
        query = query.bind(cutoff);
    }
    if omit_last_updated {
        query = query.bind(cutoff);
    }
    query = query.bind(DOCUMENTS_PAGE_LIMIT);

    let rows = query.fetch_all(&state.pool).await?;
    let documents: Vec<Document> = rows.iter().map(document_from_row).collect();
    info!("Loaded {} document records.", documents.len());

    if mark_last_checked && !documents.is_empty() {
        let placeholders = vec!["?"; documents.len()].join(", ");
        let update_sql = format!(
            "UPDATE documents SET last_checked_at = unixepoch() WHERE id IN ({})",
            placeholders
        );
        let mut update = sqlx::query(&update_sql);
        for document in &documents {
            update = update.bind(&document.id);
        }
        update.execute(&state.pool).await?;
    }

    Ok(Json(documents))
}

async fn handle_delete_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    authorize_documents(&headers, &state.config.permissions)
        .map_err(|_| ApiError::unauthorized())?;

    // Embeddings go with it via ON DELETE CASCADE
    let result = sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(&id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Document not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_create_embedding(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    authorize_documents(&headers, &state.config.permissions)
        .map_err(|_| ApiError::unauthorized())?;

    let chunk_text = body.get("chunk_text").and_then(|v| v.as_str());
    let embedding = body.get("embedding").and_then(|v| v.as_array());
    let (Some(chunk_text), Some(embedding)) = (chunk_text, embedding) else {
        return Err(ApiError::bad_request(
            "embedding (array) and chunk_text (string) are required",
        ));
    };
    let vector: Vec<f32> = embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect();

    let document = sqlx::query("SELECT id FROM documents WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.pool)
        .await?;
    if document.is_none() {
        return Err(ApiError::not_found("Document not found"));
    }

    let embedding_id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO embeddings (id, document_id, content, embedding) VALUES (?, ?, ?, ?)",
    )
    .bind(&embedding_id)
    .bind(&id)
    .bind(chunk_text)
    .bind(vec_to_blob(&vector))
    .execute(&state.pool)
    .await?;

    // The parent document counts as freshly updated
    sqlx::query("UPDATE documents SET updated_at = unixepoch() WHERE id = ?")
        .bind(&id)
        .execute(&state.pool)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": embedding_id,
            "document_id": id,
            "content": chunk_text,
        })),
    )
        .into_response())
}

async fn handle_delete_embeddings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    authorize_documents(&headers, &state.config.permissions)
        .map_err(|_| ApiError::unauthorized())?;

    let document = sqlx::query("SELECT id FROM documents WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.pool)
        .await?;
    if document.is_none() {
        return Err(ApiError::not_found("Document not found"));
    }

    let result = sqlx::query("DELETE FROM embeddings WHERE document_id = ?")
        .bind(&id)
        .execute(&state.pool)
        .await?;
    let deleted = result.rows_affected();

    Ok(Json(json!({
        "message": format!("Deleted {} embeddings", deleted),
        "deleted_count": deleted,
    })))
}

// ============ GET /health ============

async fn handle_health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
