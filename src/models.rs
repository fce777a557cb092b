//! Core data models shared by the API server and the indexing pipeline.

use serde::{Deserialize, Serialize};

/// One source file registered with the document API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub workspace_id: String,
    pub file_path: String,
    pub file_remote: Option<String>,
    pub file_md5_hash: Option<String>,
    pub created_at: i64,
    pub updated_at: Option<i64>,
    pub last_checked_at: Option<i64>,
}

/// One observed content hash of a document, with chunk progress.
#[derive(Debug, Clone)]
pub struct Version {
    pub id: String,
    pub document_remote_id: String,
    pub file_path: String,
    pub file_md5_hash: String,
    pub total_chunks: i64,
    pub completed_chunks: i64,
    pub processed_at: Option<i64>,
    pub created_at: i64,
}

/// A bounded span of a document's text, the unit of embedding.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: i64,
    pub text: String,
}

/// A chat message in the OpenAI wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// A caller's access to one workspace, derived from a permission grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceAccess {
    pub workspace: String,
    pub read: bool,
    pub write: bool,
}

/// One retrieved chunk with its owning document, for citation.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub content: String,
    pub document_id: String,
    pub file_path: String,
    pub score: f32,
}
