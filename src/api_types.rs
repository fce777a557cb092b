//! Wire types for the OpenAI-compatible surface.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::ChatMessage;

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

#[derive(Debug, Serialize)]
pub struct Choice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// Static capability flags reported for every configured model.
fn model_capabilities() -> Value {
    json!({
        "vision": false,
        "function_calling": false,
        "tool_calling": false,
        "code_interpreter": false,
        "retrieval": false,
        "image_generation": false,
        "audio": false,
        "multimodal": false,
    })
}

pub fn model_object(id: &str, owned_by: &str, created: i64) -> Value {
    json!({
        "id": id,
        "owned_by": owned_by,
        "supports_streaming": false,
        "object": "model",
        "created": created,
        "capabilities": model_capabilities(),
    })
}

// OpenAI-shaped error bodies

pub fn no_model_found(model: &str) -> Value {
    json!({
        "error": {
            "message": format!("The model '{}' does not exist", model),
            "type": "invalid_request_error",
            "param": "model",
            "code": "model_not_found",
        }
    })
}

pub fn streaming_not_supported() -> Value {
    json!({
        "error": {
            "message": "Streaming is not supported by this model",
            "type": "invalid_request_error",
            "param": "stream",
            "code": "invalid_request",
        }
    })
}

pub fn missing_required_fields() -> Value {
    json!({
        "error": {
            "message": "Missing required fields: model and messages",
            "type": "invalid_request_error",
            "param": null,
            "code": "invalid_request",
        }
    })
}

pub fn unauthorized() -> Value {
    json!({
        "error": {
            "message": "Invalid authentication credentials",
            "type": "invalid_request_error",
            "param": null,
            "code": "invalid_api_key",
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            no_model_found("gpt-x")["error"]["code"],
            "model_not_found"
        );
        assert_eq!(
            streaming_not_supported()["error"]["param"],
            "stream"
        );
        assert_eq!(
            missing_required_fields()["error"]["code"],
            "invalid_request"
        );
    }

    #[test]
    fn test_model_object_shape() {
        let object = model_object("docs-assistant", "acme", 1_700_000_000);
        assert_eq!(object["object"], "model");
        assert_eq!(object["supports_streaming"], false);
        assert_eq!(object["capabilities"]["tool_calling"], false);
    }
}
