//! Chat completion providers.
//!
//! OpenAI-compatible endpoints carry the tool-calling loop; Google's
//! generateContent API takes retrieved context inline instead, so its
//! provider ignores tool specs and the orchestrator stuffs context into
//! the prompt.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::{ChatConfig, ChatProviderKind};

/// One tool offered to the model for a completion call.
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON-encoded arguments as returned by the provider.
    pub arguments: String,
}

/// One turn of the provider-side conversation.
#[derive(Debug, Clone)]
pub enum Turn {
    System(String),
    User(String),
    Assistant(String),
    AssistantToolCalls(Vec<ToolCall>),
    ToolResult { call_id: String, content: String },
}

/// What the model came back with.
pub enum Completion {
    Text(String),
    ToolCalls(Vec<ToolCall>),
}

pub struct ChatProvider {
    config: ChatConfig,
    client: reqwest::Client,
}

impl ChatProvider {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("building chat http client")?;
        Ok(Self {
            config: config.clone(),
            client,
        })
    }

    /// Whether the provider runs the native tool-calling protocol.
    pub fn supports_tools(&self) -> bool {
        matches!(self.config.provider, ChatProviderKind::OpenAI)
    }

    pub async fn complete(&self, turns: &[Turn], tools: &[ToolSpec]) -> Result<Completion> {
        match self.config.provider {
            ChatProviderKind::OpenAI => self.complete_openai(turns, tools).await,
            ChatProviderKind::Google => self.complete_google(turns).await,
        }
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("chat.api_key required"))
    }

    async fn complete_openai(&self, turns: &[Turn], tools: &[ToolSpec]) -> Result<Completion> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1");
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));

        let messages: Vec<Value> = turns.iter().map(openai_message).collect();
        let mut body = json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "messages": messages,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(
                tools
                    .iter()
                    .map(|tool| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": tool.name,
                                "description": tool.description,
                                "parameters": tool.parameters,
                            }
                        })
                    })
                    .collect(),
            );
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key()?)
            .json(&body)
            .send()
            .await
            .context("calling chat completions")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("chat API error {}: {}", status, body_text);
        }

        let json: Value = response.json().await?;
        let message = json
            .pointer("/choices/0/message")
            .ok_or_else(|| anyhow::anyhow!("chat response missing choices"))?;

        if let Some(calls) = message.get("tool_calls").and_then(|c| c.as_array()) {
            if !calls.is_empty() {
                let tool_calls = calls
                    .iter()
                    .map(|call| {
                        Ok(ToolCall {
                            id: call
                                .get("id")
                                .and_then(|v| v.as_str())
                                .unwrap_or_default()
                                .to_string(),
                            name: call
                                .pointer("/function/name")
                                .and_then(|v| v.as_str())
                                .ok_or_else(|| anyhow::anyhow!("tool call missing name"))?
                                .to_string(),
                            arguments: call
                                .pointer("/function/arguments")
                                .and_then(|v| v.as_str())
                                .unwrap_or("{}")
                                .to_string(),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                return Ok(Completion::ToolCalls(tool_calls));
            }
        }

        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();
        Ok(Completion::Text(content))
    }

    async fn complete_google(&self, turns: &[Turn]) -> Result<Completion> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://generativelanguage.googleapis.com/v1beta");
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            base_url.trim_end_matches('/'),
            self.config.model,
            self.api_key()?
        );

        let mut system_text = String::new();
        let mut contents: Vec<Value> = Vec::new();
        for turn in turns {
            match turn {
                Turn::System(text) => {
                    if !system_text.is_empty() {
                        system_text.push_str("\n\n");
                    }
                    system_text.push_str(text);
                }
                Turn::User(text) | Turn::ToolResult { content: text, .. } => {
                    contents.push(json!({ "role": "user", "parts": [{ "text": text }] }));
                }
                Turn::Assistant(text) => {
                    contents.push(json!({ "role": "model", "parts": [{ "text": text }] }));
                }
                Turn::AssistantToolCalls(_) => {}
            }
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": { "temperature": self.config.temperature },
        });
        if !system_text.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": system_text }] });
        }

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("calling generateContent")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("chat API error {}: {}", status, body_text);
        }

        let json: Value = response.json().await?;
        let text = json
            .pointer("/candidates/0/content/parts")
            .and_then(|parts| parts.as_array())
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        Ok(Completion::Text(text))
    }
}

fn openai_message(turn: &Turn) -> Value {
    match turn {
        Turn::System(text) => json!({ "role": "system", "content": text }),
        Turn::User(text) => json!({ "role": "user", "content": text }),
        Turn::Assistant(text) => json!({ "role": "assistant", "content": text }),
        Turn::AssistantToolCalls(calls) => json!({
            "role": "assistant",
            "content": Value::Null,
            "tool_calls": calls.iter().map(|call| json!({
                "id": call.id,
                "type": "function",
                "function": { "name": call.name, "arguments": call.arguments },
            })).collect::<Vec<_>>(),
        }),
        Turn::ToolResult { call_id, content } => json!({
            "role": "tool",
            "tool_call_id": call_id,
            "content": content,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_message_shapes() {
        let system = openai_message(&Turn::System("be helpful".into()));
        assert_eq!(system["role"], "system");

        let calls = openai_message(&Turn::AssistantToolCalls(vec![ToolCall {
            id: "call_1".into(),
            name: "retrieve_documents".into(),
            arguments: "{\"query\":\"x\"}".into(),
        }]));
        assert_eq!(calls["tool_calls"][0]["function"]["name"], "retrieve_documents");
        assert!(calls["content"].is_null());

        let result = openai_message(&Turn::ToolResult {
            call_id: "call_1".into(),
            content: "found it".into(),
        });
        assert_eq!(result["role"], "tool");
        assert_eq!(result["tool_call_id"], "call_1");
    }
}
