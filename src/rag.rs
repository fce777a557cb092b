//! RAG orchestration for the chat endpoint.
//!
//! `perform` resolves the chat provider, builds a permission-scoped tool
//! set, and drives the conversation to a final assistant message. Its
//! contract is that it never propagates an error to the route: internal
//! failures are logged in full and replaced with a fixed apology string.

use anyhow::{bail, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, warn};

use crate::chat::{ChatProvider, Completion, ToolSpec, Turn};
use crate::config::{McpServerConfig, OutputModelConfig};
use crate::mcp::McpClient;
use crate::models::{ChatMessage, WorkspaceAccess};
use crate::prompt::build_system_prompt;
use crate::retriever::{Retriever, WorkspaceFilter};
use crate::tools::{static_tool, McpTool, RetrieveTool, ToolRegistry};

const APOLOGY: &str =
    "I'm sorry, but I ran into a problem while answering. Please try again later.";

/// Approximate token count: total characters divided by four, rounded up.
pub fn tokens(messages: &[ChatMessage]) -> usize {
    let total_chars: usize = messages.iter().map(|m| m.content.chars().count()).sum();
    total_chars.div_ceil(4)
}

/// Reject conversations over the configured maxima before any model call.
pub fn check_limits(messages: &[ChatMessage], model: &OutputModelConfig) -> Result<()> {
    let chat = &model.chat;
    if messages.len() > chat.max_messages {
        bail!(
            "Conversation is too long. Max number of messages exceeds {}",
            chat.max_messages
        );
    }
    for message in messages {
        if message.content.chars().count() > chat.max_message_length {
            bail!("Max message length exceeds {}", chat.max_message_length);
        }
    }
    let total_tokens = tokens(messages);
    if total_tokens > chat.max_tokens {
        bail!(
            "Conversation is too long. Token count exceeds {}",
            chat.max_tokens
        );
    }
    Ok(())
}

/// Everything `perform` needs beyond the per-request arguments.
pub struct RagContext {
    pub retriever: Arc<Retriever>,
    /// Names of the static built-in tools enabled in config.
    pub tools: Vec<String>,
    pub mcp_servers: Vec<McpServerConfig>,
}

impl RagContext {
    /// Produce the assistant's reply. Never returns an error; failures
    /// become a fixed apology so callers can pass the result straight
    /// through.
    pub async fn perform(
        &self,
        model: &OutputModelConfig,
        messages: &[ChatMessage],
        permissions: &[WorkspaceAccess],
    ) -> String {
        match self.run(model, messages, permissions).await {
            Ok(response) => response,
            Err(e) => {
                error!("rag pipeline failed for model {}: {:#}", model.id, e);
                APOLOGY.to_string()
            }
        }
    }

    async fn run(
        &self,
        model: &OutputModelConfig,
        messages: &[ChatMessage],
        permissions: &[WorkspaceAccess],
    ) -> Result<String> {
        let provider = ChatProvider::new(&model.chat)?;
        let filter = WorkspaceFilter::from_permissions(permissions);

        let mut registry = ToolRegistry::new();
        registry.register(Box::new(RetrieveTool::new(self.retriever.clone(), filter.clone())));
        for name in &self.tools {
            match static_tool(name) {
                Some(tool) => registry.register(tool),
                None => warn!("skipping unknown static tool {}", name),
            }
        }

        // MCP discovery failures disable that server for the request only
        let mut mcp_instructions = Vec::new();
        for server in &self.mcp_servers {
            let client = match McpClient::new(server) {
                Ok(client) => Arc::new(client),
                Err(e) => {
                    warn!("skipping mcp server {}: {:#}", server.name, e);
                    continue;
                }
            };
            match client.list_tools().await {
                Ok(infos) => {
                    for info in &infos {
                        registry.register(Box::new(McpTool::new(client.clone(), info)));
                    }
                    if let Some(instructions) = &client.instructions {
                        mcp_instructions.push((client.name.clone(), instructions.clone()));
                    }
                }
                Err(e) => warn!("tool discovery failed for {}: {:#}", server.name, e),
            }
        }

        let system_prompt = build_system_prompt(&registry, &mcp_instructions);

        if provider.supports_tools() {
            self.run_tool_loop(&provider, model, &system_prompt, &registry, messages)
                .await
        } else {
            self.run_context_stuffing(&provider, &system_prompt, messages, &filter)
                .await
        }
    }

    /// Native tool-calling: offer the registry to the model and execute
    /// requested calls for a bounded number of rounds.
    async fn run_tool_loop(
        &self,
        provider: &ChatProvider,
        model: &OutputModelConfig,
        system_prompt: &str,
        registry: &ToolRegistry,
        messages: &[ChatMessage],
    ) -> Result<String> {
        let specs: Vec<ToolSpec> = registry
            .tools()
            .iter()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect();

        let mut turns = vec![Turn::System(system_prompt.to_string())];
        turns.extend(messages.iter().map(to_turn));

        for _ in 0..model.chat.max_tool_rounds {
            match provider.complete(&turns, &specs).await? {
                Completion::Text(text) => return Ok(text),
                Completion::ToolCalls(calls) => {
                    turns.push(Turn::AssistantToolCalls(calls.clone()));
                    for call in calls {
                        let content = self.execute_call(registry, &call.name, &call.arguments).await;
                        turns.push(Turn::ToolResult {
                            call_id: call.id,
                            content,
                        });
                    }
                }
            }
        }

        // Rounds exhausted: force a final text answer without tools
        match provider.complete(&turns, &[]).await? {
            Completion::Text(text) => Ok(text),
            Completion::ToolCalls(_) => bail!("model kept requesting tools after final round"),
        }
    }

    async fn execute_call(&self, registry: &ToolRegistry, name: &str, arguments: &str) -> String {
        let Some(tool) = registry.find(name) else {
            warn!("model requested unknown tool {}", name);
            return format!("Error: unknown tool '{}'", name);
        };
        let params: Value = match serde_json::from_str(arguments) {
            Ok(params) => params,
            Err(e) => {
                warn!("bad arguments for tool {}: {}", name, e);
                return format!("Error: invalid arguments for '{}'", name);
            }
        };
        match tool.execute(params).await {
            Ok(result) => result,
            Err(e) => {
                warn!("tool {} failed: {:#}", name, e);
                format!("Error: tool '{}' failed", name)
            }
        }
    }

    /// Retrieval-chain variant for providers without native tool calls:
    /// retrieve once with the conversation as the query and stuff the
    /// results into the prompt.
    async fn run_context_stuffing(
        &self,
        provider: &ChatProvider,
        system_prompt: &str,
        messages: &[ChatMessage],
        filter: &WorkspaceFilter,
    ) -> Result<String> {
        let chat_context = messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let context = match self.retriever.retrieve(&chat_context, filter).await {
            Ok(chunks) => chunks
                .iter()
                .map(|chunk| chunk.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
            Err(e) => {
                warn!("retrieval failed, continuing without context: {:#}", e);
                String::new()
            }
        };

        let turns = vec![
            Turn::System(system_prompt.to_string()),
            Turn::User(format!("Context: {}", context)),
            Turn::User(format!("Question: {}", chat_context)),
        ];

        match provider.complete(&turns, &[]).await? {
            Completion::Text(text) => Ok(text),
            Completion::ToolCalls(_) => bail!("provider returned tool calls unexpectedly"),
        }
    }
}

fn to_turn(message: &ChatMessage) -> Turn {
    match message.role.as_str() {
        "assistant" => Turn::Assistant(message.content.clone()),
        "system" => Turn::System(message.content.clone()),
        _ => Turn::User(message.content.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChatConfig, ChatProviderKind};

    fn model(max_messages: usize, max_message_length: usize, max_tokens: usize) -> OutputModelConfig {
        OutputModelConfig {
            id: "test-model".to_string(),
            owned_by: "tests".to_string(),
            chat: ChatConfig {
                provider: ChatProviderKind::OpenAI,
                model: "gpt-test".to_string(),
                api_key: None,
                base_url: None,
                temperature: 0.2,
                max_messages,
                max_message_length,
                max_tokens,
                max_tool_rounds: 4,
            },
        }
    }

    fn msg(content: &str) -> ChatMessage {
        ChatMessage::new("user", content)
    }

    #[test]
    fn test_tokens_rounds_up() {
        assert_eq!(tokens(&[msg("abcd")]), 1);
        assert_eq!(tokens(&[msg("abcde")]), 2);
        assert_eq!(tokens(&[]), 0);
        assert_eq!(tokens(&[msg("ab"), msg("cd")]), 1);
    }

    #[test]
    fn test_tokens_counts_chars_not_bytes() {
        // 4 chars, 12 bytes
        assert_eq!(tokens(&[msg("あいうえ")]), 1);
        assert_eq!(tokens(&[msg("あいうえお")]), 2);
    }

    #[test]
    fn test_limits_message_length_counts_chars() {
        let model = model(10, 5, 1000);
        assert!(check_limits(&[msg("あいうえお")], &model).is_ok());
        assert!(check_limits(&[msg("あいうえおか")], &model).is_err());
    }

    #[test]
    fn test_tokens_monotonic() {
        let short = tokens(&[msg("hello")]);
        let long = tokens(&[msg("hello"), msg("more text here")]);
        assert!(long >= short);
    }

    #[test]
    fn test_limits_message_count() {
        let model = model(2, 1000, 1000);
        let messages = vec![msg("a"), msg("b"), msg("c")];
        assert!(check_limits(&messages, &model).is_err());
        assert!(check_limits(&messages[..2], &model).is_ok());
    }

    #[test]
    fn test_limits_message_length() {
        let model = model(10, 5, 1000);
        assert!(check_limits(&[msg("short")], &model).is_ok());
        assert!(check_limits(&[msg("too long")], &model).is_err());
    }

    #[test]
    fn test_limits_token_count() {
        let model = model(10, 1000, 3);
        // 12 chars = 3 tokens, at the boundary
        assert!(check_limits(&[msg("abcdefghijkl")], &model).is_ok());
        // 13 chars = 4 tokens, over
        assert!(check_limits(&[msg("abcdefghijklm")], &model).is_err());
    }
}
