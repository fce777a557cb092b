//! Minimal MCP client: JSON-RPC 2.0 over HTTP.
//!
//! Only the two methods the chat pipeline needs are implemented:
//! `tools/list` for discovery and `tools/call` for invocation.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::McpServerConfig;

pub struct McpClient {
    client: reqwest::Client,
    pub name: String,
    url: String,
    pub instructions: Option<String>,
}

/// A tool advertised by an MCP server.
#[derive(Debug, Clone, Deserialize)]
pub struct McpToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Option<Value>,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl McpClient {
    pub fn new(config: &McpServerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("building mcp http client")?;
        Ok(Self {
            client,
            name: config.name.clone(),
            url: config.url.clone(),
            instructions: config.instructions.clone(),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("calling mcp server {}", self.name))?;

        let status = response.status();
        if !status.is_success() {
            bail!("mcp server {} returned {}", self.name, status);
        }

        let rpc: RpcResponse = response.json().await?;
        if let Some(error) = rpc.error {
            bail!("mcp server {} error: {}", self.name, error);
        }
        rpc.result
            .ok_or_else(|| anyhow::anyhow!("mcp server {} returned no result", self.name))
    }

    pub async fn list_tools(&self) -> Result<Vec<McpToolInfo>> {
        let result = self.call("tools/list", json!({})).await?;
        let tools = result
            .get("tools")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("mcp tools/list result missing tools array"))?;
        Ok(serde_json::from_value(tools)?)
    }

    /// Invoke a tool, returning the concatenated text content blocks.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<String> {
        let result = self
            .call("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;

        let text = result
            .get("content")
            .and_then(|c| c.as_array())
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Ok(result.to_string());
        }
        Ok(text)
    }
}
