//! Tools the chat model can call.
//!
//! Three kinds exist: the built-in `retrieve_documents` tool, which is
//! scoped to the caller's workspaces; static tools enabled by name in
//! the `tools` config section; and adapters around tools discovered
//! from configured MCP servers. All are assembled per request into a
//! [`ToolRegistry`].

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::mcp::{McpClient, McpToolInfo};
use crate::retriever::{Retriever, WorkspaceFilter};
use crate::sanitize::sanitize_schema;

pub const RETRIEVE_TOOL_NAME: &str = "retrieve_documents";

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// One-line description the model uses to decide whether to call.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's arguments, already provider-safe.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, params: Value) -> Result<String>;
}

/// Knowledge-base retrieval, bound to the caller's readable workspaces.
pub struct RetrieveTool {
    retriever: Arc<Retriever>,
    filter: WorkspaceFilter,
}

impl RetrieveTool {
    pub fn new(retriever: Arc<Retriever>, filter: WorkspaceFilter) -> Self {
        Self { retriever, filter }
    }
}

#[async_trait]
impl Tool for RetrieveTool {
    fn name(&self) -> &str {
        RETRIEVE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search the knowledge base for documents relevant to a query"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let query = params["query"].as_str().unwrap_or("");
        if query.trim().is_empty() {
            anyhow::bail!("query must not be empty");
        }

        let chunks = self.retriever.retrieve(query, &self.filter).await?;
        if chunks.is_empty() {
            return Ok("No relevant documents found.".to_string());
        }

        let rendered = chunks
            .iter()
            .map(|chunk| format!("[{}]\n{}", chunk.file_path, chunk.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(rendered)
    }
}

pub const GET_WEATHER_TOOL_NAME: &str = "get_weather";
pub const EXCHANGE_RATES_TOOL_NAME: &str = "exchange_rates";

/// Look up a static built-in tool by its config name.
pub fn static_tool(name: &str) -> Option<Box<dyn Tool>> {
    match name {
        GET_WEATHER_TOOL_NAME => Some(Box::new(GetWeatherTool)),
        EXCHANGE_RATES_TOOL_NAME => Some(Box::new(ExchangeRatesTool)),
        _ => None,
    }
}

/// Whether `name` refers to a static tool, for config validation.
pub fn is_static_tool(name: &str) -> bool {
    static_tool(name).is_some()
}

/// Weather lookup for a city.
pub struct GetWeatherTool;

#[async_trait]
impl Tool for GetWeatherTool {
    fn name(&self) -> &str {
        GET_WEATHER_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Get weather information for provided city"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "The city name to get weather information for"
                },
                "units": {
                    "type": "string",
                    "enum": ["celsius", "fahrenheit"],
                    "description": "Temperature units to use"
                }
            },
            "required": ["city"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let Some(city) = params["city"].as_str().filter(|c| !c.trim().is_empty()) else {
            anyhow::bail!("city is required");
        };
        let units = params["units"].as_str().unwrap_or("celsius");
        let temperature = if units == "fahrenheit" { 101.3 } else { 38.5 };

        Ok(json!({
            "city": city,
            "temperature": temperature,
            "units": units,
            "condition": "sunny",
            "humidity": "65%",
            "wind_speed": "10 km/h",
        })
        .to_string())
    }
}

/// Exchange rate lookup for a currency.
pub struct ExchangeRatesTool;

#[async_trait]
impl Tool for ExchangeRatesTool {
    fn name(&self) -> &str {
        EXCHANGE_RATES_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Get exchange rate information for provided currency"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "currency": {
                    "type": "string",
                    "description": "Name of the currency to get the exchange rate for"
                }
            },
            "required": ["currency"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let Some(currency) = params["currency"].as_str().filter(|c| !c.trim().is_empty()) else {
            anyhow::bail!("currency is required");
        };

        Ok(json!({
            "source_currency": currency,
            "target_currency": "TRL",
            "exchange_rate": 47.5,
        })
        .to_string())
    }
}

/// Adapter exposing one MCP-discovered tool through the [`Tool`] trait.
pub struct McpTool {
    client: Arc<McpClient>,
    name: String,
    description: String,
    schema: Value,
}

impl McpTool {
    pub fn new(client: Arc<McpClient>, info: &McpToolInfo) -> Self {
        let schema = info
            .input_schema
            .as_ref()
            .map(sanitize_schema)
            .unwrap_or_else(|| json!({ "type": "object", "properties": {} }));
        Self {
            client,
            name: info.name.clone(),
            description: info.description.clone().unwrap_or_default(),
            schema,
        }
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, params: Value) -> Result<String> {
        self.client.call_tool(&self.name, params).await
    }
}

pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
