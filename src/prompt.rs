//! System prompt assembly.
//!
//! The prompt is composed from the capabilities actually present for a
//! request: available tools, whether one of them is the knowledge-base
//! retrieval tool, and any per-server MCP instructions. Sections are
//! omitted entirely when a capability is absent so the model is never
//! told about tools it cannot call.

use crate::tools::{ToolRegistry, RETRIEVE_TOOL_NAME};

pub fn build_system_prompt(tools: &ToolRegistry, mcp_instructions: &[(String, String)]) -> String {
    let has_tools = !tools.is_empty();
    let has_retrieval = tools.find(RETRIEVE_TOOL_NAME).is_some();
    let has_other_tools = tools
        .tools()
        .iter()
        .any(|t| t.name() != RETRIEVE_TOOL_NAME);

    let mut prompt = String::from("You are an intelligent assistant");
    if has_tools {
        prompt.push_str(" with access to tools");
    }
    if has_retrieval {
        prompt.push_str(" and a knowledge base");
    }
    prompt.push_str(".\n\n");

    if has_tools {
        prompt.push_str("## When to Use Tools\n\n");
        let mut step = 1;
        if has_other_tools {
            prompt.push_str(&format!(
                "{}. External data or computational tasks: call the matching tool \
                 immediately instead of answering from memory.\n",
                step
            ));
            step += 1;
        }
        if has_retrieval {
            prompt.push_str(&format!(
                "{}. Knowledge-base questions (uploaded documents, policies, internal \
                 documentation): call {} first. Never answer such questions from \
                 general knowledge without retrieving documents.\n",
                step, RETRIEVE_TOOL_NAME
            ));
            step += 1;
        }
        if has_other_tools && has_retrieval {
            prompt.push_str(&format!(
                "{}. Hybrid questions: call the data tools first, then {} if more \
                 context is needed, and synthesize both results.\n",
                step, RETRIEVE_TOOL_NAME
            ));
        }
        prompt.push('\n');

        prompt.push_str("## Available Tools\n\n");
        for tool in tools.tools() {
            prompt.push_str(&format!("- **{}**: {}\n", tool.name(), tool.description()));
        }
        prompt.push('\n');
    }

    if !mcp_instructions.is_empty() {
        prompt.push_str("## Tool-Specific Instructions\n\n");
        for (_, instructions) in mcp_instructions {
            prompt.push_str(instructions);
            prompt.push_str("\n\n");
        }
    }

    prompt.push_str("## Response Guidelines\n\n");
    if has_tools {
        prompt.push_str(
            "- Call tools proactively; do not ask permission first.\n\
             - Treat tool results as the primary source of truth and format them clearly.\n\
             - If a tool fails, explain the error and suggest alternatives.\n",
        );
    }
    if has_retrieval {
        prompt.push_str(
            "- Every factual claim taken from retrieved documents must carry a \
             citation in the form (Source: document_name).\n\
             - If no relevant documents are found, say so explicitly instead of \
             answering from general knowledge.\n\
             - When context is incomplete or sources contradict each other, point \
             that out and cite each source.\n",
        );
    }
    prompt.push_str(
        "- Start with a direct answer, then supporting detail.\n\
         - Respond in the same language as the user's question.\n\
         - Never expose internal reasoning or tool invocation details.\n",
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct FakeTool {
        name: &'static str,
        description: &'static str,
    }

    #[async_trait]
    impl Tool for FakeTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            self.description
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object", "properties": {} })
        }
        async fn execute(&self, _params: Value) -> anyhow::Result<String> {
            Ok(String::new())
        }
    }

    fn registry(names: &[&'static str]) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for name in names {
            registry.register(Box::new(FakeTool {
                name,
                description: "a tool",
            }));
        }
        registry
    }

    #[test]
    fn test_no_tools_no_tool_sections() {
        let prompt = build_system_prompt(&ToolRegistry::new(), &[]);
        assert!(!prompt.contains("## When to Use Tools"));
        assert!(!prompt.contains("## Available Tools"));
        assert!(prompt.contains("## Response Guidelines"));
    }

    #[test]
    fn test_retrieval_tool_adds_citation_rules() {
        let prompt = build_system_prompt(&registry(&[RETRIEVE_TOOL_NAME]), &[]);
        assert!(prompt.contains("knowledge base"));
        assert!(prompt.contains("(Source: document_name)"));
        assert!(prompt.contains(RETRIEVE_TOOL_NAME));
    }

    #[test]
    fn test_mcp_instructions_included() {
        let instructions = vec![("weather".to_string(), "Use ISO dates.".to_string())];
        let prompt = build_system_prompt(&registry(&["get_weather"]), &instructions);
        assert!(prompt.contains("## Tool-Specific Instructions"));
        assert!(prompt.contains("Use ISO dates."));
    }

    #[test]
    fn test_tool_listing() {
        let prompt = build_system_prompt(&registry(&["get_weather", RETRIEVE_TOOL_NAME]), &[]);
        assert!(prompt.contains("- **get_weather**"));
        assert!(prompt.contains("Hybrid questions"));
    }
}
