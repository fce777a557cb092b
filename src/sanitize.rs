//! JSON-Schema sanitizer for tool parameter schemas.
//!
//! MCP servers hand back arbitrary JSON Schema; chat providers accept a
//! narrower dialect and reject requests over unknown keywords. The
//! denylisted keywords are stripped recursively before a schema is put
//! in front of a model.

use serde_json::Value;

/// Keywords the target providers reject.
const DENYLIST: &[&str] = &[
    "$schema",
    "$id",
    "additionalProperties",
    "minLength",
    "maxLength",
    "format",
    "default",
    "examples",
    "pattern",
];

/// Return a copy of `schema` with unsupported keywords removed at every
/// nesting level. Non-object values pass through untouched.
pub fn sanitize_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut cleaned = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                if DENYLIST.contains(&key.as_str()) {
                    continue;
                }
                cleaned.insert(key.clone(), sanitize_schema(value));
            }
            Value::Object(cleaned)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_schema).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_top_level_keywords_stripped() {
        let schema = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "$id": "https://example.com/tool.json",
            "type": "object",
            "additionalProperties": false,
            "properties": {}
        });
        let cleaned = sanitize_schema(&schema);
        assert_eq!(
            cleaned,
            json!({ "type": "object", "properties": {} })
        );
    }

    #[test]
    fn test_nested_properties_stripped() {
        let schema = json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "minLength": 1, "maxLength": 64 },
                "date": { "type": "string", "format": "date-time", "default": "now" }
            }
        });
        let cleaned = sanitize_schema(&schema);
        assert_eq!(cleaned["properties"]["name"], json!({ "type": "string" }));
        assert_eq!(cleaned["properties"]["date"], json!({ "type": "string" }));
    }

    #[test]
    fn test_recurses_into_items_and_anyof() {
        let schema = json!({
            "type": "object",
            "properties": {
                "tags": {
                    "type": "array",
                    "items": { "type": "string", "pattern": "^[a-z]+$" }
                },
                "value": {
                    "anyOf": [
                        { "type": "string", "examples": ["a"] },
                        { "type": "number", "default": 0 }
                    ]
                }
            }
        });
        let cleaned = sanitize_schema(&schema);
        assert_eq!(
            cleaned["properties"]["tags"]["items"],
            json!({ "type": "string" })
        );
        assert_eq!(
            cleaned["properties"]["value"]["anyOf"],
            json!([{ "type": "string" }, { "type": "number" }])
        );
    }

    #[test]
    fn test_allowed_keywords_survive() {
        let schema = json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" }
            },
            "required": ["query"]
        });
        assert_eq!(sanitize_schema(&schema), schema);
    }

    #[test]
    fn test_non_object_passthrough() {
        assert_eq!(sanitize_schema(&json!("string")), json!("string"));
        assert_eq!(sanitize_schema(&json!(42)), json!(42));
    }
}
