use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC request structure
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Absent for notifications
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl JsonRpcRequest {
    pub fn call(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.to_string(),
            params: Some(params),
            id: Some(id),
        }
    }

    pub fn notification(method: &str) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.to_string(),
            params: None,
            id: None,
        }
    }
}

/// JSON-RPC response structure
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Content block returned by `tools/call`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum McpContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: Value,
    },
    #[serde(other)]
    Other,
}

/// Result of an MCP `tools/call`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolResult {
    #[serde(default)]
    pub content: Vec<McpContent>,
    #[serde(default)]
    pub structured_content: Option<Value>,
    #[serde(default)]
    pub is_error: bool,
}

impl McpToolResult {
    /// All text blocks joined by newlines
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                McpContent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Structured content, or the first text block that parses as JSON
    pub fn json(&self) -> Option<Value> {
        if let Some(ref structured) = self.structured_content {
            return Some(structured.clone());
        }
        self.content.iter().find_map(|c| match c {
            McpContent::Text { text } => {
                let trimmed = text.trim();
                if trimmed.starts_with('{') || trimmed.starts_with('[') {
                    serde_json::from_str(trimmed).ok()
                } else {
                    None
                }
            }
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_result_text_and_json() {
        let result: McpToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "Found 2 hotels"},
                {"type": "audio", "data": "..."},
                {"type": "text", "text": "[{\"hotelName\": \"A\"}]"}
            ]
        }))
        .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.content[1], McpContent::Other);
        assert_eq!(result.text(), "Found 2 hotels\n[{\"hotelName\": \"A\"}]");
        assert_eq!(result.json().unwrap()[0]["hotelName"], "A");
    }

    #[test]
    fn test_structured_content_wins() {
        let result: McpToolResult = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "{\"a\": 1}"}],
            "structuredContent": {"b": 2},
            "isError": true
        }))
        .unwrap();
        assert!(result.is_error);
        assert_eq!(result.json(), Some(json!({"b": 2})));
    }
}
