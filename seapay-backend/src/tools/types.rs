use crate::config::Config;
use crate::gateway::protocol::GatewayEvent;
use crate::gateway::EventEmitter;
use crate::mcp::McpClient;
use crate::models::{BookingState, SharedBooking, WidgetContent};
use crate::widgets::WidgetLibrary;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// JSON Schema property definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl PropertySchema {
    fn typed(schema_type: &str, description: &str) -> Self {
        PropertySchema {
            schema_type: schema_type.to_string(),
            description: description.to_string(),
            default: None,
            items: None,
            enum_values: None,
        }
    }

    pub fn string(description: &str) -> Self {
        Self::typed("string", description)
    }

    pub fn integer(description: &str) -> Self {
        Self::typed("integer", description)
    }

    pub fn boolean(description: &str) -> Self {
        Self::typed("boolean", description)
    }

    pub fn array(description: &str, items: PropertySchema) -> Self {
        PropertySchema {
            items: Some(Box::new(items)),
            ..Self::typed("array", description)
        }
    }

    pub fn object(description: &str) -> Self {
        Self::typed("object", description)
    }
}

/// Tool input schema using JSON Schema format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: HashMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl Default for ToolInputSchema {
    fn default() -> Self {
        ToolInputSchema {
            schema_type: "object".to_string(),
            properties: HashMap::new(),
            required: vec![],
        }
    }
}

/// Tool definition that gets sent to the AI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: ToolInputSchema,
}

/// Result of tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        ToolResult {
            success: true,
            content: content.into(),
            error: None,
            metadata: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        let msg = message.into();
        ToolResult {
            success: false,
            content: msg.clone(),
            error: Some(msg),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Attach a rendered widget for the server to store and stream
    pub fn with_widget(self, widget: &WidgetContent) -> Self {
        let mut metadata = self.metadata.clone().unwrap_or_else(|| serde_json::json!({}));
        metadata["widget"] = serde_json::to_value(widget).unwrap_or(Value::Null);
        self.with_metadata(metadata)
    }

    pub fn widget(&self) -> Option<WidgetContent> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("widget"))
            .and_then(|w| serde_json::from_value(w.clone()).ok())
    }
}

/// Context provided to tools during execution
#[derive(Clone)]
pub struct ToolContext {
    pub thread_id: String,
    /// Booking state of the thread, shared with the orchestrator
    pub booking: SharedBooking,
    /// Stream of the current turn, if a client is listening
    pub emitter: Option<EventEmitter>,
    pub mcp: Option<Arc<McpClient>>,
    pub widgets: Arc<WidgetLibrary>,
    pub config: Arc<Config>,
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("thread_id", &self.thread_id)
            .field("stage", &self.booking.lock().stage())
            .field("emitter", &self.emitter.is_some())
            .field("mcp", &self.mcp.as_ref().map(|m| m.url().to_string()))
            .finish()
    }
}

impl ToolContext {
    pub fn new(thread_id: &str, booking: SharedBooking, widgets: Arc<WidgetLibrary>, config: Arc<Config>) -> Self {
        ToolContext {
            thread_id: thread_id.to_string(),
            booking,
            emitter: None,
            mcp: None,
            widgets,
            config,
        }
    }

    pub fn with_emitter(mut self, emitter: EventEmitter) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn with_mcp(mut self, mcp: Arc<McpClient>) -> Self {
        self.mcp = Some(mcp);
        self
    }

    /// Emit an event on the turn's stream, if any
    pub fn emit(&self, event: GatewayEvent) {
        if let Some(ref emitter) = self.emitter {
            emitter.emit(event);
        }
    }

    pub fn mcp_client(&self) -> Result<Arc<McpClient>, String> {
        self.mcp
            .clone()
            .ok_or_else(|| "The booking service is not configured (SEAPAY_MCP_URL is not set)".to_string())
    }

    /// Copy of the current booking state
    pub fn snapshot(&self) -> BookingState {
        self.booking.lock().clone()
    }
}

/// Tool execution record for audit logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecution {
    pub id: Option<i64>,
    pub thread_id: String,
    pub agent: String,
    pub tool_name: String,
    pub parameters: Value,
    pub success: bool,
    pub result: Option<String>,
    pub duration_ms: Option<i64>,
    pub executed_at: String,
}
