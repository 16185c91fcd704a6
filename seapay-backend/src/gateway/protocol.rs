use crate::models::{ApprovalRequest, ThreadItem, ThreadMetadata};
use crate::x402::X402PaymentInfo;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Event types streamed to chat clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    // Thread events
    ThreadCreated,
    ThreadItemAdded,
    ThreadItemDone,
    // Agent events
    ProgressUpdate,
    AgentHandoff,
    // Tool events
    ToolCall,
    ToolResult,
    WidgetRendered,
    // Approval events
    ApprovalRequired,
    ApprovalResolved,
    // Payment events
    X402Payment,
    // Stream lifecycle
    StreamError,
    StreamDone,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThreadCreated => "thread.created",
            Self::ThreadItemAdded => "thread.item.added",
            Self::ThreadItemDone => "thread.item.done",
            Self::ProgressUpdate => "progress.update",
            Self::AgentHandoff => "agent.handoff",
            Self::ToolCall => "tool.call",
            Self::ToolResult => "tool.result",
            Self::WidgetRendered => "widget.rendered",
            Self::ApprovalRequired => "approval.required",
            Self::ApprovalResolved => "approval.resolved",
            Self::X402Payment => "x402.payment",
            Self::StreamError => "stream.error",
            Self::StreamDone => "stream.done",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        event_type.as_str().to_string()
    }
}

/// One event of a chat turn stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEvent {
    #[serde(rename = "type")]
    pub type_: String,
    pub event: String,
    pub data: Value,
}

impl GatewayEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            type_: "event".to_string(),
            event: event.into(),
            data,
        }
    }

    /// Serialized as one SSE frame
    pub fn to_sse(&self) -> String {
        let payload = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("event: {}\ndata: {}\n\n", self.event, payload)
    }

    pub fn thread_created(thread: &ThreadMetadata) -> Self {
        Self::new(
            EventType::ThreadCreated,
            json!({
                "thread": thread
            }),
        )
    }

    /// Returns `None` for items clients never see (hidden context)
    pub fn thread_item_added(item: &ThreadItem) -> Option<Self> {
        item.to_payload()
            .map(|payload| Self::new(EventType::ThreadItemAdded, json!({ "item": payload })))
    }

    pub fn thread_item_done(item: &ThreadItem) -> Option<Self> {
        item.to_payload()
            .map(|payload| Self::new(EventType::ThreadItemDone, json!({ "item": payload })))
    }

    pub fn progress_update(thread_id: &str, text: &str) -> Self {
        Self::new(
            EventType::ProgressUpdate,
            json!({
                "thread_id": thread_id,
                "text": text
            }),
        )
    }

    pub fn agent_handoff(thread_id: &str, from: &str, to: &str, reason: &str) -> Self {
        Self::new(
            EventType::AgentHandoff,
            json!({
                "thread_id": thread_id,
                "from": from,
                "to": to,
                "reason": reason
            }),
        )
    }

    pub fn tool_call(thread_id: &str, agent: &str, tool_name: &str, parameters: &Value) -> Self {
        Self::new(
            EventType::ToolCall,
            json!({
                "thread_id": thread_id,
                "agent": agent,
                "tool_name": tool_name,
                "parameters": parameters
            }),
        )
    }

    pub fn tool_result(thread_id: &str, tool_name: &str, success: bool, duration_ms: i64) -> Self {
        Self::new(
            EventType::ToolResult,
            json!({
                "thread_id": thread_id,
                "tool_name": tool_name,
                "success": success,
                "duration_ms": duration_ms
            }),
        )
    }

    pub fn widget_rendered(thread_id: &str, item_id: &str, kind: &str) -> Self {
        Self::new(
            EventType::WidgetRendered,
            json!({
                "thread_id": thread_id,
                "item_id": item_id,
                "kind": kind
            }),
        )
    }

    pub fn approval_required(thread_id: &str, approval: &ApprovalRequest) -> Self {
        Self::new(
            EventType::ApprovalRequired,
            json!({
                "thread_id": thread_id,
                "approval": approval
            }),
        )
    }

    pub fn approval_resolved(thread_id: &str, approval: &ApprovalRequest) -> Self {
        Self::new(
            EventType::ApprovalResolved,
            json!({
                "thread_id": thread_id,
                "approval_id": approval.id,
                "status": approval.status
            }),
        )
    }

    pub fn x402_payment(thread_id: &str, payment: &X402PaymentInfo) -> Self {
        Self::new(
            EventType::X402Payment,
            json!({
                "thread_id": thread_id,
                "amount": payment.amount,
                "amount_formatted": payment.amount_formatted,
                "asset": payment.asset,
                "pay_to": payment.pay_to,
                "network": payment.network,
                "resource": payment.resource,
                "transaction": payment.transaction,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }),
        )
    }

    pub fn stream_error(thread_id: Option<&str>, error: &str) -> Self {
        Self::new(
            EventType::StreamError,
            json!({
                "thread_id": thread_id,
                "error": error
            }),
        )
    }

    pub fn stream_done(thread_id: Option<&str>) -> Self {
        Self::new(
            EventType::StreamDone,
            json!({
                "thread_id": thread_id
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ThreadItemType;

    #[test]
    fn test_event_shape() {
        let event = GatewayEvent::tool_result("thr_1", "check_availability", true, 42);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "event");
        assert_eq!(value["event"], "tool.result");
        assert_eq!(value["data"]["duration_ms"], 42);
    }

    #[test]
    fn test_sse_frame() {
        let frame = GatewayEvent::stream_done(Some("thr_1")).to_sse();
        assert!(frame.starts_with("event: stream.done\ndata: {"));
        assert!(frame.ends_with("\n\n"));
    }

    #[test]
    fn test_hidden_items_are_not_streamed() {
        let hidden = ThreadItem::new("thr_1", ThreadItemType::HiddenContext, "secret note");
        assert!(GatewayEvent::thread_item_done(&hidden).is_none());
        let visible = ThreadItem::new("thr_1", ThreadItemType::AssistantMessage, "hello");
        let event = GatewayEvent::thread_item_done(&visible).unwrap();
        assert_eq!(event.event, "thread.item.done");
        assert_eq!(event.data["item"]["content"]["text"], "hello");
    }
}
