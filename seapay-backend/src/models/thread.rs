use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Kind of item stored in a chat thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadItemType {
    UserMessage,
    AssistantMessage,
    Widget,
    /// Notes for the model that the user never sees (e.g. "user approved the payment")
    HiddenContext,
}

impl ThreadItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadItemType::UserMessage => "user_message",
            ThreadItemType::AssistantMessage => "assistant_message",
            ThreadItemType::Widget => "widget",
            ThreadItemType::HiddenContext => "hidden_context",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user_message" => Some(ThreadItemType::UserMessage),
            "assistant_message" => Some(ThreadItemType::AssistantMessage),
            "widget" => Some(ThreadItemType::Widget),
            "hidden_context" => Some(ThreadItemType::HiddenContext),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMetadata {
    pub id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ThreadMetadata {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: new_id("thr"),
            title: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Stored content of a widget item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetContent {
    /// Template name, e.g. `hotel_cards`
    pub kind: String,
    /// One-line description replayed to the model in place of the widget
    pub summary: String,
    pub widget: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadItem {
    pub id: String,
    pub thread_id: String,
    pub item_type: ThreadItemType,
    /// Plain text for messages, JSON-encoded `WidgetContent` for widgets
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ThreadItem {
    pub fn new(thread_id: &str, item_type: ThreadItemType, content: impl Into<String>) -> Self {
        let prefix = match item_type {
            ThreadItemType::Widget => "wgt",
            _ => "msg",
        };
        Self {
            id: new_id(prefix),
            thread_id: thread_id.to_string(),
            item_type,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn widget(thread_id: &str, widget: &WidgetContent) -> Self {
        let content = serde_json::to_string(widget).unwrap_or_else(|_| "{}".to_string());
        Self::new(thread_id, ThreadItemType::Widget, content)
    }

    pub fn widget_content(&self) -> Option<WidgetContent> {
        if self.item_type != ThreadItemType::Widget {
            return None;
        }
        serde_json::from_str(&self.content).ok()
    }

    /// Client-facing representation. Hidden context is never sent to clients.
    pub fn to_payload(&self) -> Option<Value> {
        let body = match self.item_type {
            ThreadItemType::HiddenContext => return None,
            ThreadItemType::Widget => match self.widget_content() {
                Some(w) => json!({ "kind": w.kind, "widget": w.widget }),
                None => json!({ "kind": "unknown", "widget": Value::Null }),
            },
            _ => json!({ "text": self.content }),
        };

        Some(json!({
            "id": self.id,
            "thread_id": self.thread_id,
            "type": self.item_type.as_str(),
            "content": body,
            "created_at": self.created_at.to_rfc3339(),
        }))
    }
}

/// Action posted back by a widget button
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetAction {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub payload: Value,
}

fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, &Uuid::new_v4().simple().to_string()[..16])
}
