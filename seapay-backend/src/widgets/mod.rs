//! Widget templates - static UI definitions with payload substitution
//!
//! A template is a JSON document. Rendering walks it and:
//! - replaces `{{path}}` placeholders in strings with values looked up by dot
//!   path in the payload; a string that is exactly one placeholder takes the
//!   raw JSON value (numbers stay numbers, missing becomes null)
//! - expands `{"$for": "field", "template": {...}}` into one rendered element
//!   per entry of the `field` array, with the entry bound as `item` and its
//!   1-based position as `index`. Inside an array the expansion is spliced in.

use crate::models::{ApprovalRequest, HotelOption};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::path::Path;

pub const HOTEL_CARDS: &str = "hotel_cards";
pub const APPROVAL_REQUEST: &str = "approval_request";

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([\w.]+)\s*\}\}").unwrap());

#[derive(Debug, Clone)]
pub struct WidgetTemplate {
    name: String,
    template: Value,
}

impl WidgetTemplate {
    pub fn from_str(name: &str, source: &str) -> Result<Self, String> {
        let template: Value = serde_json::from_str(source)
            .map_err(|e| format!("Widget template '{}' is not valid JSON: {}", name, e))?;
        Ok(Self {
            name: name.to_string(),
            template,
        })
    }

    /// Load a `.widget` file; the template is named after the file stem
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read widget template {}: {}", path.display(), e))?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("widget");
        Self::from_str(name, &source)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn build(&self, payload: &Value) -> Result<Value, String> {
        render(&self.template, payload)
            .map_err(|e| format!("Failed to render widget '{}': {}", self.name, e))
    }
}

fn render(node: &Value, scope: &Value) -> Result<Value, String> {
    match node {
        Value::String(s) => Ok(render_string(s, scope)),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Object(map) if map.contains_key("$for") => {
                        out.extend(expand_loop(map, scope)?);
                    }
                    _ => out.push(render(item, scope)?),
                }
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            if map.contains_key("$for") {
                return expand_loop(map, scope).map(Value::Array);
            }
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key.clone(), render(value, scope)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn expand_loop(map: &Map<String, Value>, scope: &Value) -> Result<Vec<Value>, String> {
    let field = map
        .get("$for")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "\"$for\" must name a payload field".to_string())?;
    let template = map
        .get("template")
        .ok_or_else(|| format!("\"$for\": \"{}\" has no template", field))?;

    let entries = match lookup_path(scope, field) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(format!("'{}' is not a list", field)),
    };

    let mut rendered = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let mut child = match scope {
            Value::Object(m) => m.clone(),
            _ => Map::new(),
        };
        child.insert("item".to_string(), entry.clone());
        child.insert("index".to_string(), json!(i + 1));
        rendered.push(render(template, &Value::Object(child))?);
    }
    Ok(rendered)
}

fn render_string(s: &str, scope: &Value) -> Value {
    if let Some(caps) = PLACEHOLDER.captures(s) {
        if let Some(whole) = caps.get(0) {
            if whole.start() == 0 && whole.end() == s.len() {
                return lookup_path(scope, &caps[1]).cloned().unwrap_or(Value::Null);
            }
        }
    } else {
        return Value::String(s.to_string());
    }

    let replaced = PLACEHOLDER.replace_all(s, |caps: &regex::Captures| {
        lookup_path(scope, &caps[1]).map(value_to_text).unwrap_or_default()
    });
    Value::String(replaced.into_owned())
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        other => other.to_string(),
    }
}

/// Look up a dot path (`item.hotelName`, `hotels.0.price`) in a JSON value
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in path.split('.') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(arr) => arr.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// The widget templates the tools render, bundled with optional overrides
#[derive(Debug, Clone)]
pub struct WidgetLibrary {
    hotel_cards: WidgetTemplate,
    approval_request: WidgetTemplate,
}

impl WidgetLibrary {
    pub fn bundled() -> Result<Self, String> {
        Ok(Self {
            hotel_cards: WidgetTemplate::from_str(
                HOTEL_CARDS,
                include_str!("../../widgets/hotel_cards.widget"),
            )?,
            approval_request: WidgetTemplate::from_str(
                APPROVAL_REQUEST,
                include_str!("../../widgets/approval_request.widget"),
            )?,
        })
    }

    /// Bundled templates, replaced by `<dir>/<name>.widget` where such a file exists
    pub fn load(dir: Option<&str>) -> Result<Self, String> {
        let mut library = Self::bundled()?;
        let Some(dir) = dir else {
            return Ok(library);
        };

        for slot in [&mut library.hotel_cards, &mut library.approval_request] {
            let path = Path::new(dir).join(format!("{}.widget", slot.name()));
            if path.exists() {
                *slot = WidgetTemplate::from_file(&path)?;
                log::info!("[WIDGETS] Using template override {}", path.display());
            }
        }
        Ok(library)
    }

    pub fn build_hotel_cards_widget(&self, hotels: &[HotelOption]) -> Result<Value, String> {
        let hotels: Vec<Value> = hotels
            .iter()
            .map(|hotel| {
                let mut entry = serde_json::to_value(hotel).unwrap_or_else(|_| json!({}));
                entry["priceLabel"] = json!(hotel.price.to_string());
                entry
            })
            .collect();
        self.hotel_cards.build(&json!({ "hotels": hotels }))
    }

    pub fn build_approval_widget(&self, approval: &ApprovalRequest) -> Result<Value, String> {
        self.approval_request.build(&json!({
            "approval_id": approval.id,
            "title": approval.title,
            "description": approval.description,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApprovalStatus, Price};
    use chrono::Utc;

    #[test]
    fn test_placeholders_keep_raw_values_when_alone() {
        let template = WidgetTemplate::from_str(
            "t",
            r#"{"count": "{{n}}", "label": "{{n}} rooms", "missing": "{{nope}}", "text": "x{{nope}}y"}"#,
        )
        .unwrap();
        let out = template.build(&json!({"n": 3})).unwrap();
        assert_eq!(out["count"], json!(3));
        assert_eq!(out["label"], json!("3 rooms"));
        assert_eq!(out["missing"], Value::Null);
        assert_eq!(out["text"], json!("xy"));
    }

    #[test]
    fn test_for_expands_and_splices() {
        let template = WidgetTemplate::from_str(
            "t",
            r#"{"children": [
                {"type": "Header"},
                {"$for": "rows", "template": {"key": "row-{{index}}", "v": "{{ item.name }}"}}
            ]}"#,
        )
        .unwrap();
        let out = template
            .build(&json!({"rows": [{"name": "a"}, {"name": "b"}]}))
            .unwrap();
        let children = out["children"].as_array().unwrap();
        assert_eq!(children.len(), 3);
        assert_eq!(children[1], json!({"key": "row-1", "v": "a"}));
        assert_eq!(children[2], json!({"key": "row-2", "v": "b"}));

        let out = template.build(&json!({})).unwrap();
        assert_eq!(out["children"].as_array().unwrap().len(), 1);

        assert!(template.build(&json!({"rows": "nope"})).is_err());
    }

    #[test]
    fn test_lookup_path() {
        let v = json!({"a": {"b": [10, {"c": "deep"}]}});
        assert_eq!(lookup_path(&v, "a.b.0"), Some(&json!(10)));
        assert_eq!(lookup_path(&v, "a.b.1.c"), Some(&json!("deep")));
        assert_eq!(lookup_path(&v, "a.x"), None);
        assert_eq!(lookup_path(&v, "a.b.9"), None);
    }

    #[test]
    fn test_hotel_cards_widget() {
        let library = WidgetLibrary::bundled().unwrap();
        let hotels = vec![
            HotelOption {
                hotel_name: "Sea Breeze Inn".to_string(),
                location: "Lisbon".to_string(),
                dates: "Jun 1 - Jun 4".to_string(),
                room_type: "Double".to_string(),
                price: Price::Amount(120.into()),
                image_url: Some("https://img.example/1.jpg".to_string()),
            },
            HotelOption {
                hotel_name: "Alfama Palace".to_string(),
                location: "Lisbon".to_string(),
                dates: "Jun 1 - Jun 4".to_string(),
                room_type: "Suite".to_string(),
                price: Price::Text("€300".to_string()),
                image_url: None,
            },
        ];
        let widget = library.build_hotel_cards_widget(&hotels).unwrap();
        let items = widget["children"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["onClickAction"]["type"], "hotel.select");
        assert_eq!(items[1]["onClickAction"]["payload"]["hotelName"], "Alfama Palace");
        assert_eq!(items[1]["onClickAction"]["payload"]["index"], json!(2));

        let rendered = widget.to_string();
        assert!(rendered.contains("2. Alfama Palace"));
        assert!(rendered.contains("$120"));
        assert!(rendered.contains("€300"));
        assert!(!rendered.contains("{{"));
    }

    #[test]
    fn test_approval_widget_actions() {
        let library = WidgetLibrary::bundled().unwrap();
        let approval = ApprovalRequest {
            id: "apr_123".to_string(),
            title: "Confirm payment".to_string(),
            description: "Pay 1.5 USDC to reserve Sea Breeze Inn".to_string(),
            status: ApprovalStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
        };
        let widget = library.build_approval_widget(&approval).unwrap();
        let rendered = widget.to_string();
        assert!(rendered.contains("request.approve"));
        assert!(rendered.contains("request.reject"));
        assert!(rendered.contains("Confirm payment"));
        assert!(rendered.contains("apr_123"));
    }

    #[test]
    fn test_override_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("approval_request.widget"),
            r#"{"type": "Custom", "title": "{{title}}"}"#,
        )
        .unwrap();
        let library = WidgetLibrary::load(dir.path().to_str()).unwrap();
        let approval = ApprovalRequest {
            id: "apr_1".to_string(),
            title: "T".to_string(),
            description: String::new(),
            status: ApprovalStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
        };
        assert_eq!(
            library.build_approval_widget(&approval).unwrap(),
            json!({"type": "Custom", "title": "T"})
        );
        // Untouched template stays bundled
        assert!(library.build_hotel_cards_widget(&[]).is_ok());
    }
}
