use crate::models::{HotelOption, WidgetContent};
use crate::tools::registry::Tool;
use crate::tools::types::{PropertySchema, ToolContext, ToolDefinition, ToolInputSchema, ToolResult};
use crate::widgets::HOTEL_CARDS;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Renders the offered hotels as selectable cards
pub struct ShowHotelCardsTool {
    definition: ToolDefinition,
}

impl ShowHotelCardsTool {
    pub fn new() -> Self {
        let mut properties = HashMap::new();
        properties.insert(
            "hotels".to_string(),
            PropertySchema::array(
                "Hotels to show. Omit to show the hotels from the last availability check.",
                PropertySchema::object("A hotel with hotelName, location, dates, roomType, price and optional imageUrl"),
            ),
        );

        ShowHotelCardsTool {
            definition: ToolDefinition {
                name: "show_hotel_cards".to_string(),
                description: "Display hotel options to the user as cards they can pick from.".to_string(),
                input_schema: ToolInputSchema {
                    schema_type: "object".to_string(),
                    properties,
                    required: vec![],
                },
            },
        }
    }
}

impl Default for ShowHotelCardsTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize, Default)]
struct ShowHotelCardsParams {
    #[serde(default)]
    hotels: Option<Vec<HotelOption>>,
}

#[async_trait]
impl Tool for ShowHotelCardsTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: ShowHotelCardsParams = if params.is_null() {
            ShowHotelCardsParams::default()
        } else {
            match serde_json::from_value(params) {
                Ok(p) => p,
                Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
            }
        };

        let hotels = {
            let mut booking = context.booking.lock();
            match params.hotels {
                Some(list) if !list.is_empty() && list != booking.hotels => {
                    booking.set_hotels(list.clone());
                    list
                }
                _ => booking.hotels.clone(),
            }
        };

        if hotels.is_empty() {
            return ToolResult::error("No hotels to show. Check availability first.");
        }

        let widget = match context.widgets.build_hotel_cards_widget(&hotels) {
            Ok(w) => w,
            Err(e) => return ToolResult::error(format!("Failed to render hotel cards: {}", e)),
        };

        let names: Vec<String> = hotels
            .iter()
            .enumerate()
            .map(|(i, h)| format!("{}. {} ({})", i + 1, h.hotel_name, h.price))
            .collect();

        let content = WidgetContent {
            kind: HOTEL_CARDS.to_string(),
            summary: format!("Showed hotel cards: {}", names.join(", ")),
            widget,
        };

        ToolResult::success(format!(
            "Displayed {} hotel card(s). Ask the user which hotel they want.",
            hotels.len()
        ))
        .with_metadata(json!({ "hotels": hotels.len() }))
        .with_widget(&content)
    }
}

/// Records which offered hotel the user picked
pub struct SelectHotelTool {
    definition: ToolDefinition,
}

impl SelectHotelTool {
    pub fn new() -> Self {
        let mut properties = HashMap::new();
        properties.insert(
            "choice".to_string(),
            PropertySchema::string("Hotel name, a distinctive part of it, or its 1-based number (e.g. '2' or '#2')"),
        );

        SelectHotelTool {
            definition: ToolDefinition {
                name: "select_hotel".to_string(),
                description: "Record the hotel the user chose from the offered options.".to_string(),
                input_schema: ToolInputSchema {
                    schema_type: "object".to_string(),
                    properties,
                    required: vec!["choice".to_string()],
                },
            },
        }
    }
}

impl Default for SelectHotelTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for SelectHotelTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        // Models sometimes send the index as a number
        let choice = match params.get("choice") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return ToolResult::error("Missing 'choice': give a hotel name or number"),
        };

        let selected = match context.booking.lock().select_hotel(&choice) {
            Ok(h) => h,
            Err(e) => return ToolResult::error(e),
        };

        log::info!("[BOOKING] Thread {} selected '{}'", context.thread_id, selected.hotel_name);

        ToolResult::success(format!(
            "Selected {} ({}, {}, {}).",
            selected.hotel_name, selected.location, selected.room_type, selected.price
        ))
        .with_metadata(json!({ "hotel": selected }))
    }
}
