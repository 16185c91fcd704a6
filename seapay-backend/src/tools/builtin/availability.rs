use crate::models::HotelOption;
use crate::tools::registry::Tool;
use crate::tools::types::{ToolContext, ToolDefinition, ToolInputSchema, ToolResult};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Searches hotels for the recorded destination, dates and guests via MCP
pub struct CheckAvailabilityTool {
    definition: ToolDefinition,
}

impl CheckAvailabilityTool {
    pub fn new() -> Self {
        CheckAvailabilityTool {
            definition: ToolDefinition {
                name: "check_availability".to_string(),
                description: "Search available hotels for the booking details already recorded (destination, dates, guests). Takes no arguments; record details with update_booking_details first.".to_string(),
                input_schema: ToolInputSchema::default(),
            },
        }
    }
}

impl Default for CheckAvailabilityTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull the hotel list out of an MCP answer. Accepts a bare array or one
/// nested under `hotels`, `data.hotels` or `results`. Entries that do not
/// look like a hotel are skipped.
pub fn parse_hotels(value: &Value) -> Option<Vec<HotelOption>> {
    let list = if value.is_array() {
        value
    } else {
        ["/hotels", "/data/hotels", "/results"]
            .iter()
            .find_map(|pointer| value.pointer(pointer).filter(|v| v.is_array()))?
    };

    let hotels = list
        .as_array()?
        .iter()
        .filter_map(|entry| match serde_json::from_value::<HotelOption>(entry.clone()) {
            Ok(hotel) => Some(hotel),
            Err(e) => {
                log::warn!("[AVAILABILITY] Skipping malformed hotel entry ({}): {}", e, entry);
                None
            }
        })
        .collect();
    Some(hotels)
}

#[async_trait]
impl Tool for CheckAvailabilityTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, _params: Value, context: &ToolContext) -> ToolResult {
        let query = match context.booking.lock().availability_query() {
            Ok(q) => q,
            Err(e) => return ToolResult::error(e),
        };
        let mcp = match context.mcp_client() {
            Ok(m) => m,
            Err(e) => return ToolResult::error(e),
        };

        let result = match mcp.call_tool("check_availability", query.clone()).await {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("Availability check failed: {}", e)),
        };

        if result.is_error {
            return ToolResult::error(format!("Availability check failed: {}", result.text()));
        }

        let hotels = match result.json().as_ref().and_then(parse_hotels) {
            Some(h) => h,
            None => {
                return ToolResult::error(format!(
                    "Availability check returned an unrecognized answer: {}",
                    result.text()
                ))
            }
        };

        let count = hotels.len();
        let mut booking = context.booking.lock();
        booking.set_hotels(hotels);

        log::info!(
            "[AVAILABILITY] Thread {} got {} hotel(s) for {}",
            context.thread_id,
            count,
            query["destination"]
        );

        if count == 0 {
            return ToolResult::success(format!(
                "No hotels are available in {} for those dates. Suggest different dates or a nearby destination.",
                booking.destination.clone().unwrap_or_default()
            ))
            .with_metadata(json!({ "hotels": 0 }));
        }

        let mut content = format!("Found {} hotel(s):\n", count);
        for (i, hotel) in booking.hotels.iter().enumerate() {
            content.push_str(&format!(
                "{}. {}, {}, {}, {}\n",
                i + 1,
                hotel.hotel_name,
                hotel.location,
                hotel.room_type,
                hotel.price
            ));
        }
        content.push_str("\nShow them to the user with show_hotel_cards.");

        ToolResult::success(content).with_metadata(json!({ "hotels": count }))
    }
}
