use crate::models::BookingDetails;
use crate::tools::registry::Tool;
use crate::tools::types::{PropertySchema, ToolContext, ToolDefinition, ToolInputSchema, ToolResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Merges destination, dates and guest count extracted from the conversation
pub struct UpdateBookingDetailsTool {
    definition: ToolDefinition,
}

impl UpdateBookingDetailsTool {
    pub fn new() -> Self {
        let mut properties = HashMap::new();

        properties.insert(
            "destination".to_string(),
            PropertySchema::string("City or area the user wants to stay in, e.g. 'Lisbon'"),
        );
        properties.insert(
            "checkin_date".to_string(),
            PropertySchema::string("Check-in date as YYYY-MM-DD. Resolve relative dates before calling."),
        );
        properties.insert(
            "checkout_date".to_string(),
            PropertySchema::string("Check-out date as YYYY-MM-DD, after the check-in date"),
        );
        properties.insert(
            "guests".to_string(),
            PropertySchema::integer("Number of guests, at least 1"),
        );

        UpdateBookingDetailsTool {
            definition: ToolDefinition {
                name: "update_booking_details".to_string(),
                description: "Record booking details the user has stated. Pass only the fields the user gave; omitted fields keep their current value.".to_string(),
                input_schema: ToolInputSchema {
                    schema_type: "object".to_string(),
                    properties,
                    required: vec![],
                },
            },
        }
    }
}

impl Default for UpdateBookingDetailsTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for UpdateBookingDetailsTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let details: BookingDetails = match serde_json::from_value(params) {
            Ok(d) => d,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };

        if details.destination.is_none()
            && details.checkin_date.is_none()
            && details.checkout_date.is_none()
            && details.guests.is_none()
        {
            return ToolResult::error("Provide at least one of destination, checkin_date, checkout_date, guests");
        }

        let mut booking = context.booking.lock();
        let changed = match booking.apply_details(&details) {
            Ok(c) => c,
            Err(e) => return ToolResult::error(e),
        };
        let missing = booking.missing_fields();

        log::info!(
            "[BOOKING] Thread {} updated {:?}, still missing {:?}",
            context.thread_id,
            changed,
            missing
        );

        let mut content = if changed.is_empty() {
            "Nothing changed; these details were already recorded.".to_string()
        } else {
            format!("Updated: {}.", changed.join(", "))
        };
        content.push_str("\n\nCurrent booking:\n");
        content.push_str(&booking.format_summary());
        if missing.is_empty() {
            content.push_str("\nAll search details are known. Availability can be checked now.");
        } else {
            content.push_str(&format!("\nStill missing: {}", missing.join(", ")));
        }

        ToolResult::success(content).with_metadata(json!({
            "updated": changed,
            "missing": missing,
        }))
    }
}
