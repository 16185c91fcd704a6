use crate::mcp::McpToolResult;
use crate::models::PaymentDetails;
use crate::tools::registry::Tool;
use crate::tools::types::{ToolContext, ToolDefinition, ToolInputSchema, ToolResult};
use crate::x402::{parse_payment_required, select_requirement};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

/// How the booking service answered a reservation attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ReserveOutcome {
    Reserved(Option<Value>),
    PaymentRequired(Option<PaymentDetails>),
    Failed(String),
}

static PAYMENT_REQUIRED_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b402\b|payment required").unwrap());

/// Classify an MCP `reserve` answer. A payment demand may come as an x402
/// body (`accepts` list), a flagged payload (`paymentRequired`, `status: 402`)
/// or text mentioning 402, with or without the error flag set. A body with
/// `success: false` or an `error` field is a failure.
pub fn classify_reservation(result: &McpToolResult) -> ReserveOutcome {
    let body = result.json();
    let text = result.text();

    if let Some(ref value) = body {
        if let Some(outcome) = payment_demand(value) {
            return outcome;
        }
        if let Some(message) = failure_message(value) {
            if PAYMENT_REQUIRED_TEXT.is_match(&message) {
                return ReserveOutcome::PaymentRequired(None);
            }
            return ReserveOutcome::Failed(message);
        }
    } else if PAYMENT_REQUIRED_TEXT.is_match(&text) {
        return ReserveOutcome::PaymentRequired(None);
    }

    if result.is_error {
        if PAYMENT_REQUIRED_TEXT.is_match(&text) {
            return ReserveOutcome::PaymentRequired(None);
        }
        if text.is_empty() {
            return ReserveOutcome::Failed("The booking service reported an error".to_string());
        }
        return ReserveOutcome::Failed(text);
    }

    ReserveOutcome::Reserved(body.or_else(|| {
        if text.is_empty() {
            None
        } else {
            Some(json!({ "message": text }))
        }
    }))
}

/// The reason given by a body that reports failure
pub(crate) fn failure_message(value: &Value) -> Option<String> {
    let failed = value.get("success").and_then(|v| v.as_bool()) == Some(false);
    let error = value.get("error").filter(|e| !e.is_null() && e.as_bool() != Some(false));
    if !failed && error.is_none() {
        return None;
    }

    let reason = error
        .and_then(|e| e.as_str().or_else(|| e.get("message").and_then(|m| m.as_str())))
        .or_else(|| value.get("message").and_then(|m| m.as_str()));
    Some(match reason {
        Some(r) if !r.trim().is_empty() => r.trim().to_string(),
        _ => "The booking service reported a failure".to_string(),
    })
}

fn payment_demand(value: &Value) -> Option<ReserveOutcome> {
    // The demand may be wrapped, e.g. `{"error": {...402 body...}}`
    for candidate in [Some(value), value.get("error"), value.get("payment")] {
        let Some(candidate) = candidate else { continue };
        if let Some(required) = parse_payment_required(candidate) {
            let details = select_requirement(&required)
                .ok()
                .or_else(|| required.accepts.first())
                .map(|r| r.to_payment_details());
            return Some(ReserveOutcome::PaymentRequired(details));
        }
    }

    let flagged = value.get("x402Version").is_some()
        || value.get("paymentRequired").and_then(|v| v.as_bool()) == Some(true)
        || value.get("status").and_then(|v| v.as_u64()) == Some(402);
    if flagged {
        return Some(ReserveOutcome::PaymentRequired(None));
    }
    None
}

/// Reserves the selected hotel through the booking service
pub struct ReserveTool {
    definition: ToolDefinition,
}

impl ReserveTool {
    pub fn new() -> Self {
        ReserveTool {
            definition: ToolDefinition {
                name: "reserve".to_string(),
                description: "Reserve the selected hotel for the recorded dates and guests. Takes no arguments. If the service asks for payment, the result says so and the payment must be approved by the user before paying.".to_string(),
                input_schema: ToolInputSchema::default(),
            },
        }
    }
}

impl Default for ReserveTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ReserveTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, _params: Value, context: &ToolContext) -> ToolResult {
        let request = {
            let booking = context.booking.lock();
            if booking.reservation_created {
                return ToolResult::error("The reservation has already been created.");
            }
            match booking.reservation_request() {
                Ok(r) => r,
                Err(e) => return ToolResult::error(e),
            }
        };
        let mcp = match context.mcp_client() {
            Ok(m) => m,
            Err(e) => return ToolResult::error(e),
        };

        let result = match mcp.call_tool("reserve", request).await {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("Reservation failed: {}", e)),
        };

        match classify_reservation(&result) {
            ReserveOutcome::Reserved(reservation) => {
                log::info!("[RESERVE] Thread {} reserved without payment", context.thread_id);
                context.booking.lock().mark_reserved(reservation.clone());
                ToolResult::success(format!(
                    "Reservation created: {}",
                    reservation.as_ref().map(|r| r.to_string()).unwrap_or_else(|| "confirmed".to_string())
                ))
                .with_metadata(json!({ "reserved": true, "reservation": reservation }))
            }
            ReserveOutcome::PaymentRequired(details) => {
                log::info!(
                    "[RESERVE] Thread {} needs payment: {:?}",
                    context.thread_id,
                    details.as_ref().map(|d| d.summary())
                );
                let summary = details
                    .as_ref()
                    .map(|d| d.summary())
                    .unwrap_or_else(|| "an amount the service did not state".to_string());
                context.booking.lock().mark_payment_required(details.clone());
                ToolResult::success(format!(
                    "The booking service requires payment of {} before the reservation is created. Ask the user to approve the payment.",
                    summary
                ))
                .with_metadata(json!({ "payment_required": true, "payment": details }))
            }
            ReserveOutcome::Failed(message) => {
                ToolResult::error(format!("Reservation failed: {}", message))
            }
        }
    }
}
