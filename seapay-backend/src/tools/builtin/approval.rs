use crate::gateway::protocol::GatewayEvent;
use crate::models::{ApprovalStatus, WidgetContent};
use crate::tools::registry::Tool;
use crate::tools::types::{PropertySchema, ToolContext, ToolDefinition, ToolInputSchema, ToolResult};
use crate::widgets::APPROVAL_REQUEST;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Asks the user to approve the pending payment with approve/reject buttons
pub struct ShowApprovalRequestTool {
    definition: ToolDefinition,
}

impl ShowApprovalRequestTool {
    pub fn new() -> Self {
        let mut properties = HashMap::new();
        properties.insert(
            "title".to_string(),
            PropertySchema::string("Short title, e.g. 'Confirm payment for Sea Breeze Inn'"),
        );
        properties.insert(
            "description".to_string(),
            PropertySchema::string("What the user is approving: hotel, dates and the amount to pay"),
        );

        ShowApprovalRequestTool {
            definition: ToolDefinition {
                name: "show_approval_request".to_string(),
                description: "Show the user an approval card for the pending payment. No payment can be made until the user approves.".to_string(),
                input_schema: ToolInputSchema {
                    schema_type: "object".to_string(),
                    properties,
                    required: vec!["title".to_string()],
                },
            },
        }
    }
}

impl Default for ShowApprovalRequestTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct ShowApprovalParams {
    title: String,
    #[serde(default)]
    description: Option<String>,
}

#[async_trait]
impl Tool for ShowApprovalRequestTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: ShowApprovalParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };

        let approval = {
            let mut booking = context.booking.lock();
            let description = match params.description.filter(|d| !d.trim().is_empty()) {
                Some(d) => d,
                None => default_description(&booking),
            };
            match booking.request_approval(&params.title, &description) {
                Ok(a) => a,
                Err(e) => return ToolResult::error(e),
            }
        };

        let widget = match context.widgets.build_approval_widget(&approval) {
            Ok(w) => w,
            Err(e) => return ToolResult::error(format!("Failed to render approval request: {}", e)),
        };

        log::info!(
            "[APPROVAL] Thread {} awaiting approval {} ('{}')",
            context.thread_id,
            approval.id,
            approval.title
        );
        context.emit(GatewayEvent::approval_required(&context.thread_id, &approval));

        let content = WidgetContent {
            kind: APPROVAL_REQUEST.to_string(),
            summary: format!(
                "Asked the user to approve: {}. {}",
                approval.title, approval.description
            ),
            widget,
        };

        ToolResult::success(
            "Approval request shown. Wait for the user to approve or reject before paying.",
        )
        .with_metadata(json!({ "approval_id": approval.id }))
        .with_widget(&content)
    }
}

fn default_description(booking: &crate::models::BookingState) -> String {
    let hotel = booking
        .selected_hotel
        .as_ref()
        .map(|h| h.hotel_name.clone())
        .unwrap_or_else(|| "the selected hotel".to_string());
    let amount = booking
        .payment_details
        .as_ref()
        .map(|d| d.summary())
        .unwrap_or_else(|| "the requested amount".to_string());
    format!("Pay {} to reserve {}.", amount, hotel)
}

/// Interpret a free-text answer to an approval request.
///
/// Any negation rejects. Approval needs an answer made only of explicit
/// affirmatives ("yes", "go ahead", "pay it"), so questions and sentences
/// that merely mention paying stay undecided.
pub fn interpret_answer(answer: &str) -> Option<bool> {
    let lowered = answer.trim().to_lowercase();
    if lowered.is_empty() || lowered.contains('?') {
        return None;
    }
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect();

    const NO: &[&str] = &["no", "nope", "reject", "decline", "cancel", "don't", "dont", "stop", "deny", "not"];
    if words.iter().any(|w| NO.contains(w)) {
        return Some(false);
    }

    const FILLER: &[&str] = &["please", "thanks", "thank", "you", "and", "sir"];
    const YES: &[&[&str]] = &[
        &["go", "ahead"],
        &["pay", "it"],
        &["pay", "now"],
        &["do", "it"],
        &["book", "it"],
        &["i", "approve"],
        &["i", "confirm"],
        &["sounds", "good"],
        &["yes"],
        &["y"],
        &["yeah"],
        &["yep"],
        &["sure"],
        &["ok"],
        &["okay"],
        &["approve"],
        &["approved"],
        &["confirm"],
        &["confirmed"],
        &["proceed"],
    ];

    let words: Vec<&str> = words.into_iter().filter(|w| !FILLER.contains(w)).collect();
    let mut rest = words.as_slice();
    let mut affirmed = false;
    while !rest.is_empty() {
        let phrase = YES.iter().find(|phrase| rest.starts_with(phrase))?;
        rest = &rest[phrase.len()..];
        affirmed = true;
    }
    affirmed.then_some(true)
}

/// Resolves the pending approval from the user's answer in chat
pub struct RecordApprovalDecisionTool {
    definition: ToolDefinition,
}

impl RecordApprovalDecisionTool {
    pub fn new() -> Self {
        let mut properties = HashMap::new();
        properties.insert(
            "approved".to_string(),
            PropertySchema::boolean("true if the user approved the payment, false if they rejected it"),
        );
        properties.insert(
            "answer".to_string(),
            PropertySchema::string("The user's answer verbatim, used when 'approved' is not given"),
        );

        RecordApprovalDecisionTool {
            definition: ToolDefinition {
                name: "record_approval_decision".to_string(),
                description: "Record the user's decision on the pending approval request. Only call this when the user clearly answered.".to_string(),
                input_schema: ToolInputSchema {
                    schema_type: "object".to_string(),
                    properties,
                    required: vec![],
                },
            },
        }
    }
}

impl Default for RecordApprovalDecisionTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct DecisionParams {
    #[serde(default)]
    approved: Option<bool>,
    #[serde(default)]
    answer: Option<String>,
}

#[async_trait]
impl Tool for RecordApprovalDecisionTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: DecisionParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };

        let answer = params.answer.as_deref().map(str::trim).filter(|a| !a.is_empty());
        let reading = answer.and_then(interpret_answer);
        let approved = match (params.approved, reading) {
            // An approval must agree with what the user actually said
            (Some(true), Some(false)) => {
                return ToolResult::error(
                    "The user's answer does not approve the payment. Ask them to answer yes or no.",
                )
            }
            (Some(true), None) if answer.is_some_and(|a| a.contains('?')) => {
                return ToolResult::error(
                    "The user asked a question instead of approving. Answer it, then ask them to approve or reject.",
                )
            }
            (Some(a), _) => a,
            (None, Some(a)) => a,
            (None, None) => {
                return ToolResult::error(
                    "Could not tell whether the user approved. Ask them to answer yes or no.",
                )
            }
        };

        let approval = match context.booking.lock().resolve_approval(approved) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(e),
        };

        log::info!(
            "[APPROVAL] Thread {} approval {} {}",
            context.thread_id,
            approval.id,
            approval.status
        );
        context.emit(GatewayEvent::approval_resolved(&context.thread_id, &approval));

        let content = match approval.status {
            ApprovalStatus::Approved => "The user approved the payment. It can be made now.",
            _ => "The user rejected the payment. No payment will be made.",
        };
        ToolResult::success(content).with_metadata(json!({
            "approval_id": approval.id,
            "status": approval.status,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::EventEmitter;
    use crate::models::BookingStage;
    use crate::tools::builtin::test_support::{context_awaiting_approval, context_with_selection};

    #[test]
    fn test_interpret_answer() {
        assert_eq!(interpret_answer("Yes, go ahead"), Some(true));
        assert_eq!(interpret_answer("ok"), Some(true));
        assert_eq!(interpret_answer("No thanks"), Some(false));
        assert_eq!(interpret_answer("don't approve that"), Some(false));
        assert_eq!(interpret_answer("what does it cost?"), None);
        assert_eq!(interpret_answer(""), None);
    }

    #[test]
    fn test_questions_and_passing_mentions_do_not_approve() {
        assert_eq!(interpret_answer("How much will I pay?"), None);
        assert_eq!(interpret_answer("Is it ok to wait a bit?"), None);
        assert_eq!(interpret_answer("I want to go back and pick another hotel"), None);
        assert_eq!(interpret_answer("ok but first tell me about parking"), None);
        assert_eq!(interpret_answer("pay"), None);
        assert_eq!(interpret_answer("Yes please, pay it."), Some(true));
        assert_eq!(interpret_answer("Sounds good, book it!"), Some(true));
    }

    #[tokio::test]
    async fn test_question_leaves_approval_pending() {
        let ctx = context_awaiting_approval();
        ShowApprovalRequestTool::new()
            .execute(json!({"title": "Confirm", "description": "Pay 1.5 USDC"}), &ctx)
            .await;

        let tool = RecordApprovalDecisionTool::new();
        let from_text = tool.execute(json!({"answer": "How much will I pay?"}), &ctx).await;
        assert!(!from_text.success);

        let flagged = tool
            .execute(json!({"approved": true, "answer": "How much will I pay?"}), &ctx)
            .await;
        assert!(!flagged.success);

        let contradicted = tool
            .execute(json!({"approved": true, "answer": "no, don't pay yet"}), &ctx)
            .await;
        assert!(!contradicted.success);

        let booking = ctx.booking.lock();
        assert!(!booking.is_payment_approved());
        assert_eq!(booking.approval.as_ref().unwrap().status, ApprovalStatus::Pending);
    }

    #[tokio::test]
    async fn test_show_approval_emits_event_and_widget() {
        let (emitter, mut rx) = EventEmitter::channel();
        let ctx = context_awaiting_approval().with_emitter(emitter);

        let result = ShowApprovalRequestTool::new()
            .execute(json!({"title": "Confirm payment"}), &ctx)
            .await;
        assert!(result.success, "{}", result.content);

        let widget = result.widget().unwrap();
        assert_eq!(widget.kind, APPROVAL_REQUEST);
        assert!(widget.summary.contains("Pay 1.5 USDC on base-sepolia to reserve Sea Breeze Inn."));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, "approval.required");
        assert_eq!(event.data["approval"]["status"], "pending");
    }

    #[tokio::test]
    async fn test_approval_requires_pending_payment() {
        let ctx = context_with_selection();
        let result = ShowApprovalRequestTool::new()
            .execute(json!({"title": "Confirm"}), &ctx)
            .await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_record_decision_from_text() {
        let ctx = context_awaiting_approval();
        ShowApprovalRequestTool::new()
            .execute(json!({"title": "Confirm", "description": "Pay 1.5 USDC"}), &ctx)
            .await;

        let tool = RecordApprovalDecisionTool::new();
        let unclear = tool.execute(json!({"answer": "hmm"}), &ctx).await;
        assert!(!unclear.success);

        let result = tool.execute(json!({"answer": "yes please"}), &ctx).await;
        assert!(result.success);
        assert_eq!(ctx.booking.lock().stage(), BookingStage::Paying);

        let again = tool.execute(json!({"approved": false}), &ctx).await;
        assert!(!again.success);
        assert!(again.content.contains("already approved"));
    }
}
