//! Multi-agent orchestrator - manages which booking agent is active
//!
//! Handoffs are requested by the model through `transfer_to_<agent>` tools and
//! checked against the booking state here, so that no prompt can skip the
//! search, the reservation or the user's approval of a payment.

use super::agents::definition;
use super::tools;
use super::types::{AgentDefinition, AgentKind, AgentTransition, WorkflowContext};
use crate::models::{BookingStage, BookingState, SharedBooking};
use crate::tools::{ToolDefinition, ToolRegistry, ToolResult};
use serde_json::Value;

/// Tool calls an agent may make before control returns to the orchestrator
pub const MAX_AGENT_ITERATIONS: u32 = 8;

/// The agent that should handle a turn at the given stage
pub fn agent_for_stage(stage: BookingStage) -> AgentKind {
    match stage {
        BookingStage::CollectingDetails => AgentKind::Extractor,
        BookingStage::ChoosingHotel => AgentKind::AvailabilityChecker,
        BookingStage::Reserving => AgentKind::Reserver,
        BookingStage::AwaitingApproval => AgentKind::ApprovalGate,
        BookingStage::Paying => AgentKind::PaymentHandler,
        BookingStage::Completed => AgentKind::Orchestrator,
    }
}

/// Check that the booking is ready for `target` to take over
pub fn handoff_gate(target: AgentKind, state: &BookingState) -> Result<(), String> {
    match target {
        AgentKind::AvailabilityChecker => {
            let missing = state.missing_fields();
            if !missing.is_empty() {
                return Err(format!(
                    "Cannot check availability yet. Missing: {}",
                    missing.join(", ")
                ));
            }
        }
        AgentKind::Reserver => {
            if state.selected_hotel.is_none() {
                return Err("Cannot reserve yet. The user has not selected a hotel.".to_string());
            }
        }
        AgentKind::ApprovalGate => {
            if !state.payment_required {
                return Err("There is no payment to approve. Reserve the hotel first.".to_string());
            }
        }
        AgentKind::PaymentHandler => {
            if !state.payment_required {
                return Err("No payment is required for this booking.".to_string());
            }
            if !state.is_payment_approved() {
                return Err(
                    "The user has not approved the payment. The approval gate must get approval first."
                        .to_string(),
                );
            }
        }
        AgentKind::Orchestrator | AgentKind::Extractor | AgentKind::MissingInfo => {}
    }
    Ok(())
}

/// The multi-agent orchestrator manages the flow between booking agents
pub struct Orchestrator {
    active_agent: AgentKind,
    booking: SharedBooking,
    agent_iterations: u32,
    total_iterations: u32,
}

impl Orchestrator {
    /// Start a new workflow at the orchestrator agent
    pub fn new(state: BookingState) -> Self {
        Self {
            active_agent: AgentKind::Orchestrator,
            booking: state.shared(),
            agent_iterations: 0,
            total_iterations: 0,
        }
    }

    /// Resume a persisted workflow
    pub fn from_context(context: WorkflowContext) -> Self {
        Self {
            active_agent: context.active_agent,
            booking: context.state.shared(),
            agent_iterations: context.agent_iterations,
            total_iterations: context.total_iterations,
        }
    }

    /// Snapshot for persistence
    pub fn context(&self) -> WorkflowContext {
        WorkflowContext {
            active_agent: self.active_agent,
            state: self.booking.lock().clone(),
            agent_iterations: self.agent_iterations,
            total_iterations: self.total_iterations,
        }
    }

    pub fn active_agent(&self) -> AgentKind {
        self.active_agent
    }

    pub fn active_definition(&self) -> AgentDefinition {
        definition(self.active_agent)
    }

    /// Booking state shared with the tools of this turn
    pub fn booking(&self) -> SharedBooking {
        self.booking.clone()
    }

    pub fn stage(&self) -> BookingStage {
        self.booking.lock().stage()
    }

    /// Move to the agent matching the booking stage. Called at the start of each turn.
    pub fn route_for_stage(&mut self) -> Option<AgentTransition> {
        let stage = self.stage();
        let target = agent_for_stage(stage);
        if target == self.active_agent {
            self.agent_iterations = 0;
            return None;
        }
        let transition = AgentTransition {
            from: self.active_agent,
            to: target,
            reason: format!("Booking is at stage {}", stage),
        };
        self.transition_to(target);
        Some(transition)
    }

    /// System prompt for the active agent, with the current booking state
    pub fn system_prompt(&self) -> String {
        let agent = self.active_definition();
        let booking = self.booking.lock();

        let mut prompt = agent.instructions.to_string();
        prompt.push_str("\n\n---\n\n");
        prompt.push_str("## Current Booking\n\n");
        prompt.push_str(&format!(
            "Today's date: {}\n",
            chrono::Utc::now().date_naive().format("%Y-%m-%d")
        ));
        prompt.push_str(&format!("Stage: {}\n", booking.stage()));
        let missing = booking.missing_fields();
        if missing.is_empty() {
            prompt.push_str("Missing details: none\n\n");
        } else {
            prompt.push_str(&format!("Missing details: {}\n\n", missing.join(", ")));
        }
        prompt.push_str(&booking.format_summary());

        if !agent.handoffs.is_empty() {
            let targets: Vec<String> = agent.handoffs.iter().map(|k| k.handoff_tool_name()).collect();
            prompt.push_str(&format!("\nYou are the {}. Handoffs available: {}\n", agent.name, targets.join(", ")));
        }

        prompt
    }

    /// Registry tools of the active agent plus its handoff tools
    pub fn agent_tools(&self, registry: &ToolRegistry) -> Vec<ToolDefinition> {
        let agent = self.active_definition();
        let mut defs = registry.definitions_for(agent.tools);
        defs.extend(tools::handoff_tools(&agent));
        defs
    }

    pub fn is_handoff(tool_name: &str) -> bool {
        AgentKind::from_handoff_tool(tool_name).is_some()
    }

    /// Whether the active agent may call this registry tool
    pub fn allows_tool(&self, tool_name: &str) -> bool {
        self.active_definition().can_use(tool_name)
    }

    /// Handle a handoff tool call. Other tools are left to the registry.
    pub fn process_tool_call(&mut self, tool_name: &str, params: &Value) -> ProcessResult {
        let Some(target) = AgentKind::from_handoff_tool(tool_name) else {
            return ProcessResult::NotHandled;
        };
        self.total_iterations += 1;

        let agent = self.active_definition();
        if target == self.active_agent {
            return ProcessResult::Error(format!("The {} is already handling the conversation.", agent.name));
        }
        if !agent.can_hand_off_to(target) {
            return ProcessResult::Error(format!(
                "The {} cannot hand off to {}.",
                agent.name, target
            ));
        }
        if let Err(reason) = handoff_gate(target, &self.booking.lock()) {
            log::info!(
                "[ORCHESTRATOR] Refused handoff {} -> {}: {}",
                self.active_agent,
                target,
                reason
            );
            return ProcessResult::Error(reason);
        }

        let reason = params
            .get("reason")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let transition = AgentTransition {
            from: self.active_agent,
            to: target,
            reason,
        };
        self.transition_to(target);
        ProcessResult::Transition(transition)
    }

    /// Count a registry tool call. Forces a return to the orchestrator when
    /// the active agent has used up its iterations.
    pub fn observe_tool_result(&mut self, tool_name: &str, result: &ToolResult) -> Option<AgentTransition> {
        self.agent_iterations += 1;
        self.total_iterations += 1;

        log::debug!(
            "[ORCHESTRATOR] {} ran '{}' (success={}, iteration {}), stage now {}",
            self.active_agent,
            tool_name,
            result.success,
            self.agent_iterations,
            self.stage()
        );

        if self.active_agent != AgentKind::Orchestrator && self.agent_iterations >= MAX_AGENT_ITERATIONS {
            let transition = AgentTransition {
                from: self.active_agent,
                to: AgentKind::Orchestrator,
                reason: format!(
                    "Forced return after {} tool calls by the {}",
                    MAX_AGENT_ITERATIONS, self.active_agent
                ),
            };
            self.transition_to(AgentKind::Orchestrator);
            return Some(transition);
        }
        None
    }

    fn transition_to(&mut self, agent: AgentKind) {
        log::info!("[ORCHESTRATOR] Transitioning {} → {}", self.active_agent, agent);
        self.active_agent = agent;
        self.agent_iterations = 0;
    }
}

/// Result of processing a tool call
#[derive(Debug, PartialEq)]
pub enum ProcessResult {
    /// Not a handoff; execute it as a registry tool
    NotHandled,
    /// The active agent changed
    Transition(AgentTransition),
    /// The handoff was refused
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookingDetails, HotelOption, PaymentDetails, Price};
    use crate::tools::create_default_registry;
    use serde_json::json;

    fn full_details() -> BookingState {
        let mut state = BookingState::new();
        state
            .apply_details(&BookingDetails {
                destination: Some("Lisbon".to_string()),
                checkin_date: Some("2026-11-02".to_string()),
                checkout_date: Some("2026-11-05".to_string()),
                guests: Some(2),
            })
            .unwrap();
        state
    }

    fn with_selection() -> BookingState {
        let mut state = full_details();
        state.set_hotels(vec![HotelOption {
            hotel_name: "Sea Breeze Inn".to_string(),
            location: "Alfama".to_string(),
            dates: String::new(),
            room_type: "Double".to_string(),
            price: Price::Amount(120.into()),
            image_url: None,
        }]);
        state.select_hotel("1").unwrap();
        state
    }

    #[test]
    fn test_routes_by_stage() {
        let mut orchestrator = Orchestrator::new(BookingState::new());
        let transition = orchestrator.route_for_stage().unwrap();
        assert_eq!(transition.to, AgentKind::Extractor);
        assert!(orchestrator.route_for_stage().is_none());

        let mut orchestrator = Orchestrator::new(with_selection());
        orchestrator.route_for_stage();
        assert_eq!(orchestrator.active_agent(), AgentKind::Reserver);
    }

    #[test]
    fn test_availability_handoff_needs_all_details() {
        let mut orchestrator = Orchestrator::new(BookingState::new());
        orchestrator.route_for_stage();

        let refused = orchestrator.process_tool_call("transfer_to_availability_checker", &json!({}));
        let ProcessResult::Error(reason) = refused else {
            panic!("handoff should be refused");
        };
        assert!(reason.contains("destination, checkin_date, checkout_date, guests"));
        assert_eq!(orchestrator.active_agent(), AgentKind::Extractor);

        orchestrator
            .booking()
            .lock()
            .apply_details(&BookingDetails {
                destination: Some("Lisbon".to_string()),
                checkin_date: Some("2026-11-02".to_string()),
                checkout_date: Some("2026-11-05".to_string()),
                guests: Some(2),
            })
            .unwrap();
        let accepted = orchestrator.process_tool_call(
            "transfer_to_availability_checker",
            &json!({"reason": "all details known"}),
        );
        assert!(matches!(accepted, ProcessResult::Transition(ref t) if t.reason == "all details known"));
        assert_eq!(orchestrator.active_agent(), AgentKind::AvailabilityChecker);
    }

    #[test]
    fn test_payment_handoff_requires_approval() {
        let mut state = with_selection();
        state.mark_payment_required(Some(PaymentDetails::default()));
        let mut orchestrator = Orchestrator::new(state);
        orchestrator.route_for_stage();
        assert_eq!(orchestrator.active_agent(), AgentKind::ApprovalGate);

        let refused = orchestrator.process_tool_call("transfer_to_payment_handler", &json!({}));
        assert!(matches!(refused, ProcessResult::Error(_)));

        {
            let booking = orchestrator.booking();
            let mut booking = booking.lock();
            booking.request_approval("Confirm", "Pay").unwrap();
            booking.resolve_approval(true).unwrap();
        }
        let accepted = orchestrator.process_tool_call("transfer_to_payment_handler", &json!({}));
        assert!(matches!(accepted, ProcessResult::Transition(_)));
    }

    #[test]
    fn test_handoff_must_be_declared() {
        let mut orchestrator = Orchestrator::new(BookingState::new());
        orchestrator.route_for_stage();
        // Extractor may not jump straight to payment
        let result = orchestrator.process_tool_call("transfer_to_payment_handler", &json!({}));
        assert!(matches!(result, ProcessResult::Error(ref e) if e.contains("cannot hand off")));
        assert_eq!(orchestrator.process_tool_call("reserve", &json!({})), ProcessResult::NotHandled);
    }

    #[test]
    fn test_agent_tools_include_handoffs() {
        let registry = create_default_registry();
        let mut orchestrator = Orchestrator::new(full_details());
        orchestrator.route_for_stage();
        let names: Vec<String> = orchestrator
            .agent_tools(&registry)
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "check_availability",
                "show_hotel_cards",
                "select_hotel",
                "transfer_to_orchestrator",
                "transfer_to_reserver",
                "transfer_to_extractor",
            ]
        );
        assert!(orchestrator.allows_tool("select_hotel"));
        assert!(!orchestrator.allows_tool("make_payment"));
    }

    #[test]
    fn test_forced_return_after_max_iterations() {
        let mut orchestrator = Orchestrator::new(BookingState::new());
        orchestrator.route_for_stage();
        let result = ToolResult::error("bad date");
        for _ in 0..MAX_AGENT_ITERATIONS - 1 {
            assert!(orchestrator.observe_tool_result("update_booking_details", &result).is_none());
        }
        let forced = orchestrator
            .observe_tool_result("update_booking_details", &result)
            .unwrap();
        assert_eq!(forced.to, AgentKind::Orchestrator);
        assert_eq!(orchestrator.context().agent_iterations, 0);
        assert_eq!(orchestrator.context().total_iterations, MAX_AGENT_ITERATIONS);
    }

    #[test]
    fn test_system_prompt_carries_state() {
        let orchestrator = Orchestrator::from_context(WorkflowContext {
            active_agent: AgentKind::MissingInfo,
            state: BookingState {
                destination: Some("Porto".to_string()),
                ..Default::default()
            },
            ..Default::default()
        });
        let prompt = orchestrator.system_prompt();
        assert!(prompt.starts_with("# Missing Info"));
        assert!(prompt.contains("Missing details: checkin_date, checkout_date, guests"));
        assert!(prompt.contains("- Destination: Porto"));
        assert!(prompt.contains("transfer_to_availability_checker"));
    }
}
