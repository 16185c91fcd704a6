//! The seven booking agents

use super::types::{AgentDefinition, AgentKind};

pub fn definition(kind: AgentKind) -> AgentDefinition {
    match kind {
        AgentKind::Orchestrator => AgentDefinition {
            kind,
            name: "SeaPay booking assistant",
            instructions: include_str!("prompts/orchestrator.md"),
            tools: &[],
            handoffs: &[
                AgentKind::Extractor,
                AgentKind::MissingInfo,
                AgentKind::AvailabilityChecker,
                AgentKind::Reserver,
                AgentKind::ApprovalGate,
                AgentKind::PaymentHandler,
            ],
        },
        AgentKind::Extractor => AgentDefinition {
            kind,
            name: "Booking detail extractor",
            instructions: include_str!("prompts/extractor.md"),
            tools: &["update_booking_details"],
            handoffs: &[
                AgentKind::Orchestrator,
                AgentKind::MissingInfo,
                AgentKind::AvailabilityChecker,
            ],
        },
        AgentKind::MissingInfo => AgentDefinition {
            kind,
            name: "Missing info agent",
            instructions: include_str!("prompts/missing_info.md"),
            tools: &["update_booking_details"],
            handoffs: &[AgentKind::Orchestrator, AgentKind::AvailabilityChecker],
        },
        AgentKind::AvailabilityChecker => AgentDefinition {
            kind,
            name: "Availability checker",
            instructions: include_str!("prompts/availability_checker.md"),
            tools: &["check_availability", "show_hotel_cards", "select_hotel"],
            handoffs: &[
                AgentKind::Orchestrator,
                AgentKind::Reserver,
                AgentKind::Extractor,
            ],
        },
        AgentKind::Reserver => AgentDefinition {
            kind,
            name: "Reservation agent",
            instructions: include_str!("prompts/reserver.md"),
            tools: &["select_hotel", "reserve"],
            handoffs: &[
                AgentKind::Orchestrator,
                AgentKind::ApprovalGate,
                AgentKind::AvailabilityChecker,
            ],
        },
        AgentKind::ApprovalGate => AgentDefinition {
            kind,
            name: "Approval gate",
            instructions: include_str!("prompts/approval_gate.md"),
            tools: &["show_approval_request", "record_approval_decision"],
            handoffs: &[
                AgentKind::Orchestrator,
                AgentKind::PaymentHandler,
                AgentKind::Reserver,
            ],
        },
        AgentKind::PaymentHandler => AgentDefinition {
            kind,
            name: "Payment handler",
            instructions: include_str!("prompts/payment_handler.md"),
            tools: &["make_payment"],
            handoffs: &[AgentKind::Orchestrator],
        },
    }
}
