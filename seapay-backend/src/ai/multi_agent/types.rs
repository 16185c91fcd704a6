//! Multi-agent system types

use crate::models::BookingState;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// The agents of the booking workflow
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgentKind {
    /// Top-level agent that routes the conversation
    #[default]
    Orchestrator,
    /// Pulls destination, dates and guests out of free text
    Extractor,
    /// Asks for whatever search detail is still missing
    MissingInfo,
    /// Searches hotels and helps the user pick one
    AvailabilityChecker,
    /// Reserves the selected hotel
    Reserver,
    /// Gets the user's explicit approval for a payment
    ApprovalGate,
    /// Pays for the reservation once approved
    PaymentHandler,
}

const HANDOFF_PREFIX: &str = "transfer_to_";

impl AgentKind {
    pub fn all() -> Vec<AgentKind> {
        AgentKind::iter().collect()
    }

    /// Human-readable label for UI display
    pub fn label(&self) -> &'static str {
        match self {
            AgentKind::Orchestrator => "Booking assistant",
            AgentKind::Extractor => "Detail extractor",
            AgentKind::MissingInfo => "Missing info",
            AgentKind::AvailabilityChecker => "Availability checker",
            AgentKind::Reserver => "Reserver",
            AgentKind::ApprovalGate => "Approval gate",
            AgentKind::PaymentHandler => "Payment handler",
        }
    }

    /// Name of the tool that hands the conversation to this agent
    pub fn handoff_tool_name(&self) -> String {
        format!("{}{}", HANDOFF_PREFIX, self)
    }

    pub fn from_handoff_tool(name: &str) -> Option<AgentKind> {
        name.strip_prefix(HANDOFF_PREFIX)
            .and_then(|kind| kind.parse().ok())
    }
}

/// Declarative bundle of what an agent is told and what it may do
#[derive(Debug, Clone)]
pub struct AgentDefinition {
    pub kind: AgentKind,
    pub name: &'static str,
    pub instructions: &'static str,
    /// Registry tools this agent may call
    pub tools: &'static [&'static str],
    /// Agents this agent may hand the conversation to
    pub handoffs: &'static [AgentKind],
}

impl AgentDefinition {
    pub fn can_hand_off_to(&self, target: AgentKind) -> bool {
        self.handoffs.contains(&target)
    }

    pub fn can_use(&self, tool_name: &str) -> bool {
        self.tools.contains(&tool_name)
    }
}

/// A change of active agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTransition {
    pub from: AgentKind,
    pub to: AgentKind,
    pub reason: String,
}

/// Workflow state persisted per thread between turns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowContext {
    pub active_agent: AgentKind,
    #[serde(default)]
    pub state: BookingState,
    /// Tool calls made by the active agent since it took over
    #[serde(default)]
    pub agent_iterations: u32,
    #[serde(default)]
    pub total_iterations: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handoff_tool_names_round_trip() {
        for kind in AgentKind::all() {
            let name = kind.handoff_tool_name();
            assert_eq!(AgentKind::from_handoff_tool(&name), Some(kind));
        }
        assert_eq!(
            AgentKind::AvailabilityChecker.handoff_tool_name(),
            "transfer_to_availability_checker"
        );
        assert_eq!(AgentKind::from_handoff_tool("transfer_to_nobody"), None);
        assert_eq!(AgentKind::from_handoff_tool("reserve"), None);
    }

    #[test]
    fn test_serde_and_strum_names_agree() {
        let json = serde_json::to_value(AgentKind::MissingInfo).unwrap();
        assert_eq!(json, "missing_info");
        assert_eq!(AgentKind::MissingInfo.to_string(), "missing_info");
        assert_eq!(AgentKind::PaymentHandler.as_ref(), "payment_handler");
    }
}
