//! Handoff tools, one `transfer_to_<agent>` per allowed target

use super::types::{AgentDefinition, AgentKind};
use crate::tools::{PropertySchema, ToolDefinition, ToolInputSchema};
use std::collections::HashMap;

/// Create the `transfer_to_<target>` tool
pub fn handoff_tool(target: AgentKind) -> ToolDefinition {
    let mut properties = HashMap::new();
    properties.insert(
        "reason".to_string(),
        PropertySchema {
            schema_type: "string".to_string(),
            description: "Why the conversation should move to this agent".to_string(),
            default: None,
            items: None,
            enum_values: None,
        },
    );

    let description = match target {
        AgentKind::Orchestrator => "Hand the conversation back to the main booking assistant.".to_string(),
        other => format!(
            "Hand the conversation to the {} agent. May be refused if the booking is not ready for that step.",
            other.label().to_lowercase()
        ),
    };

    ToolDefinition {
        name: target.handoff_tool_name(),
        description,
        input_schema: ToolInputSchema {
            schema_type: "object".to_string(),
            properties,
            required: vec!["reason".to_string()],
        },
    }
}

/// Handoff tools for every target `agent` may transfer to
pub fn handoff_tools(agent: &AgentDefinition) -> Vec<ToolDefinition> {
    agent.handoffs.iter().map(|target| handoff_tool(*target)).collect()
}
