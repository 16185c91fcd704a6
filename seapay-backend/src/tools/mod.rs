pub mod builtin;
pub mod registry;
pub mod types;

pub use registry::{Tool, ToolRegistry};
pub use types::{PropertySchema, ToolContext, ToolDefinition, ToolExecution, ToolInputSchema, ToolResult};

use std::sync::Arc;

/// Register all built-in tools to a registry
fn register_all_tools(registry: &mut ToolRegistry) {
    // Details collection
    registry.register(Arc::new(builtin::UpdateBookingDetailsTool::new()));

    // Search and selection (MCP)
    registry.register(Arc::new(builtin::CheckAvailabilityTool::new()));
    registry.register(Arc::new(builtin::ShowHotelCardsTool::new()));
    registry.register(Arc::new(builtin::SelectHotelTool::new()));

    // Reservation (MCP)
    registry.register(Arc::new(builtin::ReserveTool::new()));

    // Approval gate
    registry.register(Arc::new(builtin::ShowApprovalRequestTool::new()));
    registry.register(Arc::new(builtin::RecordApprovalDecisionTool::new()));

    // Payment (x402)
    registry.register(Arc::new(builtin::MakePaymentTool::new()));
}

/// Create a new ToolRegistry with all built-in tools registered
pub fn create_default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_all_tools(&mut registry);
    registry
}
