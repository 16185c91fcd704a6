//! Multi-agent booking workflow
//!
//! A conversation is handled by one active agent at a time:
//!
//! ```text
//! Orchestrator → Extractor → MissingInfo → AvailabilityChecker
//!              → Reserver → ApprovalGate → PaymentHandler → Orchestrator
//! ```
//!
//! Each turn starts at the agent matching the booking stage. Agents move the
//! conversation with `transfer_to_<agent>` tools; the orchestrator refuses a
//! handoff the booking is not ready for (no search before all details are
//! known, no payment before the user approved it).

pub mod agents;
pub mod orchestrator;
pub mod tools;
pub mod types;

pub use orchestrator::{Orchestrator, ProcessResult, MAX_AGENT_ITERATIONS};
pub use types::{AgentDefinition, AgentKind, AgentTransition, WorkflowContext};
