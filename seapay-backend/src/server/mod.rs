//! Chat adapter - runs one booking turn per user message or widget action
//!
//! A turn loads the thread's recent items and workflow context, lets the
//! active agent call tools (and hand off) until it answers in plain text, then
//! persists the answer, the widgets it showed and the updated booking state.
//! Every step is streamed through the turn's `EventEmitter`.

use crate::ai::multi_agent::{Orchestrator, ProcessResult};
use crate::ai::{AiClient, Message, ToolCall, ToolHistoryEntry, ToolResponse};
use crate::config::Config;
use crate::db::Database;
use crate::gateway::protocol::GatewayEvent;
use crate::gateway::EventEmitter;
use crate::mcp::McpClient;
use crate::models::{BookingState, ThreadItem, ThreadItemType, ThreadMetadata, WidgetAction};
use crate::tools::{ToolContext, ToolExecution, ToolRegistry, ToolResult};
use crate::widgets::WidgetLibrary;
use crate::x402::X402PaymentInfo;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

/// Maximum number of model calls in one turn
const MAX_TOOL_ITERATIONS: usize = 10;

/// Thread titles are cut to this many characters
const TITLE_MAX_CHARS: usize = 60;

const FALLBACK_REPLY: &str = "Sorry, I couldn't finish that just now. Could you say that again?";

pub struct BookingServer {
    db: Arc<Database>,
    ai: Arc<dyn AiClient>,
    registry: Arc<ToolRegistry>,
    mcp: Option<Arc<McpClient>>,
    widgets: Arc<WidgetLibrary>,
    config: Arc<Config>,
    /// One turn at a time per thread
    thread_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl BookingServer {
    pub fn new(
        db: Arc<Database>,
        ai: Arc<dyn AiClient>,
        registry: Arc<ToolRegistry>,
        mcp: Option<Arc<McpClient>>,
        widgets: Arc<WidgetLibrary>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            db,
            ai,
            registry,
            mcp,
            widgets,
            config,
            thread_locks: DashMap::new(),
        }
    }

    pub fn create_thread(&self) -> Result<ThreadMetadata, String> {
        let thread = ThreadMetadata::new();
        self.db
            .create_thread(&thread)
            .map_err(|e| format!("Failed to create thread: {}", e))?;
        log::info!("[CHAT] Created thread {}", thread.id);
        Ok(thread)
    }

    pub fn delete_thread(&self, thread_id: &str) -> Result<bool, String> {
        self.thread_locks.remove(thread_id);
        self.db
            .delete_thread(thread_id)
            .map_err(|e| format!("Failed to delete thread: {}", e))
    }

    /// Current booking state of a thread
    pub fn booking_state(&self, thread_id: &str) -> Result<Option<BookingState>, String> {
        self.require_thread(thread_id)?;
        let context = self
            .db
            .get_workflow_context(thread_id)
            .map_err(|e| format!("Failed to load workflow context: {}", e))?;
        Ok(context.map(|c| c.state))
    }

    /// Handle a user message: store it, then run a turn
    pub async fn respond(&self, thread_id: &str, text: &str, emitter: &EventEmitter) -> Result<(), String> {
        let text = text.trim();
        if text.is_empty() {
            return Err("Message cannot be empty".to_string());
        }

        let lock = self.thread_lock(thread_id);
        let _guard = lock.lock().await;

        let thread = self.require_thread(thread_id)?;
        if thread.title.is_none() {
            let title: String = text.chars().take(TITLE_MAX_CHARS).collect();
            if let Err(e) = self.db.set_thread_title(thread_id, &title) {
                log::warn!("[CHAT] Failed to set title of thread {}: {}", thread_id, e);
            }
        }

        self.store_item(ThreadItem::new(thread_id, ThreadItemType::UserMessage, text), emitter)?;

        let orchestrator = self.load_orchestrator(thread_id)?;
        self.run_turn(thread_id, orchestrator, emitter).await
    }

    /// Handle a widget action (approve/reject buttons, hotel card selection)
    pub async fn action(&self, thread_id: &str, action: &WidgetAction, emitter: &EventEmitter) -> Result<(), String> {
        let lock = self.thread_lock(thread_id);
        let _guard = lock.lock().await;

        self.require_thread(thread_id)?;
        let orchestrator = self.load_orchestrator(thread_id)?;
        let booking = orchestrator.booking();

        log::info!("[CHAT] Action '{}' on thread {}", action.action_type, thread_id);

        let note = match action.action_type.as_str() {
            "request.approve" | "request.reject" => {
                let approved = action.action_type == "request.approve";
                let resolved = {
                    let mut state = booking.lock();
                    let pending_id = state.approval.as_ref().map(|a| a.id.clone());
                    if let Some(id) = action.payload.get("approval_id").and_then(|v| v.as_str()) {
                        if pending_id.as_deref() != Some(id) {
                            return Err("This approval request is no longer active".to_string());
                        }
                    }
                    state.resolve_approval(approved)?
                };
                emitter.emit(GatewayEvent::approval_resolved(thread_id, &resolved));
                if approved {
                    format!("The user approved \"{}\" using the approval buttons. Proceed with the payment.", resolved.title)
                } else {
                    format!("The user rejected \"{}\" using the approval buttons. Do not pay; ask how they want to continue.", resolved.title)
                }
            }
            "hotel.select" => {
                let name = action
                    .payload
                    .get("hotelName")
                    .and_then(|v| v.as_str())
                    .map(str::trim)
                    .filter(|n| !n.is_empty());
                let index = match action.payload.get("index") {
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(Value::Number(n)) => Some(n.to_string()),
                    _ => None,
                };
                let hotel = {
                    let mut state = booking.lock();
                    let choice = match (name, index) {
                        // The name identifies the card, its position may belong to an older search
                        (Some(name), _) => {
                            let position = state
                                .hotels
                                .iter()
                                .position(|h| h.hotel_name.eq_ignore_ascii_case(name))
                                .ok_or_else(|| {
                                    format!(
                                        "{} is not among the hotels currently offered. Please choose from the latest results.",
                                        name
                                    )
                                })?;
                            format!("#{}", position + 1)
                        }
                        (None, Some(index)) => index,
                        (None, None) => return Err("hotel.select needs an index or hotelName".to_string()),
                    };
                    state.select_hotel(&choice)?
                };
                format!(
                    "The user selected {} ({}, {}) from the hotel cards.",
                    hotel.hotel_name, hotel.location, hotel.room_type
                )
            }
            other => return Err(format!("Unknown action: {}", other)),
        };

        self.store_item(ThreadItem::new(thread_id, ThreadItemType::HiddenContext, note), emitter)?;
        self.run_turn(thread_id, orchestrator, emitter).await
    }

    /// Run the active agent until it answers in text. The caller holds the thread lock.
    async fn run_turn(&self, thread_id: &str, mut orchestrator: Orchestrator, emitter: &EventEmitter) -> Result<(), String> {
        let history = self
            .db
            .recent_thread_items(thread_id, self.config.history_limit)
            .map_err(|e| format!("Failed to load thread history: {}", e))?;
        let history = history_to_messages(&history);

        if let Some(transition) = orchestrator.route_for_stage() {
            emitter.emit(GatewayEvent::agent_handoff(
                thread_id,
                transition.from.as_ref(),
                transition.to.as_ref(),
                &transition.reason,
            ));
        }

        let mut tool_context = ToolContext::new(
            thread_id,
            orchestrator.booking(),
            self.widgets.clone(),
            self.config.clone(),
        )
        .with_emitter(emitter.clone());
        if let Some(ref mcp) = self.mcp {
            tool_context = tool_context.with_mcp(mcp.clone());
        }

        let outcome = self
            .run_tool_loop(thread_id, &mut orchestrator, &history, &tool_context, emitter)
            .await;

        // State changes made by tools are kept even when the model call failed
        if let Err(e) = self.db.save_workflow_context(thread_id, &orchestrator.context()) {
            log::error!("[CHAT] Failed to save workflow context for {}: {}", thread_id, e);
        }

        let reply = outcome?;
        if !reply.trim().is_empty() {
            self.store_item(
                ThreadItem::new(thread_id, ThreadItemType::AssistantMessage, reply.trim()),
                emitter,
            )?;
        }
        Ok(())
    }

    async fn run_tool_loop(
        &self,
        thread_id: &str,
        orchestrator: &mut Orchestrator,
        history: &[Message],
        tool_context: &ToolContext,
        emitter: &EventEmitter,
    ) -> Result<String, String> {
        let mut tool_history: Vec<ToolHistoryEntry> = Vec::new();

        for iteration in 1..=MAX_TOOL_ITERATIONS {
            // Prompt and tools follow the active agent, which may change mid-turn
            let mut messages = Vec::with_capacity(history.len() + 1);
            messages.push(Message::system(orchestrator.system_prompt()));
            messages.extend_from_slice(history);
            let tools = orchestrator.agent_tools(&self.registry);

            log::info!(
                "[TOOL_LOOP] Thread {} iteration {} with {} ({} tools)",
                thread_id,
                iteration,
                orchestrator.active_agent(),
                tools.len()
            );

            let response = self
                .ai
                .generate_with_tools(messages, tool_history.clone(), tools)
                .await?;

            if response.tool_calls.is_empty() {
                return Ok(response.content);
            }

            if !response.content.trim().is_empty() {
                emitter.emit(GatewayEvent::progress_update(thread_id, response.content.trim()));
            }

            let tool_responses = self
                .execute_tool_calls(&response.tool_calls, orchestrator, tool_context, emitter)
                .await;
            tool_history.push(ToolHistoryEntry::new(response.tool_calls, tool_responses));
        }

        log::warn!(
            "[TOOL_LOOP] Thread {} exceeded max iterations ({})",
            thread_id,
            MAX_TOOL_ITERATIONS
        );
        Ok(FALLBACK_REPLY.to_string())
    }

    async fn execute_tool_calls(
        &self,
        tool_calls: &[ToolCall],
        orchestrator: &mut Orchestrator,
        tool_context: &ToolContext,
        emitter: &EventEmitter,
    ) -> Vec<ToolResponse> {
        let thread_id = tool_context.thread_id.as_str();
        let mut responses = Vec::new();

        for call in tool_calls {
            match orchestrator.process_tool_call(&call.name, &call.arguments) {
                ProcessResult::Transition(transition) => {
                    emitter.emit(GatewayEvent::agent_handoff(
                        thread_id,
                        transition.from.as_ref(),
                        transition.to.as_ref(),
                        &transition.reason,
                    ));
                    responses.push(ToolResponse::success(
                        call.id.clone(),
                        format!("Transferred to the {}.", transition.to.label()),
                    ));
                    continue;
                }
                ProcessResult::Error(e) => {
                    responses.push(ToolResponse::error(call.id.clone(), e));
                    continue;
                }
                ProcessResult::NotHandled => {}
            }

            let agent = orchestrator.active_agent();
            if !orchestrator.allows_tool(&call.name) {
                log::warn!("[TOOL_LOOP] {} tried to use '{}'", agent, call.name);
                responses.push(ToolResponse::error(
                    call.id.clone(),
                    format!("The {} cannot use the '{}' tool.", agent.label(), call.name),
                ));
                continue;
            }

            emitter.emit(GatewayEvent::tool_call(thread_id, agent.as_ref(), &call.name, &call.arguments));

            let start = std::time::Instant::now();
            let result = self
                .registry
                .execute(&call.name, call.arguments.clone(), tool_context)
                .await;
            let duration_ms = start.elapsed().as_millis() as i64;

            emitter.emit(GatewayEvent::tool_result(thread_id, &call.name, result.success, duration_ms));

            if let Err(e) = self.db.log_tool_execution(&ToolExecution {
                id: None,
                thread_id: thread_id.to_string(),
                agent: agent.to_string(),
                tool_name: call.name.clone(),
                parameters: call.arguments.clone(),
                success: result.success,
                result: Some(result.content.clone()),
                duration_ms: Some(duration_ms),
                executed_at: Utc::now().to_rfc3339(),
            }) {
                log::error!("[TOOL_LOOP] Failed to log tool execution: {}", e);
            }

            log::info!(
                "[TOOL_LOOP] Tool '{}' executed in {}ms, success: {}",
                call.name,
                duration_ms,
                result.success
            );

            self.persist_tool_outputs(thread_id, &result, emitter);

            if let Some(transition) = orchestrator.observe_tool_result(&call.name, &result) {
                emitter.emit(GatewayEvent::agent_handoff(
                    thread_id,
                    transition.from.as_ref(),
                    transition.to.as_ref(),
                    &transition.reason,
                ));
            }

            responses.push(if result.success {
                ToolResponse::success(call.id.clone(), result.content)
            } else {
                ToolResponse::error(call.id.clone(), result.content)
            });
        }

        responses
    }

    /// Store the widget and payment a tool produced
    fn persist_tool_outputs(&self, thread_id: &str, result: &ToolResult, emitter: &EventEmitter) {
        if let Some(widget) = result.widget() {
            let item = ThreadItem::widget(thread_id, &widget);
            match self.store_item(item.clone(), emitter) {
                Ok(()) => emitter.emit(GatewayEvent::widget_rendered(thread_id, &item.id, &widget.kind)),
                Err(e) => log::error!("[CHAT] {}", e),
            }
        }

        let payment = result
            .metadata
            .as_ref()
            .and_then(|m| m.get("payment"))
            .filter(|p| !p.is_null())
            .and_then(|p| serde_json::from_value::<X402PaymentInfo>(p.clone()).ok());
        if let Some(payment) = payment {
            if let Err(e) = self.db.record_x402_payment(Some(thread_id), &payment) {
                log::error!("[CHAT] Failed to record x402 payment: {}", e);
            }
        }
    }

    fn store_item(&self, item: ThreadItem, emitter: &EventEmitter) -> Result<(), String> {
        self.db
            .add_thread_item(&item)
            .map_err(|e| format!("Failed to store thread item: {}", e))?;
        emitter.emit_opt(GatewayEvent::thread_item_added(&item));
        emitter.emit_opt(GatewayEvent::thread_item_done(&item));
        Ok(())
    }

    fn require_thread(&self, thread_id: &str) -> Result<ThreadMetadata, String> {
        self.db
            .get_thread(thread_id)
            .map_err(|e| format!("Failed to load thread: {}", e))?
            .ok_or_else(|| format!("Thread not found: {}", thread_id))
    }

    fn load_orchestrator(&self, thread_id: &str) -> Result<Orchestrator, String> {
        let context = self
            .db
            .get_workflow_context(thread_id)
            .map_err(|e| format!("Failed to load workflow context: {}", e))?;
        Ok(match context {
            Some(context) => Orchestrator::from_context(context),
            None => Orchestrator::new(BookingState::new()),
        })
    }

    fn thread_lock(&self, thread_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.thread_locks
            .entry(thread_id.to_string())
            .or_default()
            .clone()
    }
}

/// Replay thread items to the model. Widgets are replaced by their summary.
fn history_to_messages(items: &[ThreadItem]) -> Vec<Message> {
    items
        .iter()
        .map(|item| match item.item_type {
            ThreadItemType::UserMessage => Message::user(item.content.clone()),
            ThreadItemType::AssistantMessage => Message::assistant(item.content.clone()),
            ThreadItemType::Widget => {
                let summary = item
                    .widget_content()
                    .map(|w| w.summary)
                    .unwrap_or_else(|| "a widget".to_string());
                Message::assistant(format!("[Widget shown to the user: {}]", summary))
            }
            ThreadItemType::HiddenContext => Message::system(item.content.clone()),
        })
        .collect()
}
