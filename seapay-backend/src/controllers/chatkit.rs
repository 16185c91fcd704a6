//! ChatKit endpoint
//!
//! One POST route carries every request type. Turn-producing requests answer
//! with a `text/event-stream` of gateway events; the rest answer with JSON.

use actix_web::{web, HttpResponse, Responder};
use futures_util::stream;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::gateway::protocol::GatewayEvent;
use crate::gateway::EventEmitter;
use crate::models::{ThreadItem, WidgetAction};
use crate::AppState;

const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 100;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/chatkit").route(web::post().to(chatkit)));
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum ChatKitRequest {
    #[serde(rename = "threads.create")]
    CreateThread { input: UserInput },
    #[serde(rename = "threads.add_user_message")]
    AddUserMessage { thread_id: String, input: UserInput },
    #[serde(rename = "threads.custom_action")]
    CustomAction { thread_id: String, action: WidgetAction },
    #[serde(rename = "threads.get_by_id")]
    GetThread { thread_id: String },
    #[serde(rename = "threads.list")]
    ListThreads {
        #[serde(default)]
        limit: Option<usize>,
    },
    #[serde(rename = "items.list")]
    ListItems { thread_id: String },
    #[serde(rename = "threads.delete")]
    DeleteThread { thread_id: String },
}

/// User message input, either `{ "text": ".." }` or ChatKit content parts
#[derive(Debug, Default, Deserialize)]
pub struct UserInput {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub content: Vec<InputContent>,
}

#[derive(Debug, Deserialize)]
pub struct InputContent {
    #[serde(rename = "type", default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl UserInput {
    pub fn text(&self) -> String {
        if let Some(ref text) = self.text {
            return text.clone();
        }
        self.content
            .iter()
            .filter(|c| c.content_type.as_deref().map_or(true, |t| t == "input_text" || t == "text"))
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

async fn chatkit(state: web::Data<AppState>, body: web::Bytes) -> impl Responder {
    let request: ChatKitRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return HttpResponse::BadRequest().json(json!({
                "success": false,
                "error": format!("Invalid request: {}", e)
            }));
        }
    };

    match request {
        ChatKitRequest::CreateThread { input } => {
            let text = input.text();
            stream_turn(state, None, move |state, emitter| async move {
                let thread = state.server.create_thread()?;
                emitter.emit(GatewayEvent::thread_created(&thread));
                state.server.respond(&thread.id, &text, &emitter).await?;
                Ok(thread.id)
            })
        }
        ChatKitRequest::AddUserMessage { thread_id, input } => {
            let text = input.text();
            stream_turn(state, Some(thread_id.clone()), move |state, emitter| async move {
                state.server.respond(&thread_id, &text, &emitter).await?;
                Ok(thread_id)
            })
        }
        ChatKitRequest::CustomAction { thread_id, action } => {
            stream_turn(state, Some(thread_id.clone()), move |state, emitter| async move {
                state.server.action(&thread_id, &action, &emitter).await?;
                Ok(thread_id)
            })
        }
        ChatKitRequest::GetThread { thread_id } => get_thread(&state, &thread_id),
        ChatKitRequest::ListThreads { limit } => list_threads(&state, limit.unwrap_or(DEFAULT_LIST_LIMIT)),
        ChatKitRequest::ListItems { thread_id } => list_items(&state, &thread_id),
        ChatKitRequest::DeleteThread { thread_id } => delete_thread(&state, &thread_id),
    }
}

/// Run a turn in the background and stream its events. The stream always
/// ends with `stream.done`, preceded by `stream.error` if the turn failed.
fn stream_turn<F, Fut>(state: web::Data<AppState>, thread_id: Option<String>, run: F) -> HttpResponse
where
    F: FnOnce(web::Data<AppState>, EventEmitter) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<String, String>> + Send + 'static,
{
    let (emitter, rx) = EventEmitter::channel();

    tokio::spawn(async move {
        match run(state, emitter.clone()).await {
            Ok(thread_id) => emitter.emit(GatewayEvent::stream_done(Some(&thread_id))),
            Err(e) => {
                log::warn!("[CHAT] Turn failed: {}", e);
                emitter.emit(GatewayEvent::stream_error(thread_id.as_deref(), &e));
                emitter.emit(GatewayEvent::stream_done(thread_id.as_deref()));
            }
        }
    });

    sse_response(rx)
}

fn sse_response(rx: UnboundedReceiver<GatewayEvent>) -> HttpResponse {
    let body = stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|event| (Ok::<_, actix_web::Error>(web::Bytes::from(event.to_sse())), rx))
    });

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(body)
}

fn item_payloads(items: &[ThreadItem]) -> Vec<Value> {
    items.iter().filter_map(|i| i.to_payload()).collect()
}

fn get_thread(state: &web::Data<AppState>, thread_id: &str) -> HttpResponse {
    let thread = match state.db.get_thread(thread_id) {
        Ok(Some(t)) => t,
        Ok(None) => return thread_not_found(thread_id),
        Err(e) => return internal_error("Failed to load thread", e),
    };
    match state.db.list_thread_items(thread_id) {
        Ok(items) => HttpResponse::Ok().json(json!({
            "success": true,
            "thread": thread,
            "items": item_payloads(&items)
        })),
        Err(e) => internal_error("Failed to load thread items", e),
    }
}

fn list_threads(state: &web::Data<AppState>, limit: usize) -> HttpResponse {
    let limit = limit.min(MAX_LIST_LIMIT);
    // One extra row tells whether there are more
    match state.db.list_threads(limit + 1) {
        Ok(mut threads) => {
            let has_more = threads.len() > limit;
            threads.truncate(limit);
            HttpResponse::Ok().json(json!({
                "success": true,
                "data": threads,
                "has_more": has_more
            }))
        }
        Err(e) => internal_error("Failed to list threads", e),
    }
}

fn list_items(state: &web::Data<AppState>, thread_id: &str) -> HttpResponse {
    match state.db.get_thread(thread_id) {
        Ok(Some(_)) => {}
        Ok(None) => return thread_not_found(thread_id),
        Err(e) => return internal_error("Failed to load thread", e),
    }
    match state.db.list_thread_items(thread_id) {
        Ok(items) => HttpResponse::Ok().json(json!({
            "success": true,
            "data": item_payloads(&items)
        })),
        Err(e) => internal_error("Failed to load thread items", e),
    }
}

fn delete_thread(state: &web::Data<AppState>, thread_id: &str) -> HttpResponse {
    match state.server.delete_thread(thread_id) {
        Ok(true) => HttpResponse::Ok().json(json!({ "success": true })),
        Ok(false) => thread_not_found(thread_id),
        Err(e) => {
            log::error!("[CHAT] {}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": "Internal server error"
            }))
        }
    }
}

fn thread_not_found(thread_id: &str) -> HttpResponse {
    HttpResponse::NotFound().json(json!({
        "success": false,
        "error": format!("Thread not found: {}", thread_id)
    }))
}

fn internal_error(context: &str, e: rusqlite::Error) -> HttpResponse {
    log::error!("[CHAT] {}: {}", context, e);
    HttpResponse::InternalServerError().json(json!({
        "success": false,
        "error": "Internal server error"
    }))
}
