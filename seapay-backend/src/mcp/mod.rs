//! MCP client over streamable HTTP
//!
//! Speaks JSON-RPC 2.0 to a single MCP server endpoint. The `initialize`
//! handshake runs lazily on first use and its session id is reused for every
//! later call. A 404 for that session means the server forgot it (e.g. after a
//! restart): the client handshakes again and retries the call once.
//! Responses may arrive as plain JSON or as an SSE stream.

pub mod types;

pub use types::{McpContent, McpToolResult};

use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use types::{JsonRpcRequest, JsonRpcResponse};

pub const PROTOCOL_VERSION: &str = "2025-03-26";
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

pub struct McpClient {
    http: Client,
    url: String,
    /// `None` until the handshake ran. The inner id is `None` for stateless servers.
    session: Mutex<Option<Option<String>>>,
    next_id: AtomicU64,
}

impl McpClient {
    pub fn new(url: &str) -> Result<Self, String> {
        url::Url::parse(url).map_err(|e| format!("Invalid MCP server URL '{}': {}", url, e))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            http,
            url: url.to_string(),
            session: Mutex::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Run the handshake now instead of on the first tool call
    pub async fn initialize(&self) -> Result<(), String> {
        self.session().await.map(|_| ())
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpToolResult, String> {
        let params = json!({ "name": name, "arguments": arguments });
        log::info!("[MCP] Calling tool '{}' on {}", name, self.url);
        log::debug!("[MCP] Arguments: {}", params);

        let session = self.session().await?;
        let request = JsonRpcRequest::call(self.next_id(), "tools/call", params.clone());
        let response = match self.send(&request, session.as_deref()).await {
            Ok((_, response)) => response,
            Err(SendError::SessionExpired(message)) => {
                log::warn!("[MCP] {} - starting a new session", message);
                self.reset_session(session.as_deref()).await;
                let session = self.session().await?;
                let request = JsonRpcRequest::call(self.next_id(), "tools/call", params);
                self.send(&request, session.as_deref()).await?.1
            }
            Err(e) => return Err(e.into()),
        };
        let result = into_result(response)?;
        let parsed: McpToolResult = serde_json::from_value(result)
            .map_err(|e| format!("Malformed result from MCP tool '{}': {}", name, e))?;

        log::info!(
            "[MCP] Tool '{}' returned {} content block(s), is_error={}",
            name,
            parsed.content.len(),
            parsed.is_error
        );
        Ok(parsed)
    }

    async fn session(&self) -> Result<Option<String>, String> {
        let mut session = self.session.lock().await;
        if let Some(ref id) = *session {
            return Ok(id.clone());
        }
        let id = self.handshake().await?;
        *session = Some(id.clone());
        Ok(id)
    }

    /// Forget `stale` so the next call handshakes again. A session another
    /// caller already replaced is left alone.
    async fn reset_session(&self, stale: Option<&str>) {
        let mut session = self.session.lock().await;
        if session.as_ref().is_some_and(|current| current.as_deref() == stale) {
            *session = None;
        }
    }

    async fn handshake(&self) -> Result<Option<String>, String> {
        let request = JsonRpcRequest::call(
            self.next_id(),
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": "seapay-backend",
                    "version": env!("CARGO_PKG_VERSION"),
                }
            }),
        );

        let (session_id, response) = self.send(&request, None).await?;
        let result = into_result(response)?;
        log::info!(
            "[MCP] Connected to {} (server: {}, protocol: {}, session: {})",
            self.url,
            result
                .pointer("/serverInfo/name")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown"),
            result
                .get("protocolVersion")
                .and_then(|v| v.as_str())
                .unwrap_or(PROTOCOL_VERSION),
            session_id.as_deref().unwrap_or("none")
        );

        let notification = JsonRpcRequest::notification("notifications/initialized");
        let response = self
            .post(session_id.as_deref())
            .json(&notification)
            .send()
            .await
            .map_err(|e| format!("MCP initialized notification failed: {}", e))?;
        if !response.status().is_success() {
            return Err(format!(
                "MCP server rejected initialized notification: {}",
                response.status()
            ));
        }

        Ok(session_id)
    }

    async fn send(
        &self,
        request: &JsonRpcRequest,
        session: Option<&str>,
    ) -> Result<(Option<String>, JsonRpcResponse), SendError> {
        let response = self
            .post(session)
            .json(request)
            .send()
            .await
            .map_err(|e| SendError::Failed(format!("MCP request '{}' failed: {}", request.method, e)))?;

        let status = response.status();
        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = response
            .text()
            .await
            .map_err(|e| SendError::Failed(format!("Failed to read MCP response: {}", e)))?;

        if !status.is_success() {
            let message = format!(
                "MCP server returned {} for '{}': {}",
                status,
                request.method,
                truncate(&body, 500)
            );
            if status == StatusCode::NOT_FOUND && session.is_some() {
                return Err(SendError::SessionExpired(message));
            }
            return Err(SendError::Failed(message));
        }

        let parsed = parse_rpc_body(&body, request.id)?;
        Ok((session_id, parsed))
    }

    fn post(&self, session: Option<&str>) -> RequestBuilder {
        let mut builder = self
            .http
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json, text/event-stream");
        if let Some(id) = session {
            builder = builder.header(SESSION_HEADER, id);
        }
        builder
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[derive(Debug)]
enum SendError {
    /// The server no longer knows the session we sent
    SessionExpired(String),
    Failed(String),
}

impl From<String> for SendError {
    fn from(message: String) -> Self {
        SendError::Failed(message)
    }
}

impl From<SendError> for String {
    fn from(e: SendError) -> Self {
        match e {
            SendError::SessionExpired(message) | SendError::Failed(message) => message,
        }
    }
}

/// Parse a JSON-RPC response from either a JSON body or an SSE body.
/// For SSE, the message answering `id` wins; otherwise the last response.
pub fn parse_rpc_body(body: &str, id: Option<u64>) -> Result<JsonRpcResponse, String> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed)
            .map_err(|e| format!("Malformed MCP response: {} - body: {}", e, truncate(body, 500)));
    }

    let mut messages: Vec<JsonRpcResponse> = Vec::new();
    let mut data = String::new();
    let flush = |data: &mut String, messages: &mut Vec<JsonRpcResponse>| {
        if !data.is_empty() {
            if let Ok(msg) = serde_json::from_str::<JsonRpcResponse>(data) {
                if msg.result.is_some() || msg.error.is_some() {
                    messages.push(msg);
                }
            }
            data.clear();
        }
    };

    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            flush(&mut data, &mut messages);
        } else if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    flush(&mut data, &mut messages);

    let wanted = id.map(|i| json!(i));
    let position = messages
        .iter()
        .position(|m| wanted.is_some() && m.id == wanted)
        .or_else(|| messages.len().checked_sub(1));

    match position {
        Some(i) => Ok(messages.swap_remove(i)),
        None => Err(format!(
            "MCP response contained no JSON-RPC result: {}",
            truncate(body, 500)
        )),
    }
}

fn into_result(response: JsonRpcResponse) -> Result<Value, String> {
    if let Some(error) = response.error {
        return Err(match error.data {
            Some(data) => format!("MCP error {}: {} ({})", error.code, error.message, data),
            None => format!("MCP error {}: {}", error.code, error.message),
        });
    }
    response
        .result
        .ok_or_else(|| "MCP response had neither result nor error".to_string())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
