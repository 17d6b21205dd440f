//! Protocol Bridge - MCP session state machine
//!
//! Each session starts Uninitialized. A successful `initialize` with a
//! supported protocol version moves it to Ready, after which `tools/list`
//! and `tools/call` are served any number of times. `ping` and
//! notifications are accepted in any state.
//!
//! Sessions are keyed by the `Mcp-Session-Id` header when the client sends
//! one, otherwise by peer address. A successful `initialize` issues a
//! session id and marks both keys Ready, so clients that never echo the
//! header keep working. Initializing again from the same key returns the
//! same id.
//!
//! # Example
//!
//! ```ignore
//! let server = McpServer::new(&config);
//! let exchange = server.handle_body("127.0.0.1", body).await;
//! ```

use crate::config::ServerConfig;
use crate::convert::Orchestrator;
use crate::templates::TemplateResolver;
use crate::tools::{ToolContext, ToolRegistry};
use chatdoc_protocol::mcp::{is_supported_version, methods, SUPPORTED_PROTOCOL_VERSIONS};
use chatdoc_protocol::{
    ErrorCode, InitializeParams, InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    RequestId, ServerCapabilities, ServerInfo, ToolCallParams, ToolsCapability, ToolsListResult,
};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

const INSTRUCTIONS: &str = "Use convert-contents to turn chat content into a downloadable file. \
     For docx or pdf output, call list-templates first and let the user pick a template.";

/// Identifier issued to a client on successful initialize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready { protocol_version: String },
}

/// Responses for one HTTP body
#[derive(Debug, Default)]
pub struct Exchange {
    /// One per non-notification message, in arrival order
    pub responses: Vec<JsonRpcResponse>,
    /// Session id issued by an `initialize` in this body
    pub session_id: Option<SessionId>,
}

/// Session states plus the id issued to each request key.
///
/// A key that initializes again gets its existing id back, so the table
/// holds at most two entries per client key.
#[derive(Debug, Default)]
struct SessionTable {
    states: HashMap<String, SessionState>,
    issued: HashMap<String, SessionId>,
}

impl SessionTable {
    fn session_for(&mut self, key: &str) -> SessionId {
        if let Some(id) = self.issued.get(key) {
            return *id;
        }
        let id = SessionId::new();
        self.issued.insert(key.to_string(), id);
        self.issued.insert(id.to_string(), id);
        id
    }

    /// Remove `key` and every key that shares its session id.
    fn close(&mut self, key: &str) -> bool {
        let mut removed = self.states.remove(key).is_some();
        if let Some(id) = self.issued.remove(key) {
            let aliases: Vec<String> = self
                .issued
                .iter()
                .filter(|(_, issued)| **issued == id)
                .map(|(alias, _)| alias.clone())
                .collect();
            for alias in aliases {
                self.issued.remove(&alias);
                removed |= self.states.remove(&alias).is_some();
            }
        }
        removed
    }
}

/// MCP Server
pub struct McpServer {
    tools: ToolRegistry,
    sessions: RwLock<SessionTable>,
    server_info: ServerInfo,
}

impl McpServer {
    pub fn new(config: &ServerConfig) -> Self {
        let templates = TemplateResolver::new(config.guard.clone(), config.template_selection);
        let orchestrator = Orchestrator::new(config.guard.clone(), templates);
        let tools = ToolRegistry::new(ToolContext {
            orchestrator,
            links: config.links.clone(),
        });

        Self {
            tools,
            sessions: RwLock::new(SessionTable::default()),
            server_info: ServerInfo {
                name: config.server_name.clone(),
                version: config.server_version.clone(),
            },
        }
    }

    /// Current state of a session
    pub async fn state(&self, key: &str) -> SessionState {
        self.sessions
            .read()
            .await
            .states
            .get(key)
            .cloned()
            .unwrap_or(SessionState::Uninitialized)
    }

    /// Drop a session. Returns false if it did not exist.
    pub async fn close_session(&self, key: &str) -> bool {
        let removed = self.sessions.write().await.close(key);
        if removed {
            info!(session = %key, "Session closed");
        }
        removed
    }

    /// Handle a body holding one JSON-RPC message or several in a row.
    ///
    /// Messages may be pretty-printed or newline-delimited. A syntax error
    /// ends the body with a single ParseError response.
    pub async fn handle_body(&self, session_key: &str, body: &str) -> Exchange {
        let mut exchange = Exchange::default();
        let mut key = session_key.to_string();

        for message in serde_json::Deserializer::from_str(body).into_iter::<Value>() {
            let value = match message {
                Ok(value) => value,
                Err(e) => {
                    debug!(error = %e, "Unparseable message");
                    let error = JsonRpcError::parse_error(format!("Parse error: {}", e));
                    exchange.responses.push(JsonRpcResponse::error(RequestId::Null, error));
                    break;
                }
            };

            let (response, issued) = self.handle_message(&key, value).await;
            if let Some(response) = response {
                exchange.responses.push(response);
            }
            if let Some(id) = issued {
                // later messages in the same body belong to the new session
                key = id.to_string();
                exchange.session_id = Some(id);
            }
        }
        exchange
    }

    /// Handle one decoded JSON-RPC message.
    pub async fn handle_message(
        &self,
        session_key: &str,
        value: Value,
    ) -> (Option<JsonRpcResponse>, Option<SessionId>) {
        let fallback_id = value
            .get("id")
            .cloned()
            .and_then(|id| serde_json::from_value::<RequestId>(id).ok())
            .unwrap_or(RequestId::Null);

        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                let error = JsonRpcError::invalid_request(format!("Invalid request: {}", e));
                return (Some(JsonRpcResponse::error(fallback_id, error)), None);
            }
        };

        self.handle_request(session_key, request).await
    }

    /// Handle a parsed request.
    pub async fn handle_request(
        &self,
        session_key: &str,
        request: JsonRpcRequest,
    ) -> (Option<JsonRpcResponse>, Option<SessionId>) {
        if request.jsonrpc != chatdoc_protocol::jsonrpc::JSONRPC_VERSION {
            let error = JsonRpcError::invalid_request(format!(
                "Invalid JSON-RPC version: {}",
                request.jsonrpc
            ));
            let id = request.id.unwrap_or(RequestId::Null);
            return (Some(JsonRpcResponse::error(id, error)), None);
        }

        if request.is_notification() {
            if request.method == methods::INITIALIZED {
                debug!("Client finished initialization");
            } else {
                debug!(method = %request.method, "Notification");
            }
            return (None, None);
        }

        let Some(id) = request.id.clone() else {
            let error = JsonRpcError::invalid_request("Request id is required");
            return (Some(JsonRpcResponse::error(RequestId::Null, error)), None);
        };

        match request.method.as_str() {
            methods::INITIALIZE => {
                let (response, issued) = self.handle_initialize(session_key, id, request.params).await;
                (Some(response), issued)
            }
            methods::PING => (
                Some(JsonRpcResponse::success(id, Value::Object(Default::default()))),
                None,
            ),
            methods::TOOLS_LIST | methods::TOOLS_CALL => {
                if self.state(session_key).await == SessionState::Uninitialized {
                    debug!(method = %request.method, "Rejected before initialize");
                    return (
                        Some(JsonRpcResponse::error(id, JsonRpcError::not_initialized())),
                        None,
                    );
                }
                let response = if request.method == methods::TOOLS_LIST {
                    self.handle_tools_list(id)
                } else {
                    self.handle_tools_call(id, request.params).await
                };
                (Some(response), None)
            }
            other => {
                debug!(method = %other, "Unknown method");
                (
                    Some(JsonRpcResponse::error(id, JsonRpcError::method_not_found(other))),
                    None,
                )
            }
        }
    }

    /// Handle initialize request
    async fn handle_initialize(
        &self,
        session_key: &str,
        id: RequestId,
        params: Option<Value>,
    ) -> (JsonRpcResponse, Option<SessionId>) {
        let params: InitializeParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => {
                    let error = JsonRpcError::invalid_params(format!("Invalid initialize params: {}", e));
                    return (JsonRpcResponse::error(id, error), None);
                }
            },
            None => {
                let error = JsonRpcError::invalid_params("Missing initialize params");
                return (JsonRpcResponse::error(id, error), None);
            }
        };

        if !is_supported_version(&params.protocol_version) {
            warn!(
                version = %params.protocol_version,
                client = %params.client_info.name,
                "Unsupported protocol version"
            );
            let error = JsonRpcError::invalid_params(format!(
                "Unsupported protocol version: {}",
                params.protocol_version
            ))
            .with_data("supported", Value::from(SUPPORTED_PROTOCOL_VERSIONS.to_vec()));
            return (JsonRpcResponse::error(id, error), None);
        }

        let state = SessionState::Ready {
            protocol_version: params.protocol_version.clone(),
        };
        let session_id = {
            let mut sessions = self.sessions.write().await;
            let id = sessions.session_for(session_key);
            sessions.states.insert(session_key.to_string(), state.clone());
            sessions.states.insert(id.to_string(), state);
            id
        };

        info!(
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            protocol = %params.protocol_version,
            session = %session_id,
            "Initialize"
        );

        let result = InitializeResult {
            protocol_version: params.protocol_version,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: self.server_info.clone(),
            instructions: Some(INSTRUCTIONS.to_string()),
        };

        match serde_json::to_value(result) {
            Ok(value) => (JsonRpcResponse::success(id, value), Some(session_id)),
            Err(e) => (
                JsonRpcResponse::error(id, JsonRpcError::internal_error(e.to_string())),
                None,
            ),
        }
    }

    fn handle_tools_list(&self, id: RequestId) -> JsonRpcResponse {
        let result = ToolsListResult {
            tools: self.tools.list_tools(),
        };
        match serde_json::to_value(result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::error(id, JsonRpcError::internal_error(e.to_string())),
        }
    }

    async fn handle_tools_call(&self, id: RequestId, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                let error = JsonRpcError::invalid_params(format!("Invalid tool call params: {}", e));
                return JsonRpcResponse::error(id, error);
            }
            None => {
                return JsonRpcResponse::error(id, JsonRpcError::invalid_params("Missing tool call params"));
            }
        };

        info!("Tool call: {}", params.name);

        match self.tools.call_tool(&params.name, params.arguments).await {
            Ok(result) => match serde_json::to_value(result) {
                Ok(value) => JsonRpcResponse::success(id, value),
                Err(e) => JsonRpcResponse::error(id, JsonRpcError::internal_error(e.to_string())),
            },
            Err(e) => {
                let error = e.to_rpc_error();
                if e.code() == ErrorCode::PathViolation {
                    warn!(tool = %params.name, "Tool call rejected: path outside the allowed root");
                } else {
                    debug!(tool = %params.name, kind = ?error.kind(), "Tool call failed: {}", e);
                }
                JsonRpcResponse::error(id, error)
            }
        }
    }
}
