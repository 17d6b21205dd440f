//! HTTP surface
//!
//! - `POST /`: one JSON-RPC message, or several back to back, for the MCP bridge
//! - `DELETE /`: close the session named by `Mcp-Session-Id`
//! - `GET /files/{*path}`: generated files, read-only

use crate::config::ServerConfig;
use crate::files;
use crate::server::McpServer;
use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use chatdoc_protocol::mcp::SESSION_HEADER;
use chatdoc_protocol::{JsonRpcError, JsonRpcResponse, RequestId};
use chatdoc_security::PathGuard;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Session key used when neither a session header nor a peer address is known
const LOCAL_SESSION: &str = "local";

#[derive(Clone)]
pub struct AppState {
    pub server: Arc<McpServer>,
    pub guard: PathGuard,
    pub max_request_bytes: usize,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            server: Arc::new(McpServer::new(config)),
            guard: config.guard.clone(),
            max_request_bytes: config.max_request_bytes,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let session_header = HeaderName::from_static(SESSION_HEADER);
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, session_header.clone()])
        .expose_headers([session_header])
        .max_age(Duration::from_secs(86400));

    Router::new()
        .route("/", post(rpc).delete(close_session))
        .route("/files/{*path}", get(files::serve_file))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C or SIGTERM.
pub async fn serve(config: ServerConfig, addr: SocketAddr) -> Result<()> {
    let app = router(AppState::new(&config));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(
        %addr,
        root = %config.guard.root().display(),
        links = ?config.links,
        templates = %config.template_selection,
        "chat-a-doc listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server failed")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

fn session_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

async fn rpc(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let session_key = session_header(&parts.headers)
        .or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| LOCAL_SESSION.to_string());

    let bytes = match axum::body::to_bytes(body, state.max_request_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(limit = state.max_request_bytes, "Request body rejected: {}", e);
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let text = match std::str::from_utf8(&bytes) {
        Ok(text) => text,
        Err(_) => {
            let response = JsonRpcResponse::error(
                RequestId::Null,
                JsonRpcError::parse_error("Request body is not valid UTF-8"),
            );
            return json_response(vec![response], None);
        }
    };

    debug!(session = %session_key, bytes = bytes.len(), "JSON-RPC body");
    let exchange = state.server.handle_body(&session_key, text).await;
    json_response(
        exchange.responses,
        exchange.session_id.map(|id| id.to_string()),
    )
}

fn json_response(responses: Vec<JsonRpcResponse>, session_id: Option<String>) -> Response {
    let mut builder = Response::builder();
    if let Some(id) = session_id.and_then(|id| HeaderValue::from_str(&id).ok()) {
        builder = builder.header(SESSION_HEADER, id);
    }

    let result = if responses.is_empty() {
        builder.status(StatusCode::ACCEPTED).body(Body::empty())
    } else {
        let lines: Vec<String> = responses
            .iter()
            .filter_map(|r| match serde_json::to_string(r) {
                Ok(line) => Some(line),
                Err(e) => {
                    error!("Failed to serialize response: {}", e);
                    None
                }
            })
            .collect();
        builder
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(lines.join("\n")))
    };

    result.unwrap_or_else(|e| {
        error!("Failed to build response: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })
}

async fn close_session(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    let Some(id) = session_header(&headers) else {
        return StatusCode::BAD_REQUEST;
    };
    if state.server.close_session(&id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
