//! JSON-RPC 2.0 envelope types.
//!
//! Responses echo the caller's id verbatim. Notifications (methods under
//! `notifications/` sent without an id) get no response.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC protocol version string
pub const JSONRPC_VERSION: &str = "2.0";

// =============================================================================
// Envelope
// =============================================================================

/// JSON-RPC 2.0 Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Request ID (absent for notifications)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,

    /// Method name
    pub method: String,

    /// Method parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    /// A `notifications/*` message without an id. It never gets a response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none() && self.method.starts_with("notifications/")
    }
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Request ID this response corresponds to
    pub id: RequestId,

    /// Result (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: RequestId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Request identifier.
///
/// Numbers are kept as `serde_json::Number` so that ids such as `7.0` or
/// very large integers are echoed back exactly as sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(serde_json::Number),
    Null,
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n.into())
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Error codes used on the wire.
///
/// The `-32000..-32099` range is reserved by JSON-RPC for server errors;
/// domain failures live there so clients can branch on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    NotInitialized,
    PathViolation,
    TemplateRequired,
    TemplateSelectionRequired,
    TemplateNotFound,
    UnsupportedFormat,
    RenderFailed,
    WriteFailed,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::NotInitialized => -32002,
            ErrorCode::PathViolation => -32001,
            ErrorCode::TemplateRequired => -32010,
            ErrorCode::TemplateSelectionRequired => -32011,
            ErrorCode::TemplateNotFound => -32012,
            ErrorCode::UnsupportedFormat => -32013,
            ErrorCode::RenderFailed => -32020,
            ErrorCode::WriteFailed => -32021,
        }
    }

    /// Machine-readable kind, sent as `error.data.kind`
    pub fn kind(self) -> &'static str {
        match self {
            ErrorCode::ParseError => "parse_error",
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::MethodNotFound => "method_not_found",
            ErrorCode::InvalidParams => "invalid_params",
            ErrorCode::InternalError => "internal_error",
            ErrorCode::NotInitialized => "not_initialized",
            ErrorCode::PathViolation => "path_violation",
            ErrorCode::TemplateRequired => "template_required",
            ErrorCode::TemplateSelectionRequired => "template_selection_required",
            ErrorCode::TemplateNotFound => "template_not_found",
            ErrorCode::UnsupportedFormat => "unsupported_format",
            ErrorCode::RenderFailed => "render_failed",
            ErrorCode::WriteFailed => "write_failed",
        }
    }
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,

    /// Error message
    pub message: String,

    /// Additional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Build an error carrying `{"kind": ...}` as data
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: Some(serde_json::json!({ "kind": code.kind() })),
        }
    }

    /// Merge extra fields into `data`
    pub fn with_data(mut self, key: &str, value: Value) -> Self {
        if let Some(Value::Object(map)) = self.data.as_mut() {
            map.insert(key.to_string(), value);
        }
        self
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::MethodNotFound,
            format!("Method not found: {}", method),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn not_initialized() -> Self {
        Self::new(ErrorCode::NotInitialized, "Server not initialized")
    }

    /// Kind string from `data`, if present
    pub fn kind(&self) -> Option<&str> {
        self.data.as_ref()?.get("kind")?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request() {
        let json = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#;
        let req: JsonRpcRequest = serde_json::from_str(json).unwrap();

        assert_eq!(req.jsonrpc, "2.0");
        assert_eq!(req.id, Some(RequestId::from(1_i64)));
        assert_eq!(req.method, "initialize");
        assert!(!req.is_notification());
    }

    #[test]
    fn test_parse_notification() {
        let json = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        let req: JsonRpcRequest = serde_json::from_str(json).unwrap();

        assert!(req.id.is_none());
        assert!(req.is_notification());
    }

    #[test]
    fn test_notification_method_with_id_is_a_request() {
        let json = r#"{"jsonrpc":"2.0","id":77,"method":"notifications/foo"}"#;
        let req: JsonRpcRequest = serde_json::from_str(json).unwrap();

        assert!(!req.is_notification());
    }

    #[test]
    fn test_ids_echo_verbatim() {
        for raw in [r#""abc-123""#, "42", "7.5", "18446744073709551615"] {
            let json = format!(r#"{{"jsonrpc":"2.0","id":{},"method":"ping"}}"#, raw);
            let req: JsonRpcRequest = serde_json::from_str(&json).unwrap();
            let resp = JsonRpcResponse::success(req.id.unwrap(), Value::Null);
            let out = serde_json::to_value(&resp).unwrap();
            assert_eq!(out["id"].to_string(), raw);
        }
    }

    #[test]
    fn test_null_id_serializes_as_null() {
        let resp = JsonRpcResponse::error(RequestId::Null, JsonRpcError::parse_error("bad"));
        let out = serde_json::to_value(&resp).unwrap();
        assert!(out["id"].is_null());
        assert_eq!(out["error"]["code"], -32700);
        assert!(out.get("result").is_none());
    }

    #[test]
    fn test_error_carries_kind() {
        let err = JsonRpcError::new(ErrorCode::TemplateRequired, "no templates")
            .with_data("format", Value::String("docx".into()));

        assert_eq!(err.code, -32010);
        assert_eq!(err.kind(), Some("template_required"));
        assert_eq!(err.data.as_ref().unwrap()["format"], "docx");
    }

    #[test]
    fn test_method_not_found_message() {
        let err = JsonRpcError::method_not_found("resources/list");
        assert_eq!(err.code, -32601);
        assert!(err.message.contains("resources/list"));
    }
}
