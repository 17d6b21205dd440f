//! MCP Tool Implementations
//!
//! Tools are registered in the [`ToolRegistry`] and dispatched by name.
//!
//! - `convert-contents`: render content to a file and return a link to it
//! - `list-templates`: list the templates a docx/pdf request can select

mod convert_contents;
mod list_templates;
mod registry;

pub use convert_contents::ConvertContentsTool;
pub use list_templates::ListTemplatesTool;
pub use registry::ToolRegistry;

use crate::config::LinkMode;
use crate::convert::{ConversionError, Orchestrator};
use crate::templates::TemplateError;
use async_trait::async_trait;
use chatdoc_protocol::{ErrorCode, JsonRpcError, ToolCallResult, ToolDefinition};
use serde_json::Value;
use thiserror::Error;

/// State shared by every tool
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub orchestrator: Orchestrator,
    pub links: LinkMode,
}

/// Errors raised by tools. Each maps to a JSON-RPC error object.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    InvalidParams(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ToolError::InvalidParams(_) | ToolError::UnknownTool(_) => ErrorCode::InvalidParams,
            ToolError::Conversion(e) => e.code(),
            ToolError::Template(e) => e.code(),
            ToolError::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn to_rpc_error(&self) -> JsonRpcError {
        JsonRpcError::new(self.code(), self.to_string())
    }
}

impl From<tokio::task::JoinError> for ToolError {
    fn from(e: tokio::task::JoinError) -> Self {
        ToolError::Internal(format!("conversion task failed: {}", e))
    }
}

/// Trait for MCP tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (e.g., "convert-contents")
    fn name(&self) -> &'static str;

    /// Description shown to the model
    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    async fn execute(&self, args: Value) -> Result<ToolCallResult, ToolError>;

    /// Get the tool definition for tools/list
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Optional string argument. Blank strings count as absent.
pub(crate) fn optional_string(args: &Value, name: &str) -> Result<Option<String>, ToolError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ToolError::InvalidParams(format!(
            "Invalid parameter '{}': expected a string",
            name
        ))),
    }
}

// Macro to reduce boilerplate for required string arguments
macro_rules! require_param {
    ($args:expr, $name:literal, $message:expr) => {
        $crate::tools::optional_string(&$args, $name)?
            .ok_or_else(|| $crate::tools::ToolError::InvalidParams($message.to_string()))?
    };
    ($args:expr, $name:literal) => {
        $crate::tools::optional_string(&$args, $name)?.ok_or_else(|| {
            $crate::tools::ToolError::InvalidParams(
                concat!($name, " parameter is required and must not be empty.").to_string(),
            )
        })?
    };
}

pub(crate) use require_param;

/// Arguments must be a JSON object (or absent).
pub(crate) fn object_args(args: Value) -> Result<Value, ToolError> {
    match args {
        Value::Null => Ok(Value::Object(Default::default())),
        Value::Object(_) => Ok(args),
        _ => Err(ToolError::InvalidParams(
            "Tool arguments must be a JSON object".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn title(args: Value) -> Result<String, ToolError> {
        Ok(require_param!(args, "title"))
    }

    #[test]
    fn test_optional_string() {
        let args = json!({"a": "x", "b": "  ", "c": 3, "d": null});
        assert_eq!(optional_string(&args, "a").unwrap().as_deref(), Some("x"));
        assert_eq!(optional_string(&args, "b").unwrap(), None);
        assert!(optional_string(&args, "c").is_err());
        assert_eq!(optional_string(&args, "d").unwrap(), None);
        assert_eq!(optional_string(&args, "missing").unwrap(), None);
    }

    #[test]
    fn test_require_param() {
        assert_eq!(title(json!({"title": "Report"})).unwrap(), "Report");
        let err = title(json!({})).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParams);
        assert_eq!(err.to_string(), "title parameter is required and must not be empty.");
    }

    #[test]
    fn test_object_args() {
        assert!(object_args(Value::Null).unwrap().is_object());
        assert!(object_args(json!([1, 2])).is_err());
    }

    #[test]
    fn test_error_codes_follow_source() {
        let err = ToolError::from(TemplateError::Required(chatdoc_protocol::TemplateKind::Stylesheet));
        assert_eq!(err.code(), ErrorCode::TemplateRequired);
        assert_eq!(err.to_rpc_error().kind(), Some("template_required"));
        assert_eq!(ToolError::UnknownTool("x".into()).code(), ErrorCode::InvalidParams);
    }
}
