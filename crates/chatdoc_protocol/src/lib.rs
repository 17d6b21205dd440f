//! Shared wire types for chat-a-doc.
//!
//! - [`jsonrpc`]: JSON-RPC 2.0 envelope and error codes
//! - [`mcp`]: MCP handshake, tool catalog and tool call payloads
//! - [`format`]: the closed set of output formats and template kinds
//! - [`naming`]: output file naming derived from document titles

pub mod format;
pub mod jsonrpc;
pub mod mcp;
pub mod naming;

pub use format::{OutputFormat, TemplateKind, UnsupportedFormat};
pub use jsonrpc::{ErrorCode, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId};
pub use mcp::{
    ContentBlock, InitializeParams, InitializeResult, ServerCapabilities, ServerInfo,
    ToolCallParams, ToolCallResult, ToolDefinition, ToolsCapability, ToolsListResult,
};
