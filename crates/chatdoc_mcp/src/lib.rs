//! MCP (Model Context Protocol) server for chat-a-doc
//!
//! Turns chat content into documents on disk and hands back links to them.
//! Everything a client can influence (output directories, template
//! selections, file requests) is confined to one allowed root.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       AI chat client                          │
//! └──────────────────────────────────────────────────────────────┘
//!          │ POST / (JSON-RPC)                 │ GET /files/...
//!          ▼                                   ▼
//! ┌──────────────────────────┐      ┌───────────────────────────┐
//! │  server (Protocol Bridge)│      │  files (File Server)       │
//! │  sessions, dispatch      │      │  re-validates every path   │
//! └──────────────────────────┘      └───────────────────────────┘
//!          │ tools/call                        │
//!          ▼                                   │
//! ┌──────────────────────────┐                 │
//! │  tools                   │                 │
//! │  convert-contents        │──► links        │
//! │  list-templates          │                 │
//! └──────────────────────────┘                 │
//!          │                                   │
//!          ▼                                   ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  convert (Orchestrator) ─► templates ─► chatdoc_render        │
//! │  PathGuard (chatdoc_security) on every read and write         │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod convert;
pub mod files;
pub mod http;
pub mod links;
pub mod server;
pub mod templates;
pub mod tools;

// Re-exports for convenience
pub use config::{ConfigError, LinkMode, SelectionPolicy, ServerConfig, Settings};
pub use convert::{ConversionError, ConversionJob, GeneratedFile, Orchestrator};
pub use http::{router, serve, AppState};
pub use links::FileReference;
pub use server::{Exchange, McpServer, SessionId, SessionState};
pub use templates::{Template, TemplateError, TemplateResolver};
pub use tools::{Tool, ToolError, ToolRegistry};
