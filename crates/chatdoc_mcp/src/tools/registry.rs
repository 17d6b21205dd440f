//! Tool Registry - Tool Discovery and Dispatch
//!
//! Maintains the list of available tools and dispatches calls by name.
//! Registration order is the `tools/list` order.

use super::{ConvertContentsTool, ListTemplatesTool, Tool, ToolContext, ToolError};
use chatdoc_protocol::{ToolCallResult, ToolDefinition};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Registry of available MCP tools
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a registry with every tool registered
    pub fn new(context: ToolContext) -> Self {
        let context = Arc::new(context);
        let mut registry = Self { tools: Vec::new() };

        registry.register(Box::new(ConvertContentsTool::new(context.clone())));
        registry.register(Box::new(ListTemplatesTool::new(context)));

        debug!("Registered {} tools", registry.tools.len());
        registry
    }

    fn register(&mut self, tool: Box<dyn Tool>) {
        debug!("Registering tool: {}", tool.name());
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    /// List all available tools
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Call a tool by name
    pub async fn call_tool(&self, name: &str, args: Value) -> Result<ToolCallResult, ToolError> {
        let tool = self
            .get_tool(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.execute(args).await
    }

    /// Get a tool by name
    pub fn get_tool(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }
}
