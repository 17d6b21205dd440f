//! `list-templates`: show the templates a docx or pdf conversion can use.

use super::{object_args, optional_string, Tool, ToolContext, ToolError};
use crate::templates::{kind_name, Template, TEMPLATES_DIR};
use async_trait::async_trait;
use chatdoc_protocol::{TemplateKind, ToolCallResult};
use serde_json::{json, Value};
use std::sync::Arc;

pub struct ListTemplatesTool {
    context: Arc<ToolContext>,
}

impl ListTemplatesTool {
    pub fn new(context: Arc<ToolContext>) -> Self {
        Self { context }
    }

    fn parse_kind(args: Value) -> Result<TemplateKind, ToolError> {
        let args = object_args(args)?;
        let format = optional_string(&args, "format")?.unwrap_or_else(|| "docx".into());
        match format.trim().to_ascii_lowercase().as_str() {
            "docx" => Ok(TemplateKind::StyleDocument),
            "pdf" => Ok(TemplateKind::Stylesheet),
            _ => Err(ToolError::InvalidParams(format!(
                "Unsupported format for list-templates: '{}'. Supported formats: 'docx', 'pdf'",
                format
            ))),
        }
    }
}

/// Lettered list plus a label-to-path mapping, in listing order.
pub fn format_listing(kind: TemplateKind, templates: &[Template]) -> String {
    if templates.is_empty() {
        return format!(
            "No {} templates found in {}/. Add a .{} file there to enable {} output.",
            kind_name(&kind),
            TEMPLATES_DIR,
            kind.extension(),
            kind_name(&kind).to_ascii_lowercase()
        );
    }

    let list = templates
        .iter()
        .map(|t| format!("{}. {}", t.label, t.name))
        .collect::<Vec<_>>()
        .join("\n");

    // Built by hand so entries keep listing order (AA after Z)
    let mapping = templates
        .iter()
        .map(|t| {
            format!(
                "  {}: {}",
                Value::String(t.label.clone()),
                Value::String(t.relative_path())
            )
        })
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        "Available {kind} templates in {dir}/:\n\n{list}\n\n\
         Please ask the user which template to use, then pass the letter as {param}.\n\n\
         Template path mapping:\n{{\n{mapping}\n}}",
        kind = kind_name(&kind),
        dir = TEMPLATES_DIR,
        param = kind.parameter(),
    )
}

#[async_trait]
impl Tool for ListTemplatesTool {
    fn name(&self) -> &'static str {
        "list-templates"
    }

    fn description(&self) -> &'static str {
        "Lists the templates in templates/ with letters (A, B, C...). Templates are \
         required for docx (Word templates) and pdf (CSS stylesheets). The response \
         includes the lettered list and a mapping from letters to template paths. \
         Present the list to the user, then pass their choice as reference_doc (docx) \
         or css_template (pdf) to convert-contents."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "format": {
                    "type": "string",
                    "description": "The output format to list templates for ('docx' or 'pdf')",
                    "enum": ["docx", "pdf"],
                    "default": "docx"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolCallResult, ToolError> {
        let kind = Self::parse_kind(args)?;
        let context = self.context.clone();
        let templates =
            tokio::task::spawn_blocking(move || context.orchestrator.templates().list(kind))
                .await??;
        Ok(ToolCallResult::text(format_listing(kind, &templates)))
    }
}
