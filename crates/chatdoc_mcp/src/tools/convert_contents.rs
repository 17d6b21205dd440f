//! `convert-contents`: render chat content into a file under the allowed root.

use super::{object_args, optional_string, require_param, Tool, ToolContext, ToolError};
use crate::convert::{ConversionError, ConversionJob, GeneratedFile};
use crate::links::{self, FileReference};
use async_trait::async_trait;
use chatdoc_protocol::{OutputFormat, ToolCallResult};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

pub struct ConvertContentsTool {
    context: Arc<ToolContext>,
}

impl ConvertContentsTool {
    pub fn new(context: Arc<ToolContext>) -> Self {
        Self { context }
    }

    fn parse_job(args: Value) -> Result<ConversionJob, ToolError> {
        let args = object_args(args)?;

        let title = require_param!(
            args,
            "title",
            "title parameter is required. Please provide a 2-4 word document title."
        );
        let contents = require_param!(args, "contents");
        let format: OutputFormat = optional_string(&args, "output_format")?
            .as_deref()
            .unwrap_or("markdown")
            .parse()
            .map_err(ConversionError::from)?;

        let reference_doc = optional_string(&args, "reference_doc")?;
        let css_template = match optional_string(&args, "css_template")? {
            Some(css) => Some(css),
            None => optional_string(&args, "template")?,
        };
        if reference_doc.is_some() && format != OutputFormat::Docx {
            return Err(ToolError::InvalidParams(
                "reference_doc parameter is only supported for docx output format".into(),
            ));
        }
        if css_template.is_some() && format != OutputFormat::Pdf {
            return Err(ToolError::InvalidParams(
                "css_template parameter is only supported for pdf output format".into(),
            ));
        }

        let mut job = ConversionJob::new(title, contents, format);
        job.template = reference_doc.or(css_template);
        job.output_dir = optional_string(&args, "output_dir")?;
        Ok(job)
    }
}

/// Text returned to the client after a successful conversion
pub fn success_message(file: &GeneratedFile, reference: &FileReference) -> String {
    let saved_to = file
        .path
        .relative()
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    format!(
        "Content successfully converted and saved to: {saved_to}\n\n\
         **Generated File:**\n`{display}`\n\n\
         **File Link:** {link}\n\n\
         **To open:** {hint}",
        display = reference.display,
        link = reference.link,
        hint = reference.open_hint(),
    )
}

#[async_trait]
impl Tool for ConvertContentsTool {
    fn name(&self) -> &'static str {
        "convert-contents"
    }

    fn description(&self) -> &'static str {
        "Converts content into a document file (html, txt, pdf, docx, csv or markdown) \
         and returns a link to it. Supply a short title (2-4 words); it names the file. \
         docx output needs a Word template and pdf output needs a CSS template: call \
         list-templates first, show the lettered list to the user, and pass their choice \
         (the letter, the file name, or the path from the mapping) as reference_doc for \
         docx or css_template for pdf. csv output takes the first table in the content."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "contents": {
                    "type": "string",
                    "description": "The content to convert, as markdown"
                },
                "output_format": {
                    "type": "string",
                    "description": "Desired output format (defaults to markdown)",
                    "enum": OutputFormat::ALL.iter().map(|f| f.as_str()).collect::<Vec<_>>(),
                    "default": "markdown"
                },
                "title": {
                    "type": "string",
                    "description": "REQUIRED: document title (2-4 words). Used to build the file name."
                },
                "reference_doc": {
                    "type": "string",
                    "description": "docx only: template letter, file name or path from list-templates (format='docx')"
                },
                "css_template": {
                    "type": "string",
                    "description": "pdf only: template letter, file name or path from list-templates (format='pdf')"
                },
                "template": {
                    "type": "string",
                    "description": "Alias of css_template"
                },
                "output_dir": {
                    "type": "string",
                    "description": "Optional subdirectory (relative to the files root) to save into"
                }
            },
            "required": ["contents", "title"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolCallResult, ToolError> {
        let job = Self::parse_job(args)?;
        debug!(format = %job.format, template = ?job.template, "convert-contents");

        let context = self.context.clone();
        let generated = tokio::task::spawn_blocking(move || context.orchestrator.convert(&job))
            .await??;

        let reference = links::resolve(&generated.path, &self.context.links);
        info!(link = %reference.link, "Conversion complete");
        Ok(ToolCallResult::text(success_message(&generated, &reference)))
    }
}
