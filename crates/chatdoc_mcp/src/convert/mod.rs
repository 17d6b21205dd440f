//! Conversion Orchestrator
//!
//! Sequences one conversion: validate the job, bind a template, pick and
//! confine the output directory, render, then publish under a fresh name.
//! Stateless per call; safe to run any number of jobs concurrently.
//! Everything here blocks, so async callers go through `spawn_blocking`.

pub mod csv;
pub mod output;

use crate::templates::{Template, TemplateError, TemplateResolver, TEMPLATES_DIR};
use chatdoc_protocol::{ErrorCode, JsonRpcError, OutputFormat, TemplateKind, UnsupportedFormat};
use chatdoc_render::{
    extract_rows, render_docx, render_html, render_pdf, render_text, Document, RenderError,
};
use chatdoc_security::{CanonicalPath, PathGuard, PathViolation};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

/// One conversion request. Created per call and dropped after the response.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub title: String,
    pub contents: String,
    pub format: OutputFormat,
    /// Template selection (label, name or path) for docx/pdf
    pub template: Option<String>,
    /// Destination directory relative to the allowed root
    pub output_dir: Option<String>,
}

impl ConversionJob {
    pub fn new(title: impl Into<String>, contents: impl Into<String>, format: OutputFormat) -> Self {
        Self {
            title: title.into(),
            contents: contents.into(),
            format,
            template: None,
            output_dir: None,
        }
    }

    pub fn with_template(mut self, selection: impl Into<String>) -> Self {
        self.template = Some(selection.into());
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<String>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }
}

/// A file written by a successful conversion
#[derive(Debug, Clone)]
pub struct GeneratedFile {
    pub path: CanonicalPath,
    pub format: OutputFormat,
    /// Label of the template used, for docx/pdf
    pub template: Option<String>,
    pub size: u64,
}

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("{0}")]
    InvalidJob(String),

    #[error(transparent)]
    UnsupportedFormat(#[from] UnsupportedFormat),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Path(#[from] PathViolation),

    #[error("Error converting contents to {format}: {source}")]
    Render {
        format: OutputFormat,
        #[source]
        source: RenderError,
    },

    #[error("Error converting contents to csv: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("Failed to write output file: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("Failed to write output file: every file name for this title is already taken")]
    NamesExhausted,
}

impl ConversionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidJob(_) => ErrorCode::InvalidParams,
            Self::UnsupportedFormat(_) => ErrorCode::UnsupportedFormat,
            Self::Template(e) => e.code(),
            Self::Path(_) => ErrorCode::PathViolation,
            Self::Render { .. } | Self::Csv(_) => ErrorCode::RenderFailed,
            Self::WriteFailed(_) | Self::NamesExhausted => ErrorCode::WriteFailed,
        }
    }

    pub fn to_rpc_error(&self) -> JsonRpcError {
        JsonRpcError::new(self.code(), self.to_string())
    }
}

/// Drives rendering delegates and writes their output through the guard
#[derive(Debug, Clone)]
pub struct Orchestrator {
    guard: PathGuard,
    templates: TemplateResolver,
}

impl Orchestrator {
    pub fn new(guard: PathGuard, templates: TemplateResolver) -> Self {
        Self { guard, templates }
    }

    pub fn templates(&self) -> &TemplateResolver {
        &self.templates
    }

    pub fn convert(&self, job: &ConversionJob) -> Result<GeneratedFile, ConversionError> {
        if job.title.trim().is_empty() {
            return Err(ConversionError::InvalidJob(
                "title parameter is required. Please provide a 2-4 word document title.".into(),
            ));
        }
        if job.contents.trim().is_empty() {
            return Err(ConversionError::InvalidJob(
                "contents parameter is required and must not be empty.".into(),
            ));
        }

        let template = match job.format.template_kind() {
            Some(kind) => Some(self.templates.resolve(kind, job.template.as_deref())?),
            None if job.template.is_some() => {
                return Err(ConversionError::InvalidJob(format!(
                    "Templates only apply to docx and pdf output, not {}",
                    job.format
                )));
            }
            None => None,
        };

        let dir = self.output_dir(job.output_dir.as_deref())?;
        let bytes = render(job, template.as_ref())?;
        let path = output::publish(&self.guard, &dir, &job.title, job.format, &bytes)?;

        info!(
            file = %path.relative().display(),
            format = %job.format,
            template = template.as_ref().map(|t| t.name.as_str()).unwrap_or("-"),
            bytes = bytes.len(),
            "Generated document"
        );

        Ok(GeneratedFile {
            path,
            format: job.format,
            template: template.map(|t| t.label),
            size: bytes.len() as u64,
        })
    }

    /// Resolve and create the destination directory.
    fn output_dir(&self, requested: Option<&str>) -> Result<CanonicalPath, ConversionError> {
        let requested = requested.map(str::trim).filter(|d| !d.is_empty());
        let Some(requested) = requested else {
            return Ok(self.guard.validate(self.guard.root())?);
        };

        let dir = self.guard.validate(requested)?;
        if dir.relative().starts_with(TEMPLATES_DIR) {
            warn!("Rejected output directory inside templates/");
            return Err(ConversionError::InvalidJob(format!(
                "output_dir may not be inside {}/",
                TEMPLATES_DIR
            )));
        }

        if !dir.as_path().is_dir() {
            debug!(dir = %dir.relative().display(), "Creating output directory");
            fs::create_dir_all(dir.as_path()).map_err(ConversionError::WriteFailed)?;
        }
        // Re-check now that every component exists and links are resolvable
        let dir = self.guard.validate(dir.as_path())?;
        if !dir.as_path().is_dir() {
            return Err(ConversionError::InvalidJob(
                "output_dir must name a directory".into(),
            ));
        }
        Ok(dir)
    }
}

/// Dispatch to the rendering delegate for the job's format.
fn render(job: &ConversionJob, template: Option<&Template>) -> Result<Vec<u8>, ConversionError> {
    let failed = |source: RenderError| ConversionError::Render {
        format: job.format,
        source,
    };

    let bytes = match job.format {
        OutputFormat::Markdown => job.contents.clone().into_bytes(),
        OutputFormat::Html => render_html(&job.contents, &job.title).into_bytes(),
        OutputFormat::Txt => render_text(&Document::from_markdown(&job.contents)).into_bytes(),
        OutputFormat::Csv => {
            let rows = extract_rows(&job.contents).map_err(failed)?;
            self::csv::write_csv(&rows)?
        }
        OutputFormat::Pdf => {
            let stylesheet = template
                .map(|t| read_template_text(t.path.as_path()))
                .transpose()
                .map_err(failed)?;
            let doc = Document::from_markdown(&job.contents);
            render_pdf(&doc, &job.title, stylesheet.as_deref()).map_err(failed)?
        }
        OutputFormat::Docx => {
            let template = template.ok_or_else(|| {
                ConversionError::Template(TemplateError::Required(TemplateKind::StyleDocument))
            })?;
            let package = fs::read(template.path.as_path()).map_err(|e| failed(e.into()))?;
            let doc = Document::from_markdown(&job.contents);
            render_docx(&doc, &job.title, &package).map_err(failed)?
        }
    };
    Ok(bytes)
}

fn read_template_text(path: &Path) -> Result<String, RenderError> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
