//! Output formats and the template kind each one consumes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of formats a conversion can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Html,
    Txt,
    Pdf,
    Docx,
    Csv,
    Markdown,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 6] = [
        OutputFormat::Html,
        OutputFormat::Txt,
        OutputFormat::Pdf,
        OutputFormat::Docx,
        OutputFormat::Csv,
        OutputFormat::Markdown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Html => "html",
            OutputFormat::Txt => "txt",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Docx => "docx",
            OutputFormat::Csv => "csv",
            OutputFormat::Markdown => "markdown",
        }
    }

    /// File extension written to disk
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            other => other.as_str(),
        }
    }

    /// Template kind required to render this format, if any
    pub fn template_kind(self) -> Option<TemplateKind> {
        match self {
            OutputFormat::Docx => Some(TemplateKind::StyleDocument),
            OutputFormat::Pdf => Some(TemplateKind::Stylesheet),
            OutputFormat::Html | OutputFormat::Txt | OutputFormat::Csv | OutputFormat::Markdown => {
                None
            }
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported output format: '{0}'. Supported formats are: html, txt, pdf, docx, csv, markdown")]
pub struct UnsupportedFormat(pub String);

impl FromStr for OutputFormat {
    type Err = UnsupportedFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(OutputFormat::Html),
            "txt" | "text" => Ok(OutputFormat::Txt),
            "pdf" => Ok(OutputFormat::Pdf),
            "docx" => Ok(OutputFormat::Docx),
            "csv" => Ok(OutputFormat::Csv),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            _ => Err(UnsupportedFormat(s.to_string())),
        }
    }
}

/// What a template file provides to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    /// A `.docx` whose styles are copied into generated Word documents
    StyleDocument,
    /// A `.css` file applied while laying out PDFs
    Stylesheet,
}

impl TemplateKind {
    pub fn extension(self) -> &'static str {
        match self {
            TemplateKind::StyleDocument => "docx",
            TemplateKind::Stylesheet => "css",
        }
    }

    /// Name of the tool parameter that selects this kind
    pub fn parameter(self) -> &'static str {
        match self {
            TemplateKind::StyleDocument => "reference_doc",
            TemplateKind::Stylesheet => "css_template",
        }
    }
}
