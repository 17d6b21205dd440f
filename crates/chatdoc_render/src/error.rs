//! Error types for chatdoc_render

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RenderError>;

/// Failures raised while turning content into document bytes
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("No table data found in input. CSV format requires structured data (tables).")]
    NoTableData,

    #[error("Template is not a valid DOCX package: {0}")]
    InvalidTemplate(String),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
