//! Rendering delegates for chat-a-doc.
//!
//! Every renderer is a pure function from content (plus an optional style
//! source) to bytes or text. None of them touch the filesystem; callers
//! decide where output goes and how templates are read.
//!
//! - [`render_html`]: standalone HTML with raw markup escaped
//! - [`render_text`]: readable plain text
//! - [`render_pdf`]: A4 PDF, optionally styled by a CSS stylesheet
//! - [`render_docx`]: Word document built on a style-document template
//! - [`extract_rows`]: the first table in the content, for CSV output

pub mod css;
pub mod document;
pub mod docx;
pub mod error;
pub mod html;
pub mod pdf;
pub mod tables;
pub mod text;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use document::{Block, Document, Span, Table};
pub use docx::render_docx;
pub use error::{RenderError, Result};
pub use html::{markdown_to_html, render_html, RawHtml};
pub use pdf::render_pdf;
pub use tables::{extract_rows, Rows};
pub use text::render_text;
