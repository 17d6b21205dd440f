//! Plain text rendering.

use crate::document::{Block, Document, Span};

/// Render a document as readable plain text.
pub fn render_text(doc: &Document) -> String {
    let mut out = String::new();
    let mut previous_was_item = false;

    for block in &doc.blocks {
        let is_item = matches!(block, Block::ListItem { .. });
        if !out.is_empty() && !(is_item && previous_was_item) {
            out.push('\n');
        }

        match block {
            Block::Heading { spans, .. } | Block::Paragraph(spans) => {
                out.push_str(&inline_text(spans));
                out.push('\n');
            }
            Block::ListItem {
                ordered,
                number,
                depth,
                spans,
            } => {
                let indent = "  ".repeat(*depth);
                let marker = if *ordered {
                    format!("{}. ", number)
                } else {
                    "* ".to_string()
                };
                // Continuation lines line up under the item text
                let hanging = format!("\n{}{}", indent, " ".repeat(marker.len()));
                out.push_str(&indent);
                out.push_str(&marker);
                out.push_str(&inline_text(spans).replace('\n', &hanging));
                out.push('\n');
            }
            Block::CodeBlock(code) => {
                for line in code.lines() {
                    out.push_str("    ");
                    out.push_str(line);
                    out.push('\n');
                }
            }
            Block::Table(table) => {
                for row in table.all_rows() {
                    out.push_str(&row.join(" | "));
                    out.push('\n');
                }
            }
            Block::Rule => out.push_str("----------\n"),
        }

        previous_was_item = is_item;
    }

    out
}

/// Flatten spans, writing links as `text (url)`
fn inline_text(spans: &[Span]) -> String {
    let mut out = String::new();
    for span in spans {
        out.push_str(&span.text);
        if let Some(url) = &span.link {
            if url != &span.text {
                out.push_str(" (");
                out.push_str(url);
                out.push(')');
            }
        }
    }
    out
}
