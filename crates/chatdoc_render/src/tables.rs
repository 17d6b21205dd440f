//! Tabular data extraction for CSV output.
//!
//! Markdown is rendered to HTML with raw HTML kept, so markdown tables and
//! hand-written `<table>` markup are found the same way. The first table
//! wins. Content without any table falls back to line-oriented parsing of
//! key/value, tab, pipe and comma separated text.
//!
//! Cells are returned raw; formula neutralization happens at serialization.

use crate::error::{RenderError, Result};
use crate::html::{markdown_to_html, RawHtml};
use regex::Regex;
use std::sync::OnceLock;

pub type Rows = Vec<Vec<String>>;

struct Patterns {
    table: Regex,
    row: Regex,
    cell: Regex,
    tag: Regex,
    separator: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        table: Regex::new(r"(?is)<table[^>]*>(.*?)</table>").expect("valid regex"),
        row: Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("valid regex"),
        cell: Regex::new(r"(?is)<t[dh](?:\s[^>]*)?>(.*?)</t[dh]>").expect("valid regex"),
        tag: Regex::new(r"<[^>]+>").expect("valid regex"),
        separator: Regex::new(r"^[\s|:\-]+$").expect("valid regex"),
    })
}

/// Extract rows of cells from markdown content.
pub fn extract_rows(markdown: &str) -> Result<Rows> {
    let html = markdown_to_html(markdown, RawHtml::Keep);
    let rows = first_html_table(&html)
        .or_else(|| parse_structured_text(markdown))
        .unwrap_or_default();

    if rows.iter().all(Vec::is_empty) {
        return Err(RenderError::NoTableData);
    }
    Ok(rows)
}

/// Rows of the first `<table>` in `html`, if it has any
pub fn first_html_table(html: &str) -> Option<Rows> {
    let p = patterns();
    let table = p.table.captures(html)?.get(1)?.as_str();

    let rows: Rows = p
        .row
        .captures_iter(table)
        .filter_map(|row| {
            let row_html = row.get(1)?.as_str();
            let cells: Vec<String> = p
                .cell
                .captures_iter(row_html)
                .filter_map(|c| c.get(1).map(|m| clean_cell(m.as_str())))
                .collect();
            (!cells.is_empty()).then_some(cells)
        })
        .collect();

    (!rows.is_empty()).then_some(rows)
}

/// Strip tags, decode entities and collapse whitespace
fn clean_cell(html: &str) -> String {
    let text = patterns().tag.replace_all(html, "");
    let decoded = decode_entities(&text);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Line-oriented fallback for content without tables
pub fn parse_structured_text(content: &str) -> Option<Rows> {
    let separator = &patterns().separator;
    let mut rows = Rows::new();

    for line in content.lines().map(str::trim) {
        if line.is_empty() || separator.is_match(line) {
            continue;
        }

        let row: Vec<String> = if line.matches(':').count() == 1 && !line.starts_with("http") {
            let (key, value) = line.split_once(':').unwrap_or((line, ""));
            vec![key.trim().to_string(), value.trim().to_string()]
        } else if line.contains('\t') {
            line.split('\t').map(|c| c.trim().to_string()).collect()
        } else if line.matches('|').count() > 1 {
            line.split('|')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect()
        } else if looks_comma_separated(line) {
            line.split(',').map(|c| c.trim().to_string()).collect()
        } else {
            vec![line.to_string()]
        };

        if !row.is_empty() {
            rows.push(row);
        }
    }

    (!rows.is_empty()).then_some(rows)
}

fn looks_comma_separated(line: &str) -> bool {
    if line.starts_with('=') {
        return false;
    }
    match line.matches(',').count() {
        0 => false,
        1 => !line.replace(',', "").contains(' '),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_markdown_table() {
        let rows = extract_rows("| a | b |\n|---|---|\n|=1+1|x|").unwrap();
        assert_eq!(rows, vec![vec!["a", "b"], vec!["=1+1", "x"]]);
    }

    #[test]
    fn extracts_first_table_only() {
        let md = "| one |\n|---|\n| 1 |\n\ntext\n\n| two |\n|---|\n| 2 |";
        let rows = extract_rows(md).unwrap();
        assert_eq!(rows, vec![vec!["one"], vec!["1"]]);
    }

    #[test]
    fn extracts_embedded_html_table() {
        let md = "Intro\n\n<table>\n<tr><th>Name</th><th>Qty</th></tr>\n<tr><td><b>Apple</b> &amp; pear</td><td>3</td></tr>\n</table>\n";
        let rows = extract_rows(md).unwrap();
        assert_eq!(rows, vec![vec!["Name", "Qty"], vec!["Apple & pear", "3"]]);
    }

    #[test]
    fn cell_whitespace_is_collapsed() {
        let rows = first_html_table("<table><tr><td>  a \n  b  </td></tr></table>").unwrap();
        assert_eq!(rows, vec![vec!["a b"]]);
    }

    #[test]
    fn falls_back_to_key_value_lines() {
        let rows = extract_rows("Name: Alice\nRole: Admin").unwrap();
        assert_eq!(rows, vec![vec!["Name", "Alice"], vec!["Role", "Admin"]]);
    }

    #[test]
    fn falls_back_to_delimited_lines() {
        let rows = extract_rows("a\tb\tc\nx,y,z\nsingle words here").unwrap();
        assert_eq!(
            rows,
            vec![
                vec!["a", "b", "c"],
                vec!["x", "y", "z"],
                vec!["single words here"],
            ]
        );
    }

    #[test]
    fn urls_are_not_split_as_key_value() {
        let rows = parse_structured_text("https://example.com/path").unwrap();
        assert_eq!(rows, vec![vec!["https://example.com/path"]]);
    }

    #[test]
    fn empty_content_has_no_table_data() {
        assert!(matches!(extract_rows(""), Err(RenderError::NoTableData)));
        assert!(matches!(extract_rows("  \n---\n"), Err(RenderError::NoTableData)));
    }
}
