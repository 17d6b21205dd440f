//! Markdown to HTML.

use crate::document::markdown_options;
use pulldown_cmark::{html, CowStr, Event, Parser, Tag};

/// Controls what survives from raw HTML embedded in markdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RawHtml {
    /// Render raw HTML as visible, escaped text
    #[default]
    Escape,
    /// Pass raw HTML through. Internal use only; never written to disk.
    Keep,
}

/// Render markdown to an HTML fragment.
///
/// Soft line breaks become `<br />` so chat text keeps its line structure.
pub fn markdown_to_html(markdown: &str, raw: RawHtml) -> String {
    let events = Parser::new_ext(markdown, markdown_options()).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        Event::Html(s) | Event::InlineHtml(s) if raw == RawHtml::Escape => Event::Text(s),
        Event::Start(tag) if raw == RawHtml::Escape => Event::Start(neutralize_link(tag)),
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}

/// Render markdown to a standalone HTML document titled `title`.
pub fn render_html(markdown: &str, title: &str) -> String {
    let body = markdown_to_html(markdown, RawHtml::Escape);
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape_html(title),
        body
    )
}

/// Point links and images with a scripting or unknown scheme at `#`.
fn neutralize_link(tag: Tag<'_>) -> Tag<'_> {
    match tag {
        Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        } if !is_safe_url(&dest_url) => Tag::Link {
            link_type,
            dest_url: CowStr::Borrowed("#"),
            title,
            id,
        },
        Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        } if !is_safe_url(&dest_url) => Tag::Image {
            link_type,
            dest_url: CowStr::Borrowed("#"),
            title,
            id,
        },
        other => other,
    }
}

/// Relative URLs and `http`, `https` and `mailto` URLs.
fn is_safe_url(url: &str) -> bool {
    // browsers ignore whitespace and control characters inside a scheme
    let cleaned: String = url
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_control())
        .collect();
    let scheme_end = cleaned.find(|c| matches!(c, ':' | '/' | '?' | '#'));
    match scheme_end {
        Some(i) if cleaned[i..].starts_with(':') => {
            let scheme = cleaned[..i].to_ascii_lowercase();
            matches!(scheme.as_str(), "http" | "https" | "mailto")
        }
        _ => true,
    }
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_tables() {
        let html = markdown_to_html("| a | b |\n|---|---|\n| 1 | 2 |", RawHtml::Escape);
        assert!(html.contains("<table>"));
        assert!(html.contains("<th>a</th>"));
        assert!(html.contains("<td>2</td>"));
    }

    #[test]
    fn soft_breaks_become_br() {
        let html = markdown_to_html("one\ntwo", RawHtml::Escape);
        assert!(html.contains("one<br />"));
    }

    #[test]
    fn raw_html_is_escaped_by_default() {
        let html = render_html("<style>body{display:none}</style>\n\nhi <script>x()</script>", "t");
        assert!(!html.contains("<style>"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn script_links_are_neutralized() {
        let html = render_html(
            "[x](javascript:alert(1)) [y](JavaScript&#58;alert(2)) ![i](data:text/html,hi) [z](java%0Ascript:x)",
            "t",
        );
        assert!(!html.to_ascii_lowercase().contains("javascript:"));
        assert!(!html.contains("data:text"));
        assert!(html.contains("<a href=\"#\">x</a>"));
        assert!(html.contains("src=\"#\""));
    }

    #[test]
    fn ordinary_links_are_kept() {
        let html = render_html(
            "[a](https://example.com/x?y=1) [b](mailto:me@example.com) [c](notes/page.html) [d](#top)",
            "t",
        );
        assert!(html.contains("href=\"https://example.com/x?y=1\""));
        assert!(html.contains("href=\"mailto:me@example.com\""));
        assert!(html.contains("href=\"notes/page.html\""));
        assert!(html.contains("href=\"#top\""));
    }

    #[test]
    fn safe_url_rules() {
        assert!(is_safe_url("HTTPS://example.com"));
        assert!(is_safe_url("relative/path:with-colon"));
        assert!(!is_safe_url(" javascript:alert(1)"));
        assert!(!is_safe_url("java\tscript:alert(1)"));
        assert!(!is_safe_url("vbscript:x"));
    }

    #[test]
    fn raw_html_kept_when_requested() {
        let html = markdown_to_html("<table><tr><td>x</td></tr></table>", RawHtml::Keep);
        assert!(html.contains("<td>x</td>"));
    }

    #[test]
    fn title_is_escaped() {
        let html = render_html("body", "</title><script>alert(1)</script>");
        assert!(html.contains("<title>&lt;/title&gt;&lt;script&gt;"));
        assert_eq!(html.matches("<title>").count(), 1);
    }
}
