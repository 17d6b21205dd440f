//! Page style read from a CSS stylesheet template.
//!
//! Only a handful of properties matter for PDF output; everything else in
//! the stylesheet is ignored. The stylesheet is data, never a sink for
//! document content.

use regex::Regex;
use std::sync::OnceLock;

/// Points per CSS unit
const PT_PER_IN: f32 = 72.0;
const PT_PER_CM: f32 = 28.346_457;
const PT_PER_MM: f32 = 2.834_645_7;
const PT_PER_PX: f32 = 0.75;

const MIN_FONT_SIZE: f32 = 4.0;
const MAX_FONT_SIZE: f32 = 72.0;
const MAX_MARGIN: f32 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFamily {
    Sans,
    Serif,
    Mono,
}

impl FontFamily {
    /// Map a CSS `font-family` list onto one of the base-14 families
    fn from_css(value: &str) -> Option<Self> {
        for name in value.split(',') {
            let name = name
                .trim()
                .trim_matches(|c| c == '"' || c == '\'')
                .to_ascii_lowercase();
            if name.contains("mono") || name.contains("courier") {
                return Some(Self::Mono);
            }
            if name.contains("sans") || name.contains("helvetica") || name.contains("arial") {
                return Some(Self::Sans);
            }
            if name.contains("serif") || name.contains("times") || name.contains("georgia") {
                return Some(Self::Serif);
            }
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageStyle {
    pub margin: f32,
    pub font_family: FontFamily,
    pub body_size: f32,
    /// h1, h2, h3; lower levels use h3
    pub heading_sizes: [f32; 3],
    pub code_size: f32,
}

impl Default for PageStyle {
    fn default() -> Self {
        Self {
            margin: 72.0,
            font_family: FontFamily::Sans,
            body_size: 11.0,
            heading_sizes: [22.0, 18.0, 15.0],
            code_size: 10.0,
        }
    }
}

impl PageStyle {
    pub fn heading_size(&self, level: u8) -> f32 {
        let index = usize::from(level.clamp(1, 3)) - 1;
        self.heading_sizes[index]
    }

    /// Read the supported properties out of `css`, keeping defaults for the rest.
    pub fn from_css(css: &str) -> Self {
        let mut style = Self::default();
        let css = comment_regex().replace_all(css, "");

        // body first so `em` sizes elsewhere resolve against it
        let rules: Vec<(String, Vec<(String, String)>)> = rule_regex()
            .captures_iter(&css)
            .map(|c| (c[1].trim().to_ascii_lowercase(), declarations(&c[2])))
            .collect();

        for (selectors, decls) in &rules {
            if has_selector(selectors, &["body", "html"]) {
                for (prop, value) in decls {
                    match prop.as_str() {
                        "font-size" => {
                            if let Some(size) = length(value, style.body_size) {
                                style.body_size = size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
                            }
                        }
                        "font-family" => {
                            if let Some(family) = FontFamily::from_css(value) {
                                style.font_family = family;
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        for (selectors, decls) in &rules {
            for (prop, value) in decls {
                if selectors.starts_with("@page") {
                    if prop == "margin" {
                        let first = value.split_whitespace().next().unwrap_or("");
                        if let Some(margin) = length(first, style.body_size) {
                            style.margin = margin.clamp(0.0, MAX_MARGIN);
                        }
                    }
                    continue;
                }
                if prop != "font-size" {
                    continue;
                }
                let Some(size) = length(value, style.body_size) else {
                    continue;
                };
                let size = size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
                for (i, tag) in ["h1", "h2", "h3"].iter().enumerate() {
                    if has_selector(selectors, &[tag]) {
                        style.heading_sizes[i] = size;
                    }
                }
                if has_selector(selectors, &["pre", "code"]) {
                    style.code_size = size;
                }
            }
        }

        style
    }
}

fn comment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid regex"))
}

fn rule_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([^{}]+)\{([^{}]*)\}").expect("valid regex"))
}

fn length_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+(?:\.\d+)?|\.\d+)\s*(pt|px|in|cm|mm|em|rem)?$").expect("valid regex")
    })
}

fn declarations(block: &str) -> Vec<(String, String)> {
    block
        .split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let value = value.trim().trim_end_matches("!important").trim();
            Some((prop.trim().to_ascii_lowercase(), value.to_string()))
        })
        .collect()
}

fn has_selector(selectors: &str, wanted: &[&str]) -> bool {
    selectors
        .split(',')
        .filter_map(|s| s.split_whitespace().last())
        .any(|s| wanted.contains(&s))
}

/// Parse a CSS length into points. Unitless numbers are points.
fn length(value: &str, em: f32) -> Option<f32> {
    let caps = length_regex().captures(value.trim())?;
    let number: f32 = caps[1].parse().ok()?;
    let points = match caps.get(2).map(|m| m.as_str()) {
        None | Some("pt") => number,
        Some("px") => number * PT_PER_PX,
        Some("in") => number * PT_PER_IN,
        Some("cm") => number * PT_PER_CM,
        Some("mm") => number * PT_PER_MM,
        Some(_) => number * em,
    };
    Some(points)
}
