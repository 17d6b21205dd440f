//! PDF output with `lopdf`.
//!
//! Layout is deliberately simple: A4 pages, base-14 fonts with WinAnsi
//! encoding, greedy word wrap using average glyph widths, and a new page
//! whenever the next line would cross the bottom margin.

use crate::css::{FontFamily, PageStyle};
use crate::document::{Block, Document, Span};
use crate::error::Result;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Object, Stream, StringFormat};

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const LINE_HEIGHT: f32 = 1.3;
const LIST_INDENT: f32 = 18.0;
const CODE_INDENT: f32 = 12.0;

/// Render a document to PDF bytes, styled by an optional CSS stylesheet.
pub fn render_pdf(doc: &Document, title: &str, stylesheet: Option<&str>) -> Result<Vec<u8>> {
    let style = stylesheet.map(PageStyle::from_css).unwrap_or_default();
    let fonts = layout_fonts(style.font_family);
    let mut layout = Layout::new(style);
    for block in &doc.blocks {
        layout.block(block);
    }
    let unmappable = layout.unmappable + count_unmappable(title);
    if unmappable > 0 {
        tracing::warn!(
            replaced = unmappable,
            "PDF fonts cannot show some characters; they were replaced with '?'"
        );
    }
    let pages = layout.finish();
    tracing::debug!(pages = pages.len(), "laid out PDF");
    write_pdf(pages, &fonts, title)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Face {
    Regular,
    Bold,
    Italic,
    BoldItalic,
    Mono,
}

impl Face {
    const ALL: [Face; 5] = [
        Face::Regular,
        Face::Bold,
        Face::Italic,
        Face::BoldItalic,
        Face::Mono,
    ];

    fn for_span(span: &Span) -> Self {
        match (span.code, span.bold, span.italic) {
            (true, _, _) => Face::Mono,
            (false, true, true) => Face::BoldItalic,
            (false, true, false) => Face::Bold,
            (false, false, true) => Face::Italic,
            (false, false, false) => Face::Regular,
        }
    }

    fn resource(self) -> &'static str {
        match self {
            Face::Regular => "F1",
            Face::Bold => "F2",
            Face::Italic => "F3",
            Face::BoldItalic => "F4",
            Face::Mono => "F5",
        }
    }

    /// Average advance width as a fraction of the font size
    fn width_factor(self) -> f32 {
        match self {
            Face::Mono => 0.6,
            Face::Bold | Face::BoldItalic => 0.55,
            Face::Regular | Face::Italic => 0.5,
        }
    }
}

/// Base-14 font names for each face
fn layout_fonts(family: FontFamily) -> [(Face, &'static str); 5] {
    let [regular, bold, italic, bold_italic] = match family {
        FontFamily::Sans => [
            "Helvetica",
            "Helvetica-Bold",
            "Helvetica-Oblique",
            "Helvetica-BoldOblique",
        ],
        FontFamily::Serif => ["Times-Roman", "Times-Bold", "Times-Italic", "Times-BoldItalic"],
        FontFamily::Mono => [
            "Courier",
            "Courier-Bold",
            "Courier-Oblique",
            "Courier-BoldOblique",
        ],
    };
    [
        (Face::Regular, regular),
        (Face::Bold, bold),
        (Face::Italic, italic),
        (Face::BoldItalic, bold_italic),
        (Face::Mono, "Courier"),
    ]
}

fn text_width(text: &str, face: Face, size: f32) -> f32 {
    text.chars().count() as f32 * face.width_factor() * size
}

#[derive(Debug, Default)]
struct Line {
    runs: Vec<(Face, String)>,
    width: f32,
}

impl Line {
    fn push(&mut self, face: Face, text: &str, size: f32) {
        self.width += text_width(text, face, size);
        match self.runs.last_mut() {
            Some((last, run)) if *last == face => run.push_str(text),
            _ => self.runs.push((face, text.to_string())),
        }
    }

    fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Greedy word wrap of styled spans into lines no wider than `max_width`
fn wrap(spans: &[(Face, &str)], size: f32, max_width: f32) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut line = Line::default();

    for (face, text) in spans {
        for (i, segment) in text.split('\n').enumerate() {
            if i > 0 {
                lines.push(std::mem::take(&mut line));
            }
            let mut pending_space = false;
            for (j, word) in segment.split(' ').enumerate() {
                if j > 0 {
                    pending_space = true;
                }
                if word.is_empty() {
                    continue;
                }
                let space = if pending_space && !line.is_empty() {
                    text_width(" ", *face, size)
                } else {
                    0.0
                };
                let width = text_width(word, *face, size);
                if !line.is_empty() && line.width + space + width > max_width {
                    lines.push(std::mem::take(&mut line));
                } else if space > 0.0 {
                    line.push(*face, " ", size);
                }
                pending_space = false;
                push_word(&mut lines, &mut line, *face, word, size, max_width);
            }
            // Trailing space carries into the next span
            if pending_space && !line.is_empty() {
                line.push(*face, " ", size);
            }
        }
    }

    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// Push a word, breaking it across lines if it is wider than a whole line
fn push_word(
    lines: &mut Vec<Line>,
    line: &mut Line,
    face: Face,
    word: &str,
    size: f32,
    max_width: f32,
) {
    if text_width(word, face, size) <= max_width - line.width {
        line.push(face, word, size);
        return;
    }
    let per_line = ((max_width / (face.width_factor() * size)).floor() as usize).max(1);
    let chars: Vec<char> = word.chars().collect();
    for chunk in chars.chunks(per_line) {
        let chunk: String = chunk.iter().collect();
        if !line.is_empty() && line.width + text_width(&chunk, face, size) > max_width {
            lines.push(std::mem::take(line));
        }
        line.push(face, &chunk, size);
    }
}

struct Layout {
    style: PageStyle,
    pages: Vec<Vec<Operation>>,
    ops: Vec<Operation>,
    y: f32,
    /// Characters the base-14 fonts cannot show
    unmappable: usize,
}

impl Layout {
    fn new(style: PageStyle) -> Self {
        let top = PAGE_HEIGHT - style.margin;
        Self {
            style,
            pages: Vec::new(),
            ops: Vec::new(),
            y: top,
            unmappable: 0,
        }
    }

    fn content_width(&self) -> f32 {
        (PAGE_WIDTH - 2.0 * self.style.margin).max(72.0)
    }

    fn new_page(&mut self) {
        let ops = std::mem::take(&mut self.ops);
        self.pages.push(ops);
        self.y = PAGE_HEIGHT - self.style.margin;
    }

    fn at_page_top(&self) -> bool {
        self.y >= PAGE_HEIGHT - self.style.margin
    }

    fn space(&mut self, amount: f32) {
        if !self.at_page_top() {
            self.y -= amount;
        }
    }

    fn ensure(&mut self, height: f32) {
        if self.y - height < self.style.margin && !self.at_page_top() {
            self.new_page();
        }
    }

    fn line(&mut self, line: &Line, x: f32, size: f32) {
        self.ensure(size * LINE_HEIGHT);
        let baseline = self.y - size;
        let mut cursor = x;
        for (face, text) in &line.runs {
            self.ops.push(Operation::new("BT", vec![]));
            self.ops
                .push(Operation::new("Tf", vec![face.resource().into(), size.into()]));
            self.ops
                .push(Operation::new("Td", vec![cursor.into(), baseline.into()]));
            self.unmappable += count_unmappable(text);
            self.ops.push(Operation::new(
                "Tj",
                vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
            ));
            self.ops.push(Operation::new("ET", vec![]));
            cursor += text_width(text, *face, size);
        }
        self.y -= size * LINE_HEIGHT;
    }

    fn paragraph(&mut self, spans: &[(Face, &str)], size: f32, indent: f32) {
        let lines = wrap(spans, size, self.content_width() - indent);
        let x = self.style.margin + indent;
        for line in &lines {
            self.line(line, x, size);
        }
    }

    fn block(&mut self, block: &Block) {
        let body = self.style.body_size;
        match block {
            Block::Heading { level, spans } => {
                let size = self.style.heading_size(*level);
                self.space(size * 0.6);
                let faced: Vec<_> = spans
                    .iter()
                    .map(|s| (if s.code { Face::Mono } else { Face::Bold }, s.text.as_str()))
                    .collect();
                self.paragraph(&faced, size, 0.0);
                self.space(size * 0.3);
            }
            Block::Paragraph(spans) => {
                self.paragraph(&faced_spans(spans), body, 0.0);
                self.space(body * 0.6);
            }
            Block::ListItem {
                ordered,
                number,
                depth,
                spans,
            } => {
                let marker = if *ordered {
                    format!("{}. ", number)
                } else {
                    "\u{2022} ".to_string()
                };
                let indent = LIST_INDENT * (*depth as f32 + 1.0);
                let mut faced = vec![(Face::Regular, marker.as_str())];
                faced.extend(faced_spans(spans));
                self.paragraph(&faced, body, indent);
                self.space(body * 0.2);
            }
            Block::CodeBlock(code) => {
                let size = self.style.code_size;
                for line in code.lines() {
                    // Keep leading indentation, which word wrap would collapse
                    let lines = wrap(&[(Face::Mono, line)], size, self.content_width() - CODE_INDENT);
                    let indent = line.len() - line.trim_start_matches(' ').len();
                    let x = self.style.margin + CODE_INDENT + text_width(&" ".repeat(indent), Face::Mono, size);
                    if lines.is_empty() {
                        self.line(&Line::default(), x, size);
                    }
                    for wrapped in &lines {
                        self.line(wrapped, x, size);
                    }
                }
                self.space(body * 0.6);
            }
            Block::Table(table) => {
                let header = table.header.join(" | ");
                if !table.header.is_empty() {
                    self.paragraph(&[(Face::Bold, header.as_str())], body, 0.0);
                }
                for row in &table.rows {
                    let row = row.join(" | ");
                    self.paragraph(&[(Face::Regular, row.as_str())], body, 0.0);
                }
                self.space(body * 0.6);
            }
            Block::Rule => {
                self.ensure(body);
                let y = self.y - body / 2.0;
                let left = self.style.margin;
                let right = PAGE_WIDTH - self.style.margin;
                self.ops.extend([
                    Operation::new("w", vec![0.5_f32.into()]),
                    Operation::new("m", vec![left.into(), y.into()]),
                    Operation::new("l", vec![right.into(), y.into()]),
                    Operation::new("S", vec![]),
                ]);
                self.y -= body;
            }
        }
    }

    fn finish(mut self) -> Vec<Vec<Operation>> {
        if !self.ops.is_empty() || self.pages.is_empty() {
            self.new_page();
        }
        self.pages
    }
}

fn faced_spans(spans: &[Span]) -> Vec<(Face, &str)> {
    spans
        .iter()
        .map(|s| (Face::for_span(s), s.text.as_str()))
        .collect()
}

fn win_ansi_byte(c: char) -> Option<u8> {
    match c {
        '\u{20AC}' => Some(0x80),
        '\u{2026}' => Some(0x85),
        '\u{2018}' => Some(0x91),
        '\u{2019}' => Some(0x92),
        '\u{201C}' => Some(0x93),
        '\u{201D}' => Some(0x94),
        '\u{2022}' => Some(0x95),
        '\u{2013}' => Some(0x96),
        '\u{2014}' => Some(0x97),
        '\u{2122}' => Some(0x99),
        '\t' => Some(b' '),
        c if (' '..='~').contains(&c) || ('\u{A0}'..='\u{FF}').contains(&c) => Some(c as u8),
        _ => None,
    }
}

/// Encode text for a WinAnsiEncoding font. Unmappable characters become `?`.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars().map(|c| win_ansi_byte(c).unwrap_or(b'?')).collect()
}

fn count_unmappable(text: &str) -> usize {
    text.chars().filter(|c| win_ansi_byte(*c).is_none()).count()
}

/// PDF text string for the Info dictionary: plain ASCII as is, anything
/// else as UTF-16BE with a byte order mark.
fn info_text(text: &str) -> Vec<u8> {
    if text.chars().all(|c| (' '..='~').contains(&c)) {
        return text.as_bytes().to_vec();
    }
    let mut out = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out
}

fn write_pdf(pages: Vec<Vec<Operation>>, fonts: &[(Face, &str); 5], title: &str) -> Result<Vec<u8>> {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut font_dict = lopdf::Dictionary::new();
    for face in Face::ALL {
        let base = fonts
            .iter()
            .find(|(f, _)| *f == face)
            .map(|(_, name)| *name)
            .unwrap_or("Helvetica");
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => base,
            "Encoding" => "WinAnsiEncoding",
        });
        font_dict.set(face.resource(), font_id);
    }
    let resources_id = doc.add_object(dictionary! {
        "Font" => font_dict,
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(lopdf::Dictionary::new(), content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "Resources" => resources_id,
        "MediaBox" => vec![0_i64.into(), 0_i64.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let created = chrono::Utc::now().format("D:%Y%m%d%H%M%SZ").to_string();
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::String(info_text(title), StringFormat::Literal),
        "Producer" => Object::string_literal("chat-a-doc"),
        "CreationDate" => Object::string_literal(created),
    });
    doc.trailer.set("Info", info_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}
