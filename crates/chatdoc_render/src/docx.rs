//! DOCX output built on a style-document template.
//!
//! The template package is copied part for part. Only `word/document.xml`
//! is regenerated: its root element (and so its namespace declarations) and
//! its final section properties come from the template, the body comes from
//! the document model. Styles are referenced by id only when the template's
//! `word/styles.xml` defines them; otherwise runs get direct formatting.

use crate::document::{Block, Document, Span, Table};
use crate::error::{RenderError, Result};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::Reader;
use regex::Regex;
use std::collections::HashSet;
use std::io::{Cursor, Read, Write};
use std::sync::OnceLock;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const DOCUMENT_PART: &str = "word/document.xml";
const STYLES_PART: &str = "word/styles.xml";
const CORE_PART: &str = "docProps/core.xml";

const CODE_FONT: &str = "Courier New";
/// Half-points
const CODE_SIZE: u32 = 20;
/// Direct formatting sizes for headings when the template has no heading styles
const HEADING_SIZES: [u32; 6] = [32, 28, 26, 24, 22, 22];
/// Twips
const TEXT_WIDTH: u32 = 9000;
const LIST_INDENT: u32 = 720;

/// Render a document to DOCX bytes using `template` for styles and page setup.
pub fn render_docx(doc: &Document, title: &str, template: &[u8]) -> Result<Vec<u8>> {
    let parts = read_package(template)?;

    let document_xml = parts
        .iter()
        .find(|(name, _)| name == DOCUMENT_PART)
        .map(|(_, bytes)| bytes.as_slice())
        .ok_or_else(|| RenderError::InvalidTemplate(format!("missing {}", DOCUMENT_PART)))?;
    let shell = read_shell(document_xml)?;

    let styles = match parts.iter().find(|(name, _)| name == STYLES_PART) {
        Some((_, bytes)) => style_ids(bytes)?,
        None => HashSet::new(),
    };
    tracing::debug!(styles = styles.len(), "loaded template styles");

    let mut body = BodyWriter::new(&styles);
    for block in &doc.blocks {
        body.block(block);
    }
    let generated = shell.wrap(&body.finish());

    let mut out = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, bytes) in &parts {
        out.start_file(name.as_str(), options)?;
        match name.as_str() {
            DOCUMENT_PART => out.write_all(generated.as_bytes())?,
            CORE_PART => out.write_all(&set_core_title(bytes, title))?,
            _ => out.write_all(bytes)?,
        }
    }
    Ok(out.finish()?.into_inner())
}

/// All file entries of a package, in archive order
fn read_package(bytes: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut parts = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let name = file.name().to_string();
        if name.ends_with('/') {
            continue;
        }
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        parts.push((name, contents));
    }
    Ok(parts)
}

/// Ids of every style defined in a `styles.xml` part
pub fn style_ids(xml: &[u8]) -> Result<HashSet<String>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut ids = HashSet::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"style" => {
                if let Some(id) = get_attr(e, b"w:styleId") {
                    ids.insert(id);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(ids)
}

fn get_attr(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| String::from_utf8(a.value.to_vec()).ok())
}

/// The parts of the template's main document that survive regeneration
#[derive(Debug)]
struct Shell {
    root: String,
    sect_pr: Option<String>,
}

impl Shell {
    fn wrap(&self, body: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n{}<w:body>{}{}</w:body></w:document>",
            self.root,
            body,
            self.sect_pr.as_deref().unwrap_or("")
        )
    }
}

fn read_shell(xml: &[u8]) -> Result<Shell> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut root = None;
    let mut sect_pr = None;
    let mut depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                depth += 1;
                if depth == 1 {
                    if e.local_name().as_ref() != b"document" {
                        return Err(RenderError::InvalidTemplate(
                            "main part is not a w:document".to_string(),
                        ));
                    }
                    root = Some(format!("<{}>", String::from_utf8_lossy(&e)));
                } else if depth == 3 && e.local_name().as_ref() == b"sectPr" {
                    // Final section properties are the last sectPr child of w:body
                    let name = e.name().as_ref().to_vec();
                    reader.read_to_end_into(QName(&name), &mut Vec::new())?;
                    let end = reader.buffer_position() as usize;
                    sect_pr = element_slice(xml, &name, end);
                    depth -= 1;
                }
            }
            Event::Empty(e) if depth == 2 && e.local_name().as_ref() == b"sectPr" => {
                let name = e.name().as_ref().to_vec();
                let end = reader.buffer_position() as usize;
                sect_pr = element_slice(xml, &name, end);
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let root = root.ok_or_else(|| RenderError::InvalidTemplate("empty main part".to_string()))?;
    if !root.contains("xmlns:w=") {
        return Err(RenderError::InvalidTemplate(
            "main part does not declare the w namespace".to_string(),
        ));
    }
    Ok(Shell { root, sect_pr })
}

/// Source text of the element named `name` that ends at byte `end`
fn element_slice(xml: &[u8], name: &[u8], end: usize) -> Option<String> {
    let head = xml.get(..end)?;
    let open = [b"<".as_slice(), name].concat();
    let start = (0..head.len().saturating_sub(open.len()) + 1)
        .rev()
        .find(|&i| {
            head[i..].starts_with(&open)
                && matches!(
                    head.get(i + open.len()),
                    Some(b' ' | b'\t' | b'\r' | b'\n' | b'>' | b'/')
                )
        })?;
    Some(String::from_utf8_lossy(&head[start..]).into_owned())
}

fn set_core_title(core: &[u8], title: &str) -> Vec<u8> {
    static TITLE: OnceLock<Regex> = OnceLock::new();
    let re = TITLE.get_or_init(|| {
        Regex::new(r"(?s)<dc:title>.*?</dc:title>|<dc:title\s*/>").expect("valid regex")
    });
    let xml = String::from_utf8_lossy(core);
    if !re.is_match(&xml) {
        return core.to_vec();
    }
    let replacement = format!("<dc:title>{}</dc:title>", escape(&xml_text(title)));
    re.replace(&xml, regex::NoExpand(&replacement))
        .into_owned()
        .into_bytes()
}

/// Drop characters XML 1.0 cannot carry
fn xml_text(text: &str) -> String {
    text.chars()
        .filter(|&c| c == '\t' || c == '\n' || c == '\r' || c >= ' ')
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
struct RunFormat {
    bold: bool,
    italic: bool,
    code: bool,
    link: bool,
    /// Half-points
    size: Option<u32>,
}

impl RunFormat {
    fn for_span(span: &Span) -> Self {
        Self {
            bold: span.bold,
            italic: span.italic,
            code: span.code,
            link: span.link.is_some(),
            size: None,
        }
    }

    fn properties(&self) -> String {
        let mut rpr = String::new();
        if self.code {
            rpr.push_str(&format!(
                "<w:rFonts w:ascii=\"{0}\" w:hAnsi=\"{0}\" w:cs=\"{0}\"/>",
                CODE_FONT
            ));
        }
        if self.bold {
            rpr.push_str("<w:b/>");
        }
        if self.italic {
            rpr.push_str("<w:i/>");
        }
        if self.link {
            rpr.push_str("<w:color w:val=\"0563C1\"/>");
        }
        if let Some(size) = self.size {
            rpr.push_str(&format!("<w:sz w:val=\"{0}\"/><w:szCs w:val=\"{0}\"/>", size));
        }
        if self.link {
            rpr.push_str("<w:u w:val=\"single\"/>");
        }
        if rpr.is_empty() {
            rpr
        } else {
            format!("<w:rPr>{}</w:rPr>", rpr)
        }
    }
}

struct BodyWriter<'a> {
    styles: &'a HashSet<String>,
    out: String,
}

impl<'a> BodyWriter<'a> {
    fn new(styles: &'a HashSet<String>) -> Self {
        Self {
            styles,
            out: String::new(),
        }
    }

    /// First of `candidates` the template defines
    fn style(&self, candidates: &[&str]) -> Option<String> {
        candidates
            .iter()
            .find(|id| self.styles.contains(**id))
            .map(|id| id.to_string())
    }

    fn block(&mut self, block: &Block) {
        match block {
            Block::Heading { level, spans } => {
                let id = format!("Heading{}", level);
                match self.style(&[&id]) {
                    Some(style) => self.paragraph(Some(&style), "", spans, None),
                    None => {
                        let size = HEADING_SIZES[usize::from((*level).clamp(1, 6) - 1)];
                        let spans: Vec<Span> = spans
                            .iter()
                            .map(|s| Span {
                                bold: true,
                                ..s.clone()
                            })
                            .collect();
                        self.paragraph(None, "", &spans, Some(size));
                    }
                }
            }
            Block::Paragraph(spans) => self.paragraph(None, "", spans, None),
            Block::ListItem {
                ordered,
                number,
                depth,
                spans,
            } => self.list_item(*ordered, *number, *depth, spans),
            Block::CodeBlock(code) => self.code_block(code),
            Block::Table(table) => self.table(table),
            Block::Rule => self.out.push_str(
                "<w:p><w:pPr><w:pBdr><w:bottom w:val=\"single\" w:sz=\"6\" w:space=\"1\" w:color=\"auto\"/></w:pBdr></w:pPr></w:p>",
            ),
        }
    }

    fn list_item(&mut self, ordered: bool, number: u64, depth: usize, spans: &[Span]) {
        let base = if ordered { "ListNumber" } else { "ListBullet" };
        let nested = format!("{}{}", base, depth + 1);
        let candidates: Vec<&str> = if depth > 0 {
            vec![nested.as_str(), base]
        } else {
            vec![base]
        };

        match self.style(&candidates) {
            Some(style) => {
                // Nested items under a single-level style still need indenting
                let ppr = if depth > 0 && style == base {
                    format!("<w:ind w:left=\"{}\"/>", LIST_INDENT * (depth as u32 + 1))
                } else {
                    String::new()
                };
                self.paragraph(Some(&style), &ppr, spans, None);
            }
            None => {
                let marker = if ordered {
                    format!("{}. ", number)
                } else {
                    "\u{2022} ".to_string()
                };
                let mut with_marker = vec![Span::plain(marker)];
                with_marker.extend_from_slice(spans);
                let ppr = format!(
                    "<w:ind w:left=\"{}\" w:hanging=\"360\"/>",
                    LIST_INDENT * (depth as u32 + 1)
                );
                self.paragraph(None, &ppr, &with_marker, None);
            }
        }
    }

    fn code_block(&mut self, code: &str) {
        let style = self.style(&["NoSpacing", "Quote"]);
        let span = Span {
            text: code.to_string(),
            code: true,
            ..Default::default()
        };
        self.paragraph(style.as_deref(), "", &[span], Some(CODE_SIZE));
    }

    fn table(&mut self, table: &Table) {
        let columns = table.column_count().max(1);
        let width = TEXT_WIDTH / columns as u32;

        self.out.push_str("<w:tbl><w:tblPr>");
        match self.style(&["TableGrid"]) {
            Some(style) => self
                .out
                .push_str(&format!("<w:tblStyle w:val=\"{}\"/>", style)),
            None => self.out.push_str(
                "<w:tblBorders>\
                 <w:top w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/>\
                 <w:left w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/>\
                 <w:bottom w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/>\
                 <w:right w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/>\
                 <w:insideH w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/>\
                 <w:insideV w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/>\
                 </w:tblBorders>",
            ),
        }
        self.out
            .push_str("<w:tblW w:w=\"0\" w:type=\"auto\"/></w:tblPr><w:tblGrid>");
        for _ in 0..columns {
            self.out
                .push_str(&format!("<w:gridCol w:w=\"{}\"/>", width));
        }
        self.out.push_str("</w:tblGrid>");

        if !table.header.is_empty() {
            self.table_row(&table.header, columns, width, true);
        }
        for row in &table.rows {
            self.table_row(row, columns, width, false);
        }
        self.out.push_str("</w:tbl>");
    }

    fn table_row(&mut self, cells: &[String], columns: usize, width: u32, header: bool) {
        self.out.push_str("<w:tr>");
        if header {
            self.out.push_str("<w:trPr><w:tblHeader/></w:trPr>");
        }
        // Short rows are padded so every row has a cell per grid column
        for i in 0..columns {
            let text = cells.get(i).map(String::as_str).unwrap_or("");
            self.out.push_str(&format!(
                "<w:tc><w:tcPr><w:tcW w:w=\"{}\" w:type=\"dxa\"/></w:tcPr>",
                width
            ));
            let span = Span {
                text: text.to_string(),
                bold: header,
                ..Default::default()
            };
            self.paragraph(None, "", &[span], None);
            self.out.push_str("</w:tc>");
        }
        self.out.push_str("</w:tr>");
    }

    fn paragraph(&mut self, style: Option<&str>, extra_ppr: &str, spans: &[Span], size: Option<u32>) {
        self.out.push_str("<w:p>");
        if style.is_some() || !extra_ppr.is_empty() {
            self.out.push_str("<w:pPr>");
            if let Some(style) = style {
                self.out
                    .push_str(&format!("<w:pStyle w:val=\"{}\"/>", escape(style)));
            }
            self.out.push_str(extra_ppr);
            self.out.push_str("</w:pPr>");
        }
        for span in spans {
            let format = RunFormat {
                size: size.or(if span.code { Some(CODE_SIZE) } else { None }),
                ..RunFormat::for_span(span)
            };
            self.run(&span.text, &format);
        }
        self.out.push_str("</w:p>");
    }

    fn run(&mut self, text: &str, format: &RunFormat) {
        let rpr = format.properties();
        self.out.push_str("<w:r>");
        self.out.push_str(&rpr);
        for (i, line) in text.split('\n').enumerate() {
            if i > 0 {
                self.out.push_str("<w:br/>");
            }
            for (j, piece) in line.split('\t').enumerate() {
                if j > 0 {
                    self.out.push_str("<w:tab/>");
                }
                if !piece.is_empty() {
                    self.out.push_str("<w:t xml:space=\"preserve\">");
                    self.out.push_str(&escape(&xml_text(piece)));
                    self.out.push_str("</w:t>");
                }
            }
        }
        self.out.push_str("</w:r>");
    }

    fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{minimal_template, template_with_styles};

    fn part(docx: &[u8], name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(docx)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();
        out
    }

    fn docx(markdown: &str, template: &[u8]) -> Vec<u8> {
        render_docx(&Document::from_markdown(markdown), "Quarterly Report", template).unwrap()
    }

    #[test]
    fn references_styles_the_template_defines() {
        let template = template_with_styles(&["Heading1", "ListBullet", "TableGrid"]);
        let xml = part(&docx("# Intro\n\n- item\n\n| a |\n|---|\n| 1 |", &template), DOCUMENT_PART);
        assert!(xml.contains("<w:pStyle w:val=\"Heading1\"/>"));
        assert!(xml.contains("<w:pStyle w:val=\"ListBullet\"/>"));
        assert!(xml.contains("<w:tblStyle w:val=\"TableGrid\"/>"));
    }

    #[test]
    fn falls_back_to_direct_formatting() {
        let xml = part(&docx("## Intro\n\n1. first", &minimal_template()), DOCUMENT_PART);
        assert!(!xml.contains("w:pStyle"));
        assert!(xml.contains("<w:b/>"));
        assert!(xml.contains("<w:sz w:val=\"28\"/>"));
        assert!(xml.contains(">1. </w:t>"));
    }

    #[test]
    fn keeps_template_root_and_section_properties() {
        let template = template_with_styles(&[]);
        let xml = part(&docx("body", &template), DOCUMENT_PART);
        assert!(xml.contains("xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\""));
        assert!(xml.contains("<w:pgSz w:w=\"11906\" w:h=\"16838\"/>"));
        assert!(xml.ends_with("</w:sectPr></w:body></w:document>"));
        assert!(!xml.contains("Template placeholder"));
    }

    #[test]
    fn copies_other_parts_unchanged() {
        let template = template_with_styles(&["Heading1"]);
        let out = docx("x", &template);
        assert_eq!(part(&out, STYLES_PART), part(&template, STYLES_PART));
        assert_eq!(part(&out, "[Content_Types].xml"), part(&template, "[Content_Types].xml"));
    }

    #[test]
    fn sets_core_title() {
        let template = template_with_styles(&[]);
        let core = part(&docx("x", &template), CORE_PART);
        assert!(core.contains("<dc:title>Quarterly Report</dc:title>"));
    }

    #[test]
    fn content_is_escaped() {
        let xml = part(&docx("a <b> & \"c\"", &minimal_template()), DOCUMENT_PART);
        assert!(xml.contains("a &lt;b&gt; &amp; &quot;c&quot;"));
    }

    #[test]
    fn code_uses_monospace_runs() {
        let xml = part(&docx("```\nfn main() {}\n```", &minimal_template()), DOCUMENT_PART);
        assert!(xml.contains("w:ascii=\"Courier New\""));
        assert!(xml.contains("fn main() {}"));
    }

    #[test]
    fn rejects_non_package_templates() {
        let err = render_docx(&Document::default(), "t", b"not a zip").unwrap_err();
        assert!(matches!(err, RenderError::Zip(_)));
    }

    #[test]
    fn rejects_package_without_main_part() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("word/styles.xml", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"<w:styles/>").unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let err = render_docx(&Document::default(), "t", &bytes).unwrap_err();
        assert!(matches!(err, RenderError::InvalidTemplate(_)));
    }

    #[test]
    fn reads_style_ids() {
        let ids = style_ids(
            br#"<w:styles xmlns:w="x"><w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/></w:style><w:style w:type="table" w:styleId="TableGrid"/></w:styles>"#,
        )
        .unwrap();
        assert!(ids.contains("Heading1"));
        assert!(ids.contains("TableGrid"));
        assert_eq!(ids.len(), 2);
    }
}
