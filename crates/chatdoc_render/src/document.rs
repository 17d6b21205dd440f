//! Document model shared by the text, PDF and DOCX renderers.
//!
//! Markdown is parsed once with `pulldown-cmark` into a flat list of
//! blocks. Raw HTML in the source is dropped: none of the targets built
//! from this model interpret markup.

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};

/// Parser options used everywhere markdown is read
pub(crate) fn markdown_options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS
}

/// A run of text with uniform formatting
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Span {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub code: bool,
    pub link: Option<String>,
}

impl Span {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Concatenate span text without decoration
pub fn spans_text(spans: &[Span]) -> String {
    spans.iter().map(|s| s.text.as_str()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Header followed by body rows
    pub fn all_rows(&self) -> impl Iterator<Item = &Vec<String>> {
        std::iter::once(&self.header)
            .filter(|h| !h.is_empty())
            .chain(self.rows.iter())
    }

    pub fn column_count(&self) -> usize {
        self.all_rows().map(Vec::len).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading {
        level: u8,
        spans: Vec<Span>,
    },
    Paragraph(Vec<Span>),
    ListItem {
        ordered: bool,
        number: u64,
        depth: usize,
        spans: Vec<Span>,
    },
    CodeBlock(String),
    Table(Table),
    Rule,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    pub blocks: Vec<Block>,
}

impl Document {
    /// Parse markdown into blocks.
    pub fn from_markdown(markdown: &str) -> Self {
        let mut builder = Builder::default();
        for event in Parser::new_ext(markdown, markdown_options()) {
            builder.event(event);
        }
        builder.finish()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

struct ListContext {
    ordered: bool,
    next: u64,
}

#[derive(Default)]
struct TableBuilder {
    table: Table,
    row: Vec<String>,
    in_head: bool,
}

#[derive(Default)]
struct Builder {
    blocks: Vec<Block>,
    spans: Vec<Span>,
    bold: u32,
    italic: u32,
    link: Option<String>,
    heading: Option<u8>,
    lists: Vec<ListContext>,
    open_items: usize,
    code: Option<String>,
    table: Option<TableBuilder>,
}

impl Builder {
    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if let Some(code) = self.code.as_mut() {
                    code.push_str(&text);
                } else {
                    self.push_text(&text, false);
                }
            }
            Event::Code(text) => self.push_text(&text, true),
            // Hard line breaks everywhere, the way chat clients display text
            Event::SoftBreak | Event::HardBreak => self.push_text("\n", false),
            Event::Rule => {
                self.flush_paragraph();
                self.blocks.push(Block::Rule);
            }
            Event::TaskListMarker(checked) => {
                self.push_text(if checked { "[x] " } else { "[ ] " }, false)
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { level, .. } => {
                self.flush_paragraph();
                self.heading = Some(heading_level(level));
            }
            Tag::List(start) => {
                // A nested list ends the text of the enclosing item
                if self.open_items > 0 {
                    self.flush_item();
                }
                self.lists.push(ListContext {
                    ordered: start.is_some(),
                    next: start.unwrap_or(1),
                });
            }
            Tag::Item => {
                self.open_items += 1;
                self.spans.clear();
            }
            Tag::CodeBlock(_) => {
                self.flush_pending();
                self.code = Some(String::new());
            }
            Tag::Table(_) => {
                self.flush_pending();
                self.table = Some(TableBuilder::default());
            }
            Tag::TableHead => {
                if let Some(t) = self.table.as_mut() {
                    t.in_head = true;
                    t.row.clear();
                }
            }
            Tag::TableRow => {
                if let Some(t) = self.table.as_mut() {
                    t.row.clear();
                }
            }
            Tag::TableCell => self.spans.clear(),
            Tag::Emphasis => self.italic += 1,
            Tag::Strong => self.bold += 1,
            Tag::Link { dest_url, .. } => self.link = Some(dest_url.to_string()),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                if self.open_items > 0 {
                    // Loose list items keep collecting; separate paragraphs
                    if !self.spans.is_empty() {
                        self.push_text("\n", false);
                    }
                } else {
                    self.flush_paragraph();
                }
            }
            TagEnd::Heading(_) => {
                let level = self.heading.take().unwrap_or(1);
                let spans = self.take_spans();
                self.blocks.push(Block::Heading { level, spans });
            }
            TagEnd::Item => {
                self.flush_item();
                self.open_items = self.open_items.saturating_sub(1);
            }
            TagEnd::List(_) => {
                self.lists.pop();
            }
            TagEnd::CodeBlock => {
                if let Some(code) = self.code.take() {
                    let code = code.trim_end_matches('\n').to_string();
                    self.blocks.push(Block::CodeBlock(code));
                }
            }
            TagEnd::TableCell => {
                let text = spans_text(&self.take_spans()).trim().to_string();
                if let Some(t) = self.table.as_mut() {
                    t.row.push(text);
                }
            }
            TagEnd::TableHead => {
                if let Some(t) = self.table.as_mut() {
                    t.table.header = std::mem::take(&mut t.row);
                    t.in_head = false;
                }
            }
            TagEnd::TableRow => {
                if let Some(t) = self.table.as_mut() {
                    if !t.in_head {
                        let row = std::mem::take(&mut t.row);
                        t.table.rows.push(row);
                    }
                }
            }
            TagEnd::Table => {
                if let Some(t) = self.table.take() {
                    self.blocks.push(Block::Table(t.table));
                }
            }
            TagEnd::Emphasis => self.italic = self.italic.saturating_sub(1),
            TagEnd::Strong => self.bold = self.bold.saturating_sub(1),
            TagEnd::Link => self.link = None,
            _ => {}
        }
    }

    fn push_text(&mut self, text: &str, code: bool) {
        let span = Span {
            text: text.to_string(),
            bold: self.bold > 0,
            italic: self.italic > 0,
            code,
            link: self.link.clone(),
        };
        // Merge with the previous span when formatting is identical
        if let Some(last) = self.spans.last_mut() {
            if last.bold == span.bold
                && last.italic == span.italic
                && last.code == span.code
                && last.link == span.link
            {
                last.text.push_str(&span.text);
                return;
            }
        }
        self.spans.push(span);
    }

    fn take_spans(&mut self) -> Vec<Span> {
        let mut spans = std::mem::take(&mut self.spans);
        if let Some(last) = spans.last_mut() {
            let trimmed = last.text.trim_end_matches('\n').len();
            last.text.truncate(trimmed);
        }
        spans.retain(|s| !s.text.is_empty());
        spans
    }

    fn flush_paragraph(&mut self) {
        let spans = self.take_spans();
        if !spans.is_empty() {
            self.blocks.push(Block::Paragraph(spans));
        }
    }

    /// Flush whatever text is open, as a list item when inside one
    fn flush_pending(&mut self) {
        if self.open_items > 0 {
            self.flush_item();
        } else {
            self.flush_paragraph();
        }
    }

    fn flush_item(&mut self) {
        let spans = self.take_spans();
        if spans.is_empty() {
            return;
        }
        let depth = self.lists.len().saturating_sub(1);
        let (ordered, number) = match self.lists.last_mut() {
            Some(ctx) => {
                let number = ctx.next;
                ctx.next += 1;
                (ctx.ordered, number)
            }
            None => (false, 1),
        };
        self.blocks.push(Block::ListItem {
            ordered,
            number,
            depth,
            spans,
        });
    }

    fn finish(mut self) -> Document {
        self.flush_paragraph();
        Document {
            blocks: self.blocks,
        }
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}
