//! Rendered document pane model.
//!
//! One region per chunk, in reading order. Chunk content is markdown that may
//! carry inline HTML (anchors, comments, HTML tables); it is flattened into
//! plain blocks the view can lay out directly.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use regex::Regex;
use std::sync::OnceLock;

use crate::chunks::ChunkSnapshot;
use crate::labels::ChunkKind;

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading { level: u8, text: String },
    Paragraph(String),
    ListItem(String),
    TableRow(Vec<String>),
    Code(String),
}

#[derive(Debug, Clone)]
pub struct DocumentRegion {
    pub chunk_id: String,
    pub label: String,
    pub kind: ChunkKind,
    pub page: usize,
    pub blocks: Vec<Block>,
    pub active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentPane {
    regions: Vec<DocumentRegion>,
}

fn anchor_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?is)<a\s+id\s*=\s*["'][^"']*["']\s*>\s*</a>"#).expect("valid regex"))
}

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"))
}

fn cell_end_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)</t[dh]\s*>").expect("valid regex"))
}

fn row_end_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)</tr\s*>|<br\s*/?>").expect("valid regex"))
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Flatten a raw HTML block. Tables become rows, everything else text.
fn html_blocks(html: &str) -> Vec<Block> {
    let is_table = html.to_lowercase().contains("<tr");
    let marked = cell_end_re().replace_all(html, "\u{1f}");
    let marked = row_end_re().replace_all(&marked, "\n");
    let text = decode_entities(&tag_re().replace_all(&marked, ""));

    text.lines()
        .map(str::trim)
        .filter(|line| !line.trim_matches('\u{1f}').trim().is_empty())
        .map(|line| {
            if is_table {
                Block::TableRow(
                    line.trim_end_matches('\u{1f}')
                        .split('\u{1f}')
                        .map(|cell| cell.trim().to_string())
                        .collect(),
                )
            } else {
                Block::Paragraph(line.replace('\u{1f}', " ").trim().to_string())
            }
        })
        .collect()
}

#[derive(Default)]
struct BlockBuilder {
    blocks: Vec<Block>,
    text: String,
    html: String,
    row: Vec<String>,
    item_depth: usize,
    in_table: bool,
}

impl BlockBuilder {
    fn flush(&mut self) {
        if !self.html.is_empty() {
            let html = std::mem::take(&mut self.html);
            self.blocks.extend(html_blocks(&html));
        }
        let text = std::mem::take(&mut self.text);
        let text = text.trim();
        if !text.is_empty() {
            if self.item_depth > 0 {
                self.blocks.push(Block::ListItem(text.to_string()));
            } else {
                self.blocks.push(Block::Paragraph(text.to_string()));
            }
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(Tag::Paragraph) => {
                if self.item_depth == 0 {
                    self.flush();
                }
            }
            Event::Start(Tag::Heading { .. })
            | Event::Start(Tag::CodeBlock(_))
            | Event::Start(Tag::BlockQuote)
            | Event::Start(Tag::List(_)) => self.flush(),
            Event::Start(Tag::Item) => {
                self.flush();
                self.item_depth += 1;
            }
            Event::Start(Tag::Table(_)) => {
                self.flush();
                self.in_table = true;
            }
            Event::Start(Tag::TableCell) => self.text.clear(),

            Event::End(TagEnd::Paragraph) => {
                if self.item_depth == 0 {
                    self.flush();
                } else {
                    self.text.push(' ');
                }
            }
            Event::End(TagEnd::Heading(level)) => {
                let text = std::mem::take(&mut self.text).trim().to_string();
                self.blocks.push(Block::Heading { level: level as u8, text });
            }
            Event::End(TagEnd::CodeBlock) => {
                let code = std::mem::take(&mut self.text);
                self.blocks.push(Block::Code(code.trim_end().to_string()));
            }
            Event::End(TagEnd::Item) => {
                self.flush();
                self.item_depth = self.item_depth.saturating_sub(1);
            }
            Event::End(TagEnd::TableCell) => {
                let cell = std::mem::take(&mut self.text).trim().to_string();
                self.row.push(cell);
            }
            Event::End(TagEnd::TableHead) | Event::End(TagEnd::TableRow) => {
                let row = std::mem::take(&mut self.row);
                self.blocks.push(Block::TableRow(row));
            }
            Event::End(TagEnd::Table) => self.in_table = false,

            Event::Text(text) | Event::Code(text) => self.text.push_str(&text),
            Event::SoftBreak | Event::HardBreak => {
                if !self.in_table {
                    self.text.push(' ');
                }
            }
            Event::Html(html) => self.html.push_str(&html),
            _ => {}
        }
    }
}

/// Render chunk markdown into display blocks.
pub fn render_blocks(markdown: &str) -> Vec<Block> {
    let cleaned = anchor_re().replace_all(markdown, "");
    let cleaned = comment_re().replace_all(&cleaned, "");

    let mut builder = BlockBuilder::default();
    for event in Parser::new_ext(&cleaned, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH) {
        builder.event(event);
    }
    builder.flush();
    builder.blocks
}

impl DocumentPane {
    pub fn build(snapshot: &ChunkSnapshot) -> Self {
        let regions = snapshot
            .reading_order()
            .into_iter()
            .map(|chunk| DocumentRegion {
                chunk_id: chunk.id.clone(),
                label: snapshot.label(&chunk.id).unwrap_or_default().to_string(),
                kind: ChunkKind::classify(&chunk.kind),
                page: chunk.page,
                blocks: render_blocks(&chunk.content),
                active: false,
            })
            .collect();
        Self { regions }
    }

    pub fn regions(&self) -> &[DocumentRegion] {
        &self.regions
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Index of the first region showing `chunk_id`; the scroll target.
    pub fn first_region(&self, chunk_id: &str) -> Option<usize> {
        self.regions.iter().position(|r| r.chunk_id == chunk_id)
    }

    /// Move the active marker. Every previously active region is cleared, so
    /// at most one logical region carries it afterwards.
    pub fn set_active(&mut self, chunk_id: Option<&str>) -> bool {
        let mut found = false;
        for region in &mut self.regions {
            region.active = Some(region.chunk_id.as_str()) == chunk_id;
            found |= region.active;
        }
        found
    }

    pub fn active(&self) -> impl Iterator<Item = &DocumentRegion> {
        self.regions.iter().filter(|r| r.active)
    }

    /// Plain text of a region, blocks joined by newlines
    pub fn region_text(&self, index: usize) -> Option<String> {
        let region = self.regions.get(index)?;
        let lines: Vec<String> = region
            .blocks
            .iter()
            .map(|block| match block {
                Block::Heading { text, .. } | Block::Paragraph(text) | Block::Code(text) => text.clone(),
                Block::ListItem(text) => format!("- {}", text),
                Block::TableRow(cells) => cells.join(" | "),
            })
            .collect();
        Some(lines.join("\n"))
    }
}
