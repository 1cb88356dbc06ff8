use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chunks::ChunkSnapshot;
use crate::document::{render_blocks, Block};
use crate::error::{ReviewError, ReviewResult};
use crate::labels::ChunkKind;

/// One priced bill-of-quantities row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: Uuid,
    pub description: String,
    pub quantity: f64,
    pub unit: String,
    pub unit_rate: f64,
    /// Chunk the row was taken from, for table <-> document sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
}

impl LineItem {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            quantity: 0.0,
            unit: String::new(),
            unit_rate: 0.0,
            chunk_id: None,
        }
    }

    pub fn amount(&self) -> f64 {
        self.quantity * self.unit_rate
    }
}

/// Rows shown in the table side panel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemTable {
    pub rows: Vec<LineItem>,
}

impl ItemTable {
    pub fn total(&self) -> f64 {
        self.rows.iter().map(LineItem::amount).sum()
    }

    pub fn row_for_chunk(&self, chunk_id: &str) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| row.chunk_id.as_deref() == Some(chunk_id))
    }

    pub fn chunk_for_row(&self, index: usize) -> Option<&str> {
        self.rows.get(index)?.chunk_id.as_deref()
    }
}

const UNITS: &[&str] = &[
    "m", "m2", "m²", "m3", "m³", "lm", "nr", "no", "kg", "t", "item", "sum", "ea", "l",
];

fn parse_number(cell: &str) -> Option<f64> {
    let cleaned: String = cell.chars().filter(|c| !matches!(c, ',' | ' ')).collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn row_to_item(cells: &[String], chunk_id: &str) -> Option<LineItem> {
    let mut description = Vec::new();
    let mut numbers = Vec::new();
    let mut unit = String::new();

    for cell in cells.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
        if let Some(n) = parse_number(cell) {
            numbers.push(n);
        } else if unit.is_empty() && UNITS.contains(&cell.to_lowercase().as_str()) {
            unit = cell.to_string();
        } else {
            description.push(cell);
        }
    }

    if description.is_empty() {
        return None;
    }

    let mut item = LineItem::new(description.join(" "));
    item.quantity = numbers.first().copied().unwrap_or(0.0);
    item.unit_rate = numbers.get(1).copied().unwrap_or(0.0);
    item.unit = unit;
    item.chunk_id = Some(chunk_id.to_string());
    Some(item)
}

/// Seed editable rows from the extraction: body rows of table chunks, and
/// one row per text chunk with its first line as description.
pub fn items_from_snapshot(snapshot: &ChunkSnapshot) -> ItemTable {
    let mut rows = Vec::new();

    for chunk in snapshot.reading_order() {
        let blocks = render_blocks(&chunk.content);
        match ChunkKind::classify(&chunk.kind) {
            ChunkKind::Table => {
                let table_rows: Vec<&Vec<String>> = blocks
                    .iter()
                    .filter_map(|b| match b {
                        Block::TableRow(cells) => Some(cells),
                        _ => None,
                    })
                    .collect();
                // first row is the header
                rows.extend(
                    table_rows
                        .iter()
                        .skip(1)
                        .filter_map(|cells| row_to_item(cells, &chunk.id)),
                );
            }
            ChunkKind::Text => {
                let first_line = blocks.iter().find_map(|b| match b {
                    Block::Heading { text, .. } | Block::Paragraph(text) | Block::ListItem(text) => {
                        Some(text.clone())
                    }
                    _ => None,
                });
                if let Some(text) = first_line {
                    let label = snapshot.label(&chunk.id).unwrap_or_default();
                    let mut item = LineItem::new(format!("[{}] {}", label, text));
                    item.chunk_id = Some(chunk.id.clone());
                    rows.push(item);
                }
            }
            ChunkKind::Figure | ChunkKind::Other => {}
        }
    }

    ItemTable { rows }
}

/// Field-level edit from the table panel
#[derive(Debug, Clone, PartialEq)]
pub enum ItemEdit {
    Description(String),
    Quantity(f64),
    Unit(String),
    UnitRate(f64),
}

/// Persistence seam for line items
pub trait ItemSink {
    fn save(&self, items: &[LineItem]) -> impl Future<Output = ReviewResult<()>>;
}

/// Writes items as pretty JSON to a file
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    pub path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> ReviewResult<ItemTable> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ReviewError::file_io(self.path.display().to_string(), e))?;
        let rows: Vec<LineItem> = serde_json::from_str(&content)?;
        Ok(ItemTable { rows })
    }
}

impl ItemSink for JsonFileSink {
    async fn save(&self, items: &[LineItem]) -> ReviewResult<()> {
        let content = serde_json::to_string_pretty(items)?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| ReviewError::save(format!("{}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

/// Local edit state for the item table
#[derive(Debug, Clone, Default)]
pub struct ItemEditor {
    table: ItemTable,
    dirty: bool,
    saving: bool,
    last_error: Option<String>,
    last_saved: Option<DateTime<Utc>>,
}

impl ItemEditor {
    pub fn new(table: ItemTable) -> Self {
        Self {
            table,
            ..Self::default()
        }
    }

    pub fn table(&self) -> &ItemTable {
        &self.table
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.last_saved
    }

    pub fn edit(&mut self, index: usize, edit: ItemEdit) -> bool {
        let Some(row) = self.table.rows.get_mut(index) else {
            return false;
        };
        match edit {
            ItemEdit::Description(v) => row.description = v,
            ItemEdit::Quantity(v) => row.quantity = v,
            ItemEdit::Unit(v) => row.unit = v,
            ItemEdit::UnitRate(v) => row.unit_rate = v,
        }
        self.dirty = true;
        true
    }

    pub fn add_row(&mut self, item: LineItem) {
        self.table.rows.push(item);
        self.dirty = true;
    }

    pub fn remove_row(&mut self, index: usize) -> Option<LineItem> {
        if index >= self.table.rows.len() {
            return None;
        }
        self.dirty = true;
        Some(self.table.rows.remove(index))
    }

    /// Hand the rows to `sink`. On failure the edits and dirty flag stay so
    /// the user can retry; the error becomes an inline message.
    pub async fn save<S: ItemSink>(&mut self, sink: &S) -> bool {
        self.saving = true;
        let result = sink.save(&self.table.rows).await;
        self.saving = false;

        match result {
            Ok(()) => {
                info!(rows = self.table.rows.len(), "line items saved");
                self.dirty = false;
                self.last_error = None;
                self.last_saved = Some(Utc::now());
                true
            }
            Err(e) => {
                warn!(error = %e, "saving line items failed");
                self.last_error = Some(e.user_message());
                false
            }
        }
    }
}
