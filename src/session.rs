//! One review session: the loaded file, its extraction snapshot and all view
//! state derived from it.

use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::chunks::ChunkSnapshot;
use crate::config::ReviewConfig;
use crate::document::DocumentPane;
use crate::error::{ErrorContext, ReviewError, ReviewResult};
use crate::export::{ExportFormat, ExportTable};
use crate::items::{items_from_snapshot, ItemEditor, ItemSink};
use crate::logging::PerformanceTimer;
use crate::selection::{hit_test, SelectionSync, Surface, SyncEffects};
use crate::viewport::ViewportController;

/// The AI extraction call
pub trait Extractor {
    fn extract(&self, source: &Path) -> impl Future<Output = ReviewResult<Value>>;
}

/// Reads a previously saved extraction response. Without an explicit path the
/// `<source>.json` sidecar next to the drawing is used.
#[derive(Debug, Clone, Default)]
pub struct PayloadFileExtractor {
    pub payload_path: Option<PathBuf>,
}

impl PayloadFileExtractor {
    pub fn new(payload_path: Option<PathBuf>) -> Self {
        Self { payload_path }
    }

    pub fn resolve(&self, source: &Path) -> PathBuf {
        self.payload_path
            .clone()
            .unwrap_or_else(|| source.with_extension("json"))
    }

    pub async fn read(&self, source: &Path) -> ReviewResult<Value> {
        let path = self.resolve(source);
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            ReviewError::extraction_with_source(format!("no extraction result at {}", path.display()), e)
        })?;
        serde_json::from_str(&content).map_err(|e| ReviewError::payload(e.to_string()))
    }
}

impl Extractor for PayloadFileExtractor {
    async fn extract(&self, source: &Path) -> ReviewResult<Value> {
        self.read(source).await
    }
}

/// Identifies the document an extraction was started for. A result carrying
/// an older ticket is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionTicket(u64);

/// Per-document scratch directory for rendered page previews. Dropping or
/// releasing it removes every preview file.
#[derive(Debug, Default)]
pub struct PreviewStore {
    dir: Option<tempfile::TempDir>,
}

impl PreviewStore {
    pub fn dir(&mut self) -> ReviewResult<&Path> {
        if self.dir.is_none() {
            let dir = tempfile::Builder::new()
                .prefix("takeoff-preview-")
                .tempdir()
                .with_path(&std::env::temp_dir())?;
            self.dir = Some(dir);
        }
        match &self.dir {
            Some(dir) => Ok(dir.path()),
            None => Err(ReviewError::render("preview directory unavailable")),
        }
    }

    /// File a page is rendered into at a given pixel width
    pub fn page_path(&mut self, page: usize, width: u32) -> ReviewResult<PathBuf> {
        Ok(self.dir()?.join(format!("page-{}-w{}.png", page + 1, width)))
    }

    pub fn is_active(&self) -> bool {
        self.dir.is_some()
    }

    pub fn release(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!("Failed to remove preview directory {}: {}", path.display(), e);
            }
        }
    }
}

impl Drop for PreviewStore {
    fn drop(&mut self) {
        self.release();
    }
}

pub struct ReviewSession {
    config: ReviewConfig,
    source: Option<PathBuf>,
    snapshot: Arc<ChunkSnapshot>,
    document: DocumentPane,
    selection: SelectionSync,
    viewport: ViewportController,
    items: ItemEditor,
    previews: PreviewStore,
    busy: bool,
    // Bumped on every document open
    generation: u64,
    status: Option<String>,
}

impl ReviewSession {
    pub fn new(config: ReviewConfig) -> Self {
        Self::with_selection(config, SelectionSync::default())
    }

    /// Session whose selection state is owned by a host.
    pub fn with_selection(config: ReviewConfig, selection: SelectionSync) -> Self {
        let viewport = ViewportController::new(&config.viewer);
        Self {
            config,
            source: None,
            snapshot: Arc::new(ChunkSnapshot::default()),
            document: DocumentPane::default(),
            selection,
            viewport,
            items: ItemEditor::default(),
            previews: PreviewStore::default(),
            busy: false,
            generation: 0,
            status: None,
        }
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn snapshot(&self) -> Arc<ChunkSnapshot> {
        Arc::clone(&self.snapshot)
    }

    pub fn document(&self) -> &DocumentPane {
        &self.document
    }

    pub fn selection(&self) -> &SelectionSync {
        &self.selection
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut ViewportController {
        &mut self.viewport
    }

    pub fn items(&self) -> &ItemEditor {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut ItemEditor {
        &mut self.items
    }

    pub fn previews_mut(&mut self) -> &mut PreviewStore {
        &mut self.previews
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Inline status / error message for the view
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(message.into());
    }

    /// Replace the open file. Previews, selection, viewport and the previous
    /// extraction are all dropped.
    pub fn open_document(&mut self, path: &Path, page_count: usize) {
        info!("Opening {} ({} pages)", path.display(), page_count);
        self.previews.release();
        self.viewport.reset(page_count);
        self.selection.reset();
        self.snapshot = Arc::new(ChunkSnapshot::default());
        self.document = DocumentPane::default();
        self.items = ItemEditor::default();
        self.source = Some(path.to_path_buf());
        self.status = None;
        // Whatever extraction is still running belongs to the old document.
        self.generation += 1;
        self.busy = false;
    }

    /// Rebuild everything derived from an extraction payload.
    pub fn load_payload(&mut self, payload: &Value) {
        let timer = PerformanceTimer::start("load extraction payload");
        let snapshot = ChunkSnapshot::from_payload(payload, self.config.extraction.search_budget);
        timer.checkpoint("snapshot built");

        self.selection.reset();
        self.viewport.reset_view();
        self.document = DocumentPane::build(&snapshot);
        self.items = ItemEditor::new(items_from_snapshot(&snapshot));
        self.status = snapshot
            .is_empty()
            .then(|| "No content chunks were found in the extraction result.".to_string());
        self.snapshot = Arc::new(snapshot);
    }

    /// Mark an extraction as started; a second trigger while one is running is rejected.
    pub fn begin_extraction(&mut self) -> ReviewResult<ExtractionTicket> {
        if self.busy {
            return Err(ReviewError::Busy);
        }
        self.busy = true;
        self.status = Some("Extracting…".to_string());
        Ok(ExtractionTicket(self.generation))
    }

    /// Finish an extraction started with [`begin_extraction`](Self::begin_extraction).
    /// Failures become the inline status; the busy flag is cleared either way.
    /// A result for a document that has since been replaced changes nothing.
    pub fn finish_extraction(&mut self, ticket: ExtractionTicket, result: ReviewResult<Value>) -> ReviewResult<usize> {
        if ticket.0 != self.generation {
            warn!("Discarding extraction result for a document that is no longer open");
            return Err(ReviewError::Superseded);
        }
        self.busy = false;
        match result {
            Ok(payload) => {
                self.load_payload(&payload);
                Ok(self.snapshot.len())
            }
            Err(e) => {
                crate::log_error!(e, "extraction");
                self.status = Some(e.user_message());
                Err(e)
            }
        }
    }

    pub async fn run_extraction<E: Extractor>(&mut self, extractor: &E) -> ReviewResult<usize> {
        let ticket = self.begin_extraction()?;
        let source = match &self.source {
            Some(source) => source.clone(),
            None => return self.finish_extraction(ticket, Err(ReviewError::extraction("no file is open"))),
        };
        let result = extractor.extract(&source).await;
        self.finish_extraction(ticket, result)
    }

    /// Apply what the views share (active marker, overlay) and hand back the
    /// scroll targets.
    fn apply(&mut self, effects: SyncEffects) -> SyncEffects {
        if effects.selection_changed {
            self.document.set_active(effects.active_chunk.as_deref());
        }
        if effects.show_overlay {
            self.viewport.show_overlay();
        }
        effects
    }

    pub fn pointer_enter(&mut self, chunk_id: &str, surface: Surface) {
        self.selection.pointer_enter(chunk_id, surface);
    }

    pub fn pointer_leave(&mut self) {
        self.selection.pointer_leave();
    }

    pub fn click(&mut self, chunk_id: &str, surface: Surface) -> SyncEffects {
        let effects = self.selection.click(chunk_id, surface, &self.snapshot);
        self.apply(effects)
    }

    /// Click on the raw page canvas at pixel `(x, y)` of `page`.
    pub fn canvas_click(&mut self, page: usize, x: f32, y: f32) -> Option<SyncEffects> {
        let page_size = self.viewport.page_size(page);
        let chunk_id = hit_test(&self.snapshot, page, x, y, page_size)?.id.clone();
        Some(self.click(&chunk_id, Surface::PdfCanvas))
    }

    /// Click on a row of the item table.
    pub fn table_click(&mut self, row: usize) -> Option<SyncEffects> {
        let chunk_id = self.items.table().chunk_for_row(row)?.to_string();
        Some(self.click(&chunk_id, Surface::Table))
    }

    pub fn select(&mut self, chunk_id: Option<&str>) -> SyncEffects {
        let effects = self.selection.select(chunk_id, &self.snapshot);
        self.apply(effects)
    }

    pub async fn save_items<S: ItemSink>(&mut self, sink: &S) -> bool {
        self.items.save(sink).await
    }

    /// Export the item table next to `dir`, named after the open file.
    pub fn export(&self, dir: &Path, format: ExportFormat) -> ReviewResult<PathBuf> {
        let project = self
            .source
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        ExportTable::from_items(&project, &self.config.export.currency, self.items.table()).write(dir, format)
    }

    /// Pick up selection changes made by a host that owns the selection.
    pub fn sync(&mut self) -> SyncEffects {
        let effects = self.selection.sync(&self.snapshot);
        self.apply(effects)
    }
}
