use eframe::egui::{self, Align, Align2, Color32, FontId, Pos2, Rect, Sense, Stroke};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use tokio::runtime::Handle;
use tracing::info;

use crate::chunks::ChunkSnapshot;
use crate::config::ReviewConfig;
use crate::document::Block;
use crate::error::ReviewResult;
use crate::export::ExportFormat;
use crate::geometry::PageSize;
use crate::items::{ItemEdit, JsonFileSink, LineItem};
use crate::selection::{hit_test, Emphasis, Surface, SyncEffects};
use crate::session::{ExtractionTicket, PayloadFileExtractor, ReviewSession};
use crate::viewport::{PanRelease, Point, ScrollOffset, ViewportSize, PAGE_GAP};

use super::renderer::PdftoppmRenderer;

const SELECTED: Color32 = Color32::from_rgb(230, 120, 20);
const SELECTED_FILL: Color32 = Color32::from_rgba_premultiplied(60, 30, 5, 40);
const HOVERED: Color32 = Color32::from_rgb(60, 140, 230);
const HOVERED_FILL: Color32 = Color32::from_rgba_premultiplied(15, 35, 60, 40);
const OUTLINE: Color32 = Color32::from_rgba_premultiplied(90, 90, 90, 90);
const ERROR_TEXT: Color32 = Color32::from_rgb(220, 80, 80);

struct PageTexture {
    width: u32,
    texture: egui::TextureHandle,
}

/// Dual-pane review window: rendered drawing on the left, extracted document
/// and the item table on the right.
pub struct ReviewApp {
    session: ReviewSession,
    renderer: PdftoppmRenderer,
    extractor: PayloadFileExtractor,
    runtime: Handle,
    extraction_tx: Sender<(ExtractionTicket, ReviewResult<Value>)>,
    extraction_rx: Receiver<(ExtractionTicket, ReviewResult<Value>)>,

    textures: HashMap<usize, PageTexture>,
    render_errors: HashMap<usize, String>,
    pdf_viewport: ViewportSize,
    press_in_pdf: bool,
    pending_pdf_click: Option<Pos2>,

    // Per-frame hover collected from whichever pane is under the pointer
    frame_hover: Option<(String, Surface)>,
    scroll_document: Option<String>,
    scroll_table: Option<usize>,
}

impl ReviewApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, config: ReviewConfig, runtime: Handle, initial: Option<PathBuf>) -> Self {
        let (extraction_tx, extraction_rx) = channel();
        let mut app = Self {
            session: ReviewSession::new(config),
            renderer: PdftoppmRenderer::default(),
            extractor: PayloadFileExtractor::default(),
            runtime,
            extraction_tx,
            extraction_rx,
            textures: HashMap::new(),
            render_errors: HashMap::new(),
            pdf_viewport: ViewportSize { width: 800.0, height: 600.0 },
            press_in_pdf: false,
            pending_pdf_click: None,
            frame_hover: None,
            scroll_document: None,
            scroll_table: None,
        };
        if let Some(path) = initial {
            app.open_pdf(&path);
        }
        app
    }

    fn open_pdf(&mut self, path: &Path) {
        match self.renderer.page_count(path) {
            Ok(pages) => {
                self.session.open_document(path, pages);
                self.textures.clear();
                self.render_errors.clear();
                self.extractor = PayloadFileExtractor::default();
                self.session.set_status(format!(
                    "Opened {}",
                    path.file_name().unwrap_or_default().to_string_lossy()
                ));
            }
            Err(e) => {
                crate::log_error!(e, "open pdf");
                self.session.set_status(e.user_message());
            }
        }
    }

    fn open_pdf_dialog(&mut self) {
        if let Some(file) = rfd::FileDialog::new().add_filter("PDF files", &["pdf"]).pick_file() {
            self.open_pdf(&file);
        }
    }

    fn pick_payload_dialog(&mut self, ctx: &egui::Context) {
        if let Some(file) = rfd::FileDialog::new().add_filter("Extraction result", &["json"]).pick_file() {
            self.extractor = PayloadFileExtractor::new(Some(file));
            self.start_extraction(ctx);
        }
    }

    fn start_extraction(&mut self, ctx: &egui::Context) {
        let Some(source) = self.session.source().map(Path::to_path_buf) else {
            return;
        };
        let ticket = match self.session.begin_extraction() {
            Ok(ticket) => ticket,
            Err(e) => {
                self.session.set_status(e.user_message());
                return;
            }
        };

        let extractor = self.extractor.clone();
        let tx = self.extraction_tx.clone();
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let result = extractor.read(&source).await;
            // Receiver is gone only when the window closed
            let _ = tx.send((ticket, result));
            ctx.request_repaint();
        });
    }

    fn poll_extraction(&mut self) {
        while let Ok((ticket, result)) = self.extraction_rx.try_recv() {
            if let Ok(count) = self.session.finish_extraction(ticket, result) {
                info!("Extraction loaded: {} chunks", count);
                if count > 0 {
                    self.session.set_status(format!("{} chunks extracted", count));
                }
                self.scroll_document = None;
                self.scroll_table = None;
            }
        }
    }

    fn apply_effects(&mut self, effects: SyncEffects) {
        if let Some(id) = effects.scroll_document {
            self.scroll_table = self.session.items().table().row_for_chunk(&id);
            self.scroll_document = Some(id);
        }
        if let Some(target) = effects.scroll_pdf {
            let viewport = self.session.viewport();
            let scroll = viewport.reveal(target.page, target.bbox.as_ref(), self.pdf_viewport);
            self.session.viewport_mut().set_scroll(scroll);
        }
    }

    fn resolve_hover(&mut self) {
        let hovered = self.session.selection().hovered();
        match self.frame_hover.take() {
            Some((id, surface)) => {
                if hovered.as_deref() != Some(id.as_str()) {
                    if self.session.selection().selected().as_deref() == Some(id.as_str()) {
                        self.session.pointer_leave();
                    } else {
                        self.session.pointer_enter(&id, surface);
                    }
                }
            }
            None if hovered.is_some() => self.session.pointer_leave(),
            None => {}
        }
    }

    fn toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("📂 Open PDF").clicked() {
                self.open_pdf_dialog();
            }

            let has_source = self.session.source().is_some();
            let busy = self.session.is_busy();
            if ui
                .add_enabled(has_source && !busy, egui::Button::new("🤖 Extract"))
                .on_hover_text("Read the extraction result saved next to the drawing")
                .clicked()
            {
                self.start_extraction(ui.ctx());
            }
            if ui
                .add_enabled(has_source && !busy, egui::Button::new("📄 Load result…"))
                .clicked()
            {
                self.pick_payload_dialog(ui.ctx());
            }
            if busy {
                ui.spinner();
            }

            ui.separator();

            let center = Point::new(self.pdf_viewport.width / 2.0, self.pdf_viewport.height / 2.0);
            if ui.button("−").clicked() {
                self.session.viewport_mut().zoom_out(center);
            }
            ui.label(format!("{:.0}%", self.session.viewport().zoom() * 100.0));
            if ui.button("+").clicked() {
                self.session.viewport_mut().zoom_in(center);
            }
        });
    }

    fn status_bar(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            match self.session.status() {
                Some(status) if self.render_errors.is_empty() => {
                    ui.label(status);
                }
                Some(status) => {
                    ui.label(status);
                    ui.colored_label(ERROR_TEXT, format!("{} page(s) failed to render", self.render_errors.len()));
                }
                None => {
                    ui.label("Ready");
                }
            }
            if let Some(source) = self.session.source() {
                ui.with_layout(egui::Layout::right_to_left(Align::Center), |ui| {
                    ui.label(source.display().to_string());
                });
            }
        });
    }

    fn max_scroll(&self) -> ScrollOffset {
        let viewport = self.session.viewport();
        let pages = viewport.measurements().page_count();
        let width = (0..pages).map(|p| viewport.page_size(p).width).fold(0.0, f32::max);
        ScrollOffset::new(
            (width - self.pdf_viewport.width).max(0.0),
            (viewport.content_height() - self.pdf_viewport.height).max(0.0),
        )
    }

    fn handle_pdf_input(&mut self, ui: &egui::Ui, rect: Rect) {
        let (hover, scroll_y, pressed, down, released, origin, latest) = ui.input(|i| {
            (
                i.pointer.hover_pos(),
                i.raw_scroll_delta.y,
                i.pointer.primary_pressed(),
                i.pointer.primary_down(),
                i.pointer.primary_released(),
                i.pointer.press_origin(),
                i.pointer.latest_pos(),
            )
        });
        let local = |p: Pos2| Point::new(p.x - rect.min.x, p.y - rect.min.y);
        let viewport = self.session.viewport_mut();

        if let Some(pos) = hover.filter(|p| rect.contains(*p)) {
            if scroll_y != 0.0 {
                // egui reports wheel-up as positive
                viewport.wheel(-scroll_y, local(pos));
            }
        }

        if pressed {
            if let Some(origin) = origin.filter(|p| rect.contains(*p)) {
                self.press_in_pdf = true;
                viewport.pointer_down(local(origin));
            }
        }

        if self.press_in_pdf {
            if down {
                if let Some(pos) = latest {
                    viewport.pointer_move(local(pos));
                }
            }
            if released {
                self.press_in_pdf = false;
                if viewport.pointer_up() == PanRelease::Click {
                    self.pending_pdf_click = latest;
                }
            }
        }
    }

    fn pdf_pane(&mut self, ui: &mut egui::Ui) {
        let rect = ui.available_rect_before_wrap();
        self.pdf_viewport = ViewportSize {
            width: rect.width(),
            height: rect.height(),
        };

        if self.session.source().is_none() {
            ui.centered_and_justified(|ui| {
                ui.label("No drawing loaded. Use “Open PDF” to start a review.");
            });
            return;
        }

        self.handle_pdf_input(ui, rect);
        if self.session.viewport().pan_state().is_panning() {
            ui.ctx().set_cursor_icon(egui::CursorIcon::Grabbing);
        }

        let max = self.max_scroll();
        self.session.viewport_mut().on_frame(Some(max));
        let scroll = self.session.viewport().scroll();

        let output = egui::ScrollArea::both()
            .id_source("pdf_pane")
            .auto_shrink([false, false])
            .enable_scrolling(false)
            .drag_to_scroll(false)
            .scroll_offset(egui::vec2(scroll.x.min(max.x), scroll.y.min(max.y)))
            .show(ui, |ui| self.paint_pages(ui));

        let offset = output.state.offset;
        self.session
            .viewport_mut()
            .set_scroll(ScrollOffset::new(offset.x, offset.y));

        let page_rects = output.inner;
        let snapshot = self.session.snapshot();

        if let Some(pos) = self.pending_pdf_click.take() {
            if let Some((page, page_rect)) = page_rects.iter().find(|(_, r)| r.contains(pos)) {
                let local = pos - page_rect.min;
                if let Some(effects) = self.session.canvas_click(*page, local.x, local.y) {
                    self.apply_effects(effects);
                }
            }
        }

        if !self.session.viewport().suppress_selection() {
            let hover = ui.input(|i| i.pointer.hover_pos()).filter(|p| rect.contains(*p));
            if let Some(pos) = hover {
                for (page, page_rect) in page_rects.iter().filter(|(_, r)| r.contains(pos)) {
                    let local = pos - page_rect.min;
                    let size = PageSize::new(page_rect.width(), page_rect.height());
                    if let Some(chunk) = hit_test(&snapshot, *page, local.x, local.y, size) {
                        self.frame_hover = Some((chunk.id.clone(), Surface::PdfOverlay));
                    }
                }
            }
        }

        if self.session.viewport().has_pending_correction() {
            ui.ctx().request_repaint();
        }
    }

    fn paint_pages(&mut self, ui: &mut egui::Ui) -> Vec<(usize, Rect)> {
        ui.spacing_mut().item_spacing = egui::vec2(0.0, PAGE_GAP);

        let snapshot = self.session.snapshot();
        let overlay_enabled = self.session.viewport().overlay_enabled();
        let pages = self.session.viewport().measurements().page_count();
        let width = self.session.viewport().requested_page_width().round() as u32;

        let mut rendered = false;
        let mut waiting = false;
        let mut rects = Vec::with_capacity(pages);

        for page in 0..pages {
            let size = self.session.viewport().page_size(page);
            let (rect, _) = ui.allocate_exact_size(egui::vec2(size.width, size.height), Sense::hover());
            rects.push((page, rect));
            if !ui.is_rect_visible(rect) {
                continue;
            }

            let stale = self.textures.get(&page).map_or(true, |t| t.width != width);
            if stale && !self.render_errors.contains_key(&page) {
                // One page per frame keeps the UI responsive
                if rendered {
                    waiting = true;
                } else {
                    rendered = true;
                    self.render_page(ui.ctx(), page, width);
                }
            }

            let painter = ui.painter_at(rect);
            match self.textures.get(&page) {
                Some(t) => {
                    let uv = Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));
                    painter.image(t.texture.id(), rect, uv, Color32::WHITE);
                }
                None => {
                    painter.rect_filled(rect, 0.0, Color32::from_gray(235));
                    let message = self
                        .render_errors
                        .get(&page)
                        .map(String::as_str)
                        .unwrap_or("Rendering page…");
                    painter.text(rect.center(), Align2::CENTER_CENTER, message, FontId::proportional(14.0), Color32::DARK_GRAY);
                }
            }

            self.paint_overlay(&painter, &snapshot, page, rect, size, overlay_enabled);
        }

        if rendered || waiting {
            ui.ctx().request_repaint();
        }
        rects
    }

    fn render_page(&mut self, ctx: &egui::Context, page: usize, width: u32) {
        let Some(source) = self.session.source().map(Path::to_path_buf) else {
            return;
        };
        let result = self
            .session
            .previews_mut()
            .page_path(page, width)
            .and_then(|out| self.renderer.render(&source, page, width, &out));

        match result {
            Ok(rendered) => {
                let size = [rendered.rgba.width() as usize, rendered.rgba.height() as usize];
                let image = egui::ColorImage::from_rgba_unmultiplied(size, &rendered.rgba);
                let texture = ctx.load_texture(format!("page_{}", page), image, egui::TextureOptions::LINEAR);
                self.textures.insert(page, PageTexture { width, texture });
                self.session.viewport_mut().record_page_size(page, rendered.size);
            }
            Err(e) => {
                crate::log_error!(e, "page render");
                self.render_errors.insert(page, e.user_message());
            }
        }
    }

    fn paint_overlay(
        &self,
        painter: &egui::Painter,
        snapshot: &ChunkSnapshot,
        page: usize,
        page_rect: Rect,
        size: PageSize,
        overlay_enabled: bool,
    ) {
        let selection = self.session.selection();

        for chunk in snapshot.on_page(page) {
            let Some(bbox) = chunk.overlay_box() else {
                continue;
            };
            let px = bbox.to_pixels(size);
            let rect = Rect::from_min_size(
                page_rect.min + egui::vec2(px.x, px.y),
                egui::vec2(px.width, px.height),
            );

            let (stroke, fill) = match selection.emphasis(&chunk.id) {
                Emphasis::Selected if overlay_enabled => (Stroke::new(2.5, SELECTED), Some(SELECTED_FILL)),
                Emphasis::Hovered => (Stroke::new(1.5, HOVERED), Some(HOVERED_FILL)),
                _ => (Stroke::new(1.0, OUTLINE), None),
            };

            if let Some(fill) = fill {
                painter.rect_filled(rect, 2.0, fill);
                if let Some(label) = snapshot.label(&chunk.id) {
                    painter.text(
                        rect.left_top() + egui::vec2(2.0, 2.0),
                        Align2::LEFT_TOP,
                        label,
                        FontId::monospace(11.0),
                        stroke.color,
                    );
                }
            }
            painter.rect_stroke(rect, 2.0, stroke);
        }
    }

    fn document_pane(&mut self, ui: &mut egui::Ui) {
        ui.heading("Extracted document");
        ui.separator();

        if self.session.document().is_empty() {
            ui.label(if self.session.is_busy() {
                "Waiting for the extraction…"
            } else {
                "Nothing extracted yet."
            });
            return;
        }

        let scroll_target = self
            .scroll_document
            .as_deref()
            .and_then(|id| self.session.document().first_region(id));
        let mut clicked = None;

        egui::ScrollArea::vertical()
            .id_source("document_pane")
            .auto_shrink([false, false])
            .show(ui, |ui| {
                for (index, region) in self.session.document().regions().iter().enumerate() {
                    let emphasis = self.session.selection().emphasis(&region.chunk_id);
                    let stroke = match emphasis {
                        _ if region.active => Stroke::new(2.0, SELECTED),
                        Emphasis::Hovered => Stroke::new(1.5, HOVERED),
                        _ => Stroke::new(1.0, ui.visuals().widgets.noninteractive.bg_stroke.color),
                    };

                    let frame = egui::Frame::group(ui.style()).stroke(stroke).show(ui, |ui| {
                        ui.set_width(ui.available_width());
                        ui.small(format!("{} {} · page {}", region.kind.icon(), region.label, region.page + 1));
                        for block in &region.blocks {
                            show_block(ui, block);
                        }
                    });

                    let response = ui.interact(
                        frame.response.rect,
                        egui::Id::new(("document_region", index)),
                        Sense::click(),
                    );
                    if response.hovered() {
                        self.frame_hover = Some((region.chunk_id.clone(), Surface::Document));
                    }
                    if response.clicked() || response.double_clicked() {
                        clicked = Some(region.chunk_id.clone());
                    }
                    if scroll_target == Some(index) {
                        response.scroll_to_me(Some(Align::Center));
                    }
                }
            });

        if scroll_target.is_some() {
            self.scroll_document = None;
        }
        if let Some(id) = clicked {
            let effects = self.session.click(&id, Surface::Document);
            self.apply_effects(effects);
        }
    }

    fn items_pane(&mut self, ui: &mut egui::Ui) {
        ui.heading("Line items");
        ui.separator();

        let currency = self.session.config().export.currency.clone();
        let selected = self.session.selection().selected();
        let scroll_target = self.scroll_table.take();
        let mut edits = Vec::new();
        let mut remove = None;
        let mut clicked_row = None;

        egui::ScrollArea::vertical()
            .id_source("items_pane")
            .max_height(ui.available_height() - 90.0)
            .show(ui, |ui| {
                egui::Grid::new("line_items").striped(true).num_columns(7).show(ui, |ui| {
                    for header in ["#", "Description", "Qty", "Unit", "Rate", "Amount", ""] {
                        ui.strong(header);
                    }
                    ui.end_row();

                    for (index, row) in self.session.items().table().rows.iter().enumerate() {
                        let is_selected = row.chunk_id.is_some() && row.chunk_id == selected;
                        let handle = ui.selectable_label(is_selected, format!("{}", index + 1));
                        if handle.hovered() {
                            if let Some(id) = &row.chunk_id {
                                self.frame_hover = Some((id.clone(), Surface::Table));
                            }
                        }
                        if handle.clicked() || handle.double_clicked() {
                            clicked_row = Some(index);
                        }
                        if scroll_target == Some(index) {
                            handle.scroll_to_me(Some(Align::Center));
                        }

                        let mut description = row.description.clone();
                        if ui
                            .add(egui::TextEdit::singleline(&mut description).desired_width(180.0))
                            .changed()
                        {
                            edits.push((index, ItemEdit::Description(description)));
                        }

                        let mut quantity = row.quantity;
                        if ui.add(egui::DragValue::new(&mut quantity).speed(0.1)).changed() {
                            edits.push((index, ItemEdit::Quantity(quantity)));
                        }

                        let mut unit = row.unit.clone();
                        if ui
                            .add(egui::TextEdit::singleline(&mut unit).desired_width(40.0))
                            .changed()
                        {
                            edits.push((index, ItemEdit::Unit(unit)));
                        }

                        let mut rate = row.unit_rate;
                        if ui.add(egui::DragValue::new(&mut rate).speed(0.1)).changed() {
                            edits.push((index, ItemEdit::UnitRate(rate)));
                        }

                        ui.label(format!("{:.2}", row.amount()));
                        if ui.small_button("🗑").clicked() {
                            remove = Some(index);
                        }
                        ui.end_row();
                    }
                });
            });

        let editor = self.session.items_mut();
        for (index, edit) in edits {
            editor.edit(index, edit);
        }
        if let Some(index) = remove {
            editor.remove_row(index);
        }

        ui.separator();
        ui.horizontal(|ui| {
            if ui.button("➕ Add row").clicked() {
                self.session.items_mut().add_row(LineItem::new("New item"));
            }
            ui.strong(format!("Total: {} {:.2}", currency, self.session.items().table().total()));
        });

        ui.horizontal(|ui| {
            let editor = self.session.items();
            let can_save = editor.is_dirty() && !editor.is_saving() && self.session.source().is_some();
            if ui.add_enabled(can_save, egui::Button::new("💾 Save")).clicked() {
                self.save_items();
            }
            if ui.button("Export JSON").clicked() {
                self.export_dialog(ExportFormat::Json);
            }
            if ui.button("Export CSV").clicked() {
                self.export_dialog(ExportFormat::Csv);
            }
        });

        let editor = self.session.items();
        if let Some(error) = editor.last_error() {
            ui.colored_label(ERROR_TEXT, error);
        } else if let Some(saved) = editor.last_saved() {
            ui.small(format!("Saved at {}", saved.format("%H:%M:%S")));
        }

        if let Some(row) = clicked_row {
            if let Some(effects) = self.session.table_click(row) {
                self.apply_effects(effects);
            }
        }
    }

    fn save_items(&mut self) {
        let Some(source) = self.session.source() else {
            return;
        };
        let sink = JsonFileSink::new(source.with_extension("items.json"));
        // Local file write, short enough to run inline
        self.runtime.block_on(self.session.save_items(&sink));
    }

    fn export_dialog(&mut self, format: ExportFormat) {
        let Some(dir) = rfd::FileDialog::new().pick_folder() else {
            return;
        };
        match self.session.export(&dir, format) {
            Ok(path) => self.session.set_status(format!("Exported {}", path.display())),
            Err(e) => {
                crate::log_error!(e, "export");
                self.session.set_status(e.user_message());
            }
        }
    }
}

fn show_block(ui: &mut egui::Ui, block: &Block) {
    match block {
        Block::Heading { level, text } => {
            let size = match *level {
                1 => 20.0,
                2 => 17.0,
                _ => 15.0,
            };
            ui.label(egui::RichText::new(text).strong().size(size));
        }
        Block::Paragraph(text) => {
            ui.label(text);
        }
        Block::ListItem(text) => {
            ui.label(format!("• {}", text));
        }
        Block::TableRow(cells) => {
            ui.horizontal_wrapped(|ui| {
                for (i, cell) in cells.iter().enumerate() {
                    if i > 0 {
                        ui.separator();
                    }
                    ui.monospace(cell);
                }
            });
        }
        Block::Code(text) => {
            ui.monospace(text);
        }
    }
}

impl eframe::App for ReviewApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_extraction();

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| self.toolbar(ui));
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| self.status_bar(ui));
        egui::SidePanel::right("items")
            .resizable(true)
            .default_width(460.0)
            .show(ctx, |ui| self.items_pane(ui));
        egui::SidePanel::right("document")
            .resizable(true)
            .default_width(380.0)
            .show(ctx, |ui| self.document_pane(ui));
        egui::CentralPanel::default().show(ctx, |ui| self.pdf_pane(ui));

        self.resolve_hover();
    }
}
