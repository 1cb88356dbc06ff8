//! PDF viewport controller: cursor-anchored wheel zoom, drag-to-pan and
//! per-page size measurement.
//!
//! Pages are stacked vertically in one scrollable column. Coordinates here
//! are plain pixels so the controller can be driven by any UI toolkit.

use std::collections::HashMap;
use tracing::{debug, trace};

use crate::config::ViewerConfig;
use crate::geometry::{NormalizedBox, PageSize};

/// Vertical gap between stacked pages, in pixels
pub const PAGE_GAP: f32 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollOffset {
    pub x: f32,
    pub y: f32,
}

impl ScrollOffset {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn clamped(self, max: Option<ScrollOffset>) -> Self {
        let mut out = Self::new(self.x.max(0.0), self.y.max(0.0));
        if let Some(max) = max {
            out.x = out.x.min(max.x.max(0.0));
            out.y = out.y.min(max.y.max(0.0));
        }
        out
    }
}

/// Pixel size of the visible viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportSize {
    pub width: f32,
    pub height: f32,
}

/// Result of a wheel gesture
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoomOutcome {
    Ignored,
    Zoomed { old: f32, new: f32 },
}

/// Content point that was under the pointer when the zoom happened.
#[derive(Debug, Clone, Copy, PartialEq)]
enum AnchorPoint {
    /// Fraction of a page's rendered size. Survives pages whose heights
    /// change independently and the fixed gaps between them.
    OnPage { page: usize, frac_x: f32, frac_y: f32 },
    /// Pointer was over a gap or past the last page: scale uniformly.
    Uniform { content_x: f32, content_y: f32, ratio: f32 },
}

/// Cursor anchor recorded at zoom time, re-applied for a few frames
#[derive(Debug, Clone, Copy, PartialEq)]
struct ZoomAnchor {
    pointer: Point,
    point: AnchorPoint,
    frames_left: u32,
}

/// Press-drag state. A press only becomes a pan after the pointer moves past
/// the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PanGesture {
    #[default]
    Idle,
    Pressed { start: Point, scroll: ScrollOffset },
    Panning { start: Point, scroll: ScrollOffset },
}

/// How a press ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanRelease {
    /// Never promoted: treat as click / double-click
    Click,
    PanEnded,
    /// No press was active
    None,
}

impl PanGesture {
    pub fn is_panning(&self) -> bool {
        matches!(self, PanGesture::Panning { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Measurement {
    size: PageSize,
    requested_width: f32,
}

/// Observed page sizes, keyed per page.
#[derive(Debug, Clone, Default)]
pub struct PageMeasurements {
    page_count: usize,
    measured: HashMap<usize, Measurement>,
}

impl PageMeasurements {
    pub fn reset(&mut self, page_count: usize) {
        self.page_count = page_count;
        self.measured.clear();
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Record the real rendered size after a page finished rendering.
    pub fn record(&mut self, page: usize, size: PageSize, requested_width: f32) {
        if size.width <= 0.0 || size.height <= 0.0 {
            return;
        }
        trace!(page, width = size.width, height = size.height, "page measured");
        self.measured.insert(page, Measurement { size, requested_width });
    }

    /// Size of `page` at `requested_width`. A page measured at another width is
    /// scaled keeping its aspect; an unmeasured page uses the fallback aspect.
    pub fn size_for(&self, page: usize, requested_width: f32, fallback_aspect: f32) -> PageSize {
        match self.measured.get(&page) {
            Some(m) if (m.requested_width - requested_width).abs() < 0.5 => m.size,
            Some(m) => {
                let scale = requested_width / m.requested_width.max(1.0);
                PageSize::new(m.size.width * scale, m.size.height * scale)
            }
            None => PageSize::new(requested_width, requested_width * fallback_aspect),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewportController {
    config: ViewerConfig,
    zoom: f32,
    scroll: ScrollOffset,
    overlay_enabled: bool,
    pending: Option<ZoomAnchor>,
    pan: PanGesture,
    measurements: PageMeasurements,
}

impl ViewportController {
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            config: config.clone(),
            zoom: 1.0_f32.clamp(config.min_zoom, config.max_zoom),
            scroll: ScrollOffset::default(),
            overlay_enabled: false,
            pending: None,
            pan: PanGesture::Idle,
            measurements: PageMeasurements::default(),
        }
    }

    /// Fresh state for a newly loaded document.
    pub fn reset(&mut self, page_count: usize) {
        self.reset_view();
        self.measurements.reset(page_count);
    }

    /// Back to 100% at the top with no overlay. Page measurements are kept
    /// since the pages themselves have not changed.
    pub fn reset_view(&mut self) {
        self.zoom = 1.0_f32.clamp(self.config.min_zoom, self.config.max_zoom);
        self.scroll = ScrollOffset::default();
        self.overlay_enabled = false;
        self.pending = None;
        self.pan = PanGesture::Idle;
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn scroll(&self) -> ScrollOffset {
        self.scroll
    }

    /// Report the scroll position the view actually has.
    pub fn set_scroll(&mut self, scroll: ScrollOffset) {
        self.scroll = scroll.clamped(None);
    }

    pub fn overlay_enabled(&self) -> bool {
        self.overlay_enabled
    }

    pub fn show_overlay(&mut self) {
        self.overlay_enabled = true;
    }

    pub fn hide_overlay(&mut self) {
        self.overlay_enabled = false;
    }

    pub fn has_pending_correction(&self) -> bool {
        self.pending.is_some()
    }

    /// Width requested from the renderer for every page at the current zoom.
    pub fn requested_page_width(&self) -> f32 {
        self.config.default_page_width * self.zoom
    }

    pub fn measurements(&self) -> &PageMeasurements {
        &self.measurements
    }

    pub fn record_page_size(&mut self, page: usize, size: PageSize) {
        let requested = self.requested_page_width();
        self.measurements.record(page, size, requested);
    }

    pub fn page_size(&self, page: usize) -> PageSize {
        self.measurements
            .size_for(page, self.requested_page_width(), self.config.fallback_aspect_ratio)
    }

    /// Top of `page` inside the scroll content.
    pub fn page_top(&self, page: usize) -> f32 {
        (0..page).map(|p| self.page_size(p).height + PAGE_GAP).sum()
    }

    pub fn content_height(&self) -> f32 {
        let pages = self.measurements.page_count();
        if pages == 0 {
            return 0.0;
        }
        self.page_top(pages - 1) + self.page_size(pages - 1).height
    }

    /// Page under a content-space y coordinate plus the y offset within it.
    pub fn page_at(&self, content_y: f32) -> Option<(usize, f32)> {
        let mut top = 0.0;
        for page in 0..self.measurements.page_count() {
            let height = self.page_size(page).height;
            if content_y >= top && content_y <= top + height {
                return Some((page, content_y - top));
            }
            top += height + PAGE_GAP;
        }
        None
    }

    fn apply_zoom(&mut self, new_zoom: f32, pointer: Point) -> ZoomOutcome {
        let new_zoom = new_zoom.clamp(self.config.min_zoom, self.config.max_zoom);
        let old = self.zoom;
        if (new_zoom - old).abs() < self.config.zoom_epsilon {
            return ZoomOutcome::Ignored;
        }

        // Resolve against the layout at the old zoom, before it changes.
        let point = self.anchor_point(pointer, new_zoom / old);

        // Any zoom hides the selection box until the pages re-render.
        self.overlay_enabled = false;
        self.zoom = new_zoom;
        self.pending = Some(ZoomAnchor {
            pointer,
            point,
            frames_left: self.config.scroll_correction_frames.max(1),
        });

        debug!(old, new = new_zoom, "zoom");
        ZoomOutcome::Zoomed { old, new: new_zoom }
    }

    fn anchor_point(&self, pointer: Point, ratio: f32) -> AnchorPoint {
        let content_x = self.scroll.x + pointer.x;
        let content_y = self.scroll.y + pointer.y;
        match self.page_at(content_y) {
            Some((page, offset)) => {
                let size = self.page_size(page);
                AnchorPoint::OnPage {
                    page,
                    frac_x: content_x / size.width.max(1.0),
                    frac_y: offset / size.height.max(1.0),
                }
            }
            None => AnchorPoint::Uniform {
                content_x,
                content_y,
                ratio,
            },
        }
    }

    /// Scroll offset that puts the anchored content point back under the
    /// pointer, using the page sizes known right now.
    fn anchor_target(&self, anchor: &ZoomAnchor) -> ScrollOffset {
        let pointer = anchor.pointer;
        match anchor.point {
            AnchorPoint::OnPage { page, frac_x, frac_y } => {
                let size = self.page_size(page);
                ScrollOffset::new(
                    frac_x * size.width - pointer.x,
                    self.page_top(page) + frac_y * size.height - pointer.y,
                )
            }
            AnchorPoint::Uniform {
                content_x,
                content_y,
                ratio,
            } => ScrollOffset::new(content_x * ratio - pointer.x, content_y * ratio - pointer.y),
        }
    }

    /// Wheel gesture over the pane. Negative `delta_y` (wheel up) zooms in.
    /// `pointer` is relative to the viewport's top-left corner.
    pub fn wheel(&mut self, delta_y: f32, pointer: Point) -> ZoomOutcome {
        if delta_y == 0.0 || !delta_y.is_finite() {
            return ZoomOutcome::Ignored;
        }
        let next = if delta_y < 0.0 {
            self.zoom * self.config.zoom_step
        } else {
            self.zoom / self.config.zoom_step
        };
        self.apply_zoom(next, pointer)
    }

    /// Toolbar zoom, anchored at `anchor` (usually the viewport centre).
    pub fn set_zoom(&mut self, zoom: f32, anchor: Point) -> ZoomOutcome {
        self.apply_zoom(zoom, anchor)
    }

    pub fn zoom_in(&mut self, anchor: Point) -> ZoomOutcome {
        self.apply_zoom(self.zoom * self.config.zoom_step, anchor)
    }

    pub fn zoom_out(&mut self, anchor: Point) -> ZoomOutcome {
        self.apply_zoom(self.zoom / self.config.zoom_step, anchor)
    }

    /// Called once per UI frame. While a zoom correction is pending, returns
    /// the scroll offset to apply; `max_scroll` is the current scrollable
    /// range if the view knows it. Stops after the configured frame count.
    pub fn on_frame(&mut self, max_scroll: Option<ScrollOffset>) -> Option<ScrollOffset> {
        let mut anchor = self.pending?;
        let target = self.anchor_target(&anchor).clamped(max_scroll);
        anchor.frames_left = anchor.frames_left.saturating_sub(1);
        self.pending = (anchor.frames_left > 0).then_some(anchor);
        self.scroll = target;
        Some(target)
    }

    /// The renderer reported that layout at the new zoom has settled: apply
    /// the correction one final time and stop retrying.
    pub fn layout_settled(&mut self, max_scroll: Option<ScrollOffset>) -> Option<ScrollOffset> {
        let anchor = self.pending.take()?;
        let target = self.anchor_target(&anchor).clamped(max_scroll);
        self.scroll = target;
        Some(target)
    }

    /// Drop any pending correction (document replaced, view closed).
    pub fn cancel_pending(&mut self) {
        self.pending = None;
    }

    /// Primary button pressed inside the viewport.
    pub fn pointer_down(&mut self, pos: Point) {
        self.pan = PanGesture::Pressed {
            start: pos,
            scroll: self.scroll,
        };
    }

    /// Pointer moved while a press may be active. Returns the new scroll
    /// offset once the gesture is a pan.
    pub fn pointer_move(&mut self, pos: Point) -> Option<ScrollOffset> {
        let (start, scroll) = match self.pan {
            PanGesture::Idle => return None,
            PanGesture::Pressed { start, scroll } => {
                let dx = pos.x - start.x;
                let dy = pos.y - start.y;
                if (dx * dx + dy * dy).sqrt() <= self.config.pan_threshold_px {
                    return None;
                }
                // A pan takes over the scroll position from a zoom correction.
                self.pending = None;
                self.pan = PanGesture::Panning { start, scroll };
                (start, scroll)
            }
            PanGesture::Panning { start, scroll } => (start, scroll),
        };

        let next = ScrollOffset::new(scroll.x - (pos.x - start.x), scroll.y - (pos.y - start.y)).clamped(None);
        self.scroll = next;
        Some(next)
    }

    /// Button released; always ends the gesture.
    pub fn pointer_up(&mut self) -> PanRelease {
        let release = match self.pan {
            PanGesture::Idle => PanRelease::None,
            PanGesture::Pressed { .. } => PanRelease::Click,
            PanGesture::Panning { .. } => PanRelease::PanEnded,
        };
        self.pan = PanGesture::Idle;
        release
    }

    /// Text and drag selection are suppressed while panning.
    pub fn suppress_selection(&self) -> bool {
        self.pan.is_panning()
    }

    pub fn pan_state(&self) -> PanGesture {
        self.pan
    }

    /// Scroll offset that brings a page (and box, when known) into view,
    /// centring the box where possible.
    pub fn reveal(&self, page: usize, bbox: Option<&NormalizedBox>, viewport: ViewportSize) -> ScrollOffset {
        let top = self.page_top(page);
        let size = self.page_size(page);
        let target = match bbox {
            Some(b) => {
                let rect = b.to_pixels(size);
                let (cx, cy) = rect.center();
                ScrollOffset::new(cx - viewport.width / 2.0, top + cy - viewport.height / 2.0)
            }
            None => ScrollOffset::new(self.scroll.x, top),
        };
        target.clamped(None)
    }
}
