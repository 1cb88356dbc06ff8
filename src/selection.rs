//! Selection synchronization between the PDF pane, the document pane and the
//! item table.
//!
//! There is one logical "current chunk". Every surface reports pointer and
//! click events here and gets back the effects to apply (scroll targets,
//! overlay visibility). Selection and hover values live in a [`StateSlot`],
//! which either owns the value or delegates it to a host.

use tracing::debug;

use crate::chunks::{Chunk, ChunkSnapshot};
use crate::geometry::{NormalizedBox, PageSize};

/// Where an interaction came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// A drawn overlay box on the PDF page
    PdfOverlay,
    /// Raw page canvas, resolved through [`hit_test`]
    PdfCanvas,
    Document,
    Table,
}

/// Ownership of one selection field.
pub enum StateSlot<T> {
    /// The synchronizer owns the value; `on_change` is notified after updates.
    Owned {
        value: T,
        on_change: Option<Box<dyn FnMut(&T)>>,
    },
    /// The host owns the value; writes go through `set` and reads through `get`.
    Delegated {
        get: Box<dyn Fn() -> T>,
        set: Box<dyn FnMut(T)>,
    },
}

impl<T: Clone + PartialEq> StateSlot<T> {
    pub fn owned(initial: T) -> Self {
        StateSlot::Owned {
            value: initial,
            on_change: None,
        }
    }

    pub fn owned_with_callback(initial: T, on_change: impl FnMut(&T) + 'static) -> Self {
        StateSlot::Owned {
            value: initial,
            on_change: Some(Box::new(on_change)),
        }
    }

    pub fn delegated(get: impl Fn() -> T + 'static, set: impl FnMut(T) + 'static) -> Self {
        StateSlot::Delegated {
            get: Box::new(get),
            set: Box::new(set),
        }
    }

    pub fn get(&self) -> T {
        match self {
            StateSlot::Owned { value, .. } => value.clone(),
            StateSlot::Delegated { get, .. } => get(),
        }
    }

    /// Write a new value. Unchanged values are not re-notified.
    pub fn set(&mut self, next: T) {
        match self {
            StateSlot::Owned { value, on_change } => {
                if *value == next {
                    return;
                }
                *value = next;
                if let Some(cb) = on_change {
                    cb(value);
                }
            }
            StateSlot::Delegated { get, set } => {
                if get() != next {
                    set(next);
                }
            }
        }
    }

    pub fn is_delegated(&self) -> bool {
        matches!(self, StateSlot::Delegated { .. })
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for StateSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateSlot::Owned { value, .. } => f.debug_tuple("Owned").field(value).finish(),
            StateSlot::Delegated { .. } => f.write_str("Delegated"),
        }
    }
}

/// Visual emphasis of one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emphasis {
    None,
    Hovered,
    Selected,
}

/// Where the PDF pane should scroll for a selection
#[derive(Debug, Clone, PartialEq)]
pub struct PdfTarget {
    pub chunk_id: String,
    pub page: usize,
    pub bbox: Option<NormalizedBox>,
}

/// What the views must do after an interaction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncEffects {
    /// Selection moved to a different chunk (or was cleared)
    pub selection_changed: bool,
    /// Chunk whose region must carry the active marker; `None` clears it
    pub active_chunk: Option<String>,
    /// Document pane scroll target
    pub scroll_document: Option<String>,
    /// PDF pane scroll target
    pub scroll_pdf: Option<PdfTarget>,
    /// Force the PDF selection overlay visible
    pub show_overlay: bool,
}

pub type ChunkId = Option<String>;

#[derive(Debug)]
pub struct SelectionSync {
    selected: StateSlot<ChunkId>,
    hovered: StateSlot<ChunkId>,
    /// Last selection the views were synced to, for detecting host-side changes
    synced: ChunkId,
}

impl Default for SelectionSync {
    fn default() -> Self {
        Self::new(StateSlot::owned(None), StateSlot::owned(None))
    }
}

impl SelectionSync {
    pub fn new(selected: StateSlot<ChunkId>, hovered: StateSlot<ChunkId>) -> Self {
        debug!(
            host_selection = selected.is_delegated(),
            host_hover = hovered.is_delegated(),
            "selection sync created"
        );
        let synced = selected.get();
        Self {
            selected,
            hovered,
            synced,
        }
    }

    pub fn selected(&self) -> ChunkId {
        self.selected.get()
    }

    pub fn hovered(&self) -> ChunkId {
        self.hovered.get()
    }

    /// Selected wins over hovered for the same id.
    pub fn emphasis(&self, chunk_id: &str) -> Emphasis {
        if self.selected().as_deref() == Some(chunk_id) {
            Emphasis::Selected
        } else if self.hovered().as_deref() == Some(chunk_id) {
            Emphasis::Hovered
        } else {
            Emphasis::None
        }
    }

    /// Pointer entered a region bound to `chunk_id`.
    pub fn pointer_enter(&mut self, chunk_id: &str, surface: Surface) {
        if self.selected().as_deref() == Some(chunk_id) {
            return;
        }
        debug!(chunk_id, ?surface, "hover");
        self.hovered.set(Some(chunk_id.to_string()));
    }

    /// Pointer is no longer over any region.
    pub fn pointer_leave(&mut self) {
        self.hovered.set(None);
    }

    /// Click or double-click on a region. Always turns the PDF overlay on.
    pub fn click(&mut self, chunk_id: &str, surface: Surface, snapshot: &ChunkSnapshot) -> SyncEffects {
        debug!(chunk_id, ?surface, "select");
        self.selected.set(Some(chunk_id.to_string()));
        let mut effects = self.sync(snapshot);
        effects.show_overlay = true;
        effects
    }

    /// Programmatic selection, e.g. from a host control. Leaves overlay visibility alone.
    pub fn select(&mut self, chunk_id: Option<&str>, snapshot: &ChunkSnapshot) -> SyncEffects {
        self.selected.set(chunk_id.map(str::to_string));
        self.sync(snapshot)
    }

    /// Pick up a selection changed by the host and compute the follow-up effects.
    pub fn sync(&mut self, snapshot: &ChunkSnapshot) -> SyncEffects {
        let current = self.selected();
        if current == self.synced {
            return SyncEffects::default();
        }
        self.synced = current.clone();

        let scroll_pdf = current.as_deref().and_then(|id| snapshot.get(id)).map(|chunk| PdfTarget {
            chunk_id: chunk.id.clone(),
            page: chunk.page,
            bbox: chunk.bbox,
        });

        // A selected chunk is never shown as merely hovered.
        if current.is_some() && self.hovered() == current {
            self.hovered.set(None);
        }

        SyncEffects {
            selection_changed: true,
            active_chunk: current.clone(),
            scroll_document: current,
            scroll_pdf,
            show_overlay: false,
        }
    }

    /// Back to no selection and no hover, e.g. when a new document is loaded.
    pub fn reset(&mut self) {
        self.selected.set(None);
        self.hovered.set(None);
        self.synced = None;
    }
}

/// Resolve a click on the raw page canvas.
///
/// `x`/`y` are pixels relative to the rendered page, `page_size` its measured
/// size. Among the grounded chunks containing the point, the one with the
/// smallest box wins.
pub fn hit_test<'a>(
    snapshot: &'a ChunkSnapshot,
    page: usize,
    x: f32,
    y: f32,
    page_size: PageSize,
) -> Option<&'a Chunk> {
    let point = page_size.to_page_point(x, y)?;
    snapshot
        .on_page(page)
        .filter_map(|chunk| chunk.bbox.map(|b| (chunk, b)))
        .filter(|(_, b)| b.contains(point))
        .min_by(|(ca, a), (cb, b)| a.area().total_cmp(&b.area()).then_with(|| ca.id.cmp(&cb.id)))
        .map(|(chunk, _)| chunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn snapshot() -> ChunkSnapshot {
        let payload = json!({"chunks": [
            {"id": "outer", "type": "table",
             "grounding": {"page": 0, "box": {"left": 0.1, "top": 0.1, "right": 0.9, "bottom": 0.9}}},
            {"id": "inner", "type": "text",
             "grounding": {"page": 0, "box": {"left": 0.4, "top": 0.4, "right": 0.6, "bottom": 0.6}}},
            {"id": "other-page", "type": "text",
             "grounding": {"page": 1, "box": {"left": 0.0, "top": 0.0, "right": 1.0, "bottom": 1.0}}},
            {"id": "floating", "type": "text"}
        ]});
        ChunkSnapshot::from_payload(&payload, 100)
    }

    #[test]
    fn test_hit_test_prefers_smallest_box() {
        let snap = snapshot();
        let page = PageSize::new(1000.0, 1000.0);
        assert_eq!(hit_test(&snap, 0, 500.0, 500.0, page).map(|c| c.id.as_str()), Some("inner"));
        assert_eq!(hit_test(&snap, 0, 200.0, 200.0, page).map(|c| c.id.as_str()), Some("outer"));
        assert!(hit_test(&snap, 0, 50.0, 50.0, page).is_none());
        assert_eq!(hit_test(&snap, 1, 50.0, 50.0, page).map(|c| c.id.as_str()), Some("other-page"));
        assert!(hit_test(&snap, 0, 500.0, 500.0, PageSize::new(0.0, 0.0)).is_none());
    }

    #[test]
    fn test_hover_and_selection_precedence() {
        let snap = snapshot();
        let mut sync = SelectionSync::default();
        assert_eq!(sync.selected(), None);
        assert_eq!(sync.hovered(), None);

        sync.pointer_enter("outer", Surface::Document);
        assert_eq!(sync.emphasis("outer"), Emphasis::Hovered);

        sync.click("outer", Surface::Document, &snap);
        assert_eq!(sync.emphasis("outer"), Emphasis::Selected);
        assert_eq!(sync.hovered(), None);

        // Hovering the selected chunk does not demote it
        sync.pointer_enter("outer", Surface::Table);
        assert_eq!(sync.hovered(), None);

        sync.pointer_enter("inner", Surface::Table);
        assert_eq!(sync.emphasis("inner"), Emphasis::Hovered);
        sync.pointer_leave();
        assert_eq!(sync.hovered(), None);
    }

    #[test]
    fn test_click_effects() {
        let snap = snapshot();
        let mut sync = SelectionSync::default();

        let effects = sync.click("inner", Surface::PdfOverlay, &snap);
        assert!(effects.selection_changed);
        assert!(effects.show_overlay);
        assert_eq!(effects.active_chunk.as_deref(), Some("inner"));
        assert_eq!(effects.scroll_document.as_deref(), Some("inner"));
        let target = effects.scroll_pdf.unwrap();
        assert_eq!(target.page, 0);
        assert!(target.bbox.is_some());

        // Same chunk again: overlay forced on, no re-scroll
        let again = sync.click("inner", Surface::Table, &snap);
        assert!(!again.selection_changed);
        assert!(again.show_overlay);
        assert!(again.scroll_pdf.is_none());

        // Chunk without grounding still scrolls to its page
        let floating = sync.click("floating", Surface::Document, &snap);
        assert_eq!(floating.scroll_pdf.map(|t| t.bbox), Some(None));
    }

    #[test]
    fn test_programmatic_select_keeps_overlay_state() {
        let snap = snapshot();
        let mut sync = SelectionSync::default();
        let effects = sync.select(Some("outer"), &snap);
        assert!(effects.selection_changed);
        assert!(!effects.show_overlay);

        let cleared = sync.select(None, &snap);
        assert!(cleared.selection_changed);
        assert_eq!(cleared.active_chunk, None);
    }

    #[test]
    fn test_owned_and_delegated_behave_the_same() {
        let snap = snapshot();

        let host_selected: Rc<RefCell<ChunkId>> = Rc::new(RefCell::new(None));
        let host_hovered: Rc<RefCell<ChunkId>> = Rc::new(RefCell::new(None));
        let (gs, ss) = (host_selected.clone(), host_selected.clone());
        let (gh, sh) = (host_hovered.clone(), host_hovered.clone());
        let mut delegated = SelectionSync::new(
            StateSlot::delegated(move || gs.borrow().clone(), move |v| *ss.borrow_mut() = v),
            StateSlot::delegated(move || gh.borrow().clone(), move |v| *sh.borrow_mut() = v),
        );

        let notified = Rc::new(RefCell::new(Vec::new()));
        let log = notified.clone();
        let mut owned = SelectionSync::new(
            StateSlot::owned_with_callback(None, move |v: &ChunkId| log.borrow_mut().push(v.clone())),
            StateSlot::owned(None),
        );
        assert!(delegated.selected.is_delegated() && delegated.hovered.is_delegated());
        assert!(!owned.selected.is_delegated());

        for sync in [&mut owned, &mut delegated] {
            sync.pointer_enter("inner", Surface::Document);
            assert_eq!(sync.hovered().as_deref(), Some("inner"));
            let effects = sync.click("outer", Surface::PdfCanvas, &snap);
            assert!(effects.selection_changed);
            assert_eq!(sync.selected().as_deref(), Some("outer"));
            sync.reset();
            assert_eq!(sync.selected(), None);
            assert_eq!(sync.hovered(), None);
        }

        assert_eq!(*host_selected.borrow(), None);
        assert_eq!(*notified.borrow(), vec![Some("outer".to_string()), None]);
    }

    #[test]
    fn test_host_side_change_is_picked_up() {
        let snap = snapshot();
        let host: Rc<RefCell<ChunkId>> = Rc::new(RefCell::new(None));
        let (g, s) = (host.clone(), host.clone());
        let mut sync = SelectionSync::new(
            StateSlot::delegated(move || g.borrow().clone(), move |v| *s.borrow_mut() = v),
            StateSlot::owned(None),
        );

        *host.borrow_mut() = Some("other-page".to_string());
        let effects = sync.sync(&snap);
        assert!(effects.selection_changed);
        assert_eq!(effects.scroll_pdf.map(|t| t.page), Some(1));
        assert_eq!(sync.sync(&snap), SyncEffects::default());
    }
}
