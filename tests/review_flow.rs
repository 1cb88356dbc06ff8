use serde_json::json;
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use tempfile::tempdir;

use takeoff_review::config::ReviewConfig;
use takeoff_review::export::ExportFormat;
use takeoff_review::geometry::PageSize;
use takeoff_review::selection::{ChunkId, Emphasis, SelectionSync, StateSlot, Surface};
use takeoff_review::session::{PayloadFileExtractor, ReviewSession};
use takeoff_review::viewport::{Point, ScrollOffset};
use takeoff_review::ReviewError;

fn drawing_payload() -> serde_json::Value {
    json!({
        "job": {"status": "done"},
        "data": {"chunks": [
            {"id": "a", "type": "Figure", "content": "Site plan",
             "grounding": {"page": 0, "box": {"left": 0.1, "top": 0.5, "right": 0.6, "bottom": 0.9}}},
            {"id": "b", "type": "figure", "content": "Section A-A",
             "grounding": {"page": 1, "box": {"left": 0.1, "top": 0.1, "right": 0.4, "bottom": 0.4}}},
            {"id": "c", "type": "table",
             "content": "| Item | Qty | Unit | Rate |\n|---|---|---|---|\n| Excavation | 10 | m3 | 12.5 |\n",
             "grounding": {"page": 0, "box": {"left": 0.1, "top": 0.1, "right": 0.9, "bottom": 0.3}}},
            {"id": "", "type": "text", "content": "dropped"},
            {"id": "d", "type": "text", "content": "bad box",
             "grounding": {"page": 0, "box": {"left": 0.5, "top": 0.5, "right": 0.2, "bottom": 0.9}}}
        ]}
    })
}

#[tokio::test]
async fn test_sidecar_extraction_to_export() {
    let dir = tempdir().unwrap();
    let pdf = dir.path().join("Plot 7.pdf");
    std::fs::write(dir.path().join("Plot 7.json"), drawing_payload().to_string()).unwrap();

    let mut session = ReviewSession::new(ReviewConfig::default());
    session.open_document(&pdf, 2);
    let count = session.run_extraction(&PayloadFileExtractor::default()).await.unwrap();
    assert_eq!(count, 4);
    assert!(!session.is_busy());

    let snapshot = session.snapshot();
    assert_eq!(snapshot.label("a"), Some("1.figure"));
    assert_eq!(snapshot.label("b"), Some("2.figure"));
    assert_eq!(snapshot.label("c"), Some("1.table"));
    // Invalid box: kept in the document, never on the overlay
    assert!(snapshot.get("d").unwrap().overlay_box().is_none());
    assert_eq!(snapshot.grounded().count(), 3);

    let order: Vec<&str> = session.document().regions().iter().map(|r| r.chunk_id.as_str()).collect();
    assert_eq!(order, vec!["c", "a", "d", "b"]);

    let table = session.items().table();
    assert_eq!(table.rows[0].description, "Excavation");
    assert_eq!(table.total(), 125.0);

    let path = session.export(dir.path(), ExportFormat::Json).unwrap();
    assert_eq!(path.file_name().unwrap(), "plot_7_takeoff.json");
}

#[tokio::test]
async fn test_missing_sidecar_reports_inline() {
    let dir = tempdir().unwrap();
    let mut session = ReviewSession::new(ReviewConfig::default());
    session.open_document(&dir.path().join("nothing.pdf"), 1);

    let err = session.run_extraction(&PayloadFileExtractor::default()).await.unwrap_err();
    assert!(matches!(err, ReviewError::Extraction { .. }));
    assert!(err.is_recoverable());
    assert!(session.status().unwrap().starts_with("Extraction failed"));
    assert!(!session.is_busy());
}

#[test]
fn test_canvas_click_selects_and_reveals() {
    let mut session = ReviewSession::new(ReviewConfig::default());
    session.open_document(Path::new("plan.pdf"), 2);
    session.load_payload(&drawing_payload());
    session.viewport_mut().record_page_size(0, PageSize::new(900.0, 1200.0));

    // Inside "a" (0.1..0.6 x 0.5..0.9)
    let effects = session.canvas_click(0, 300.0, 800.0).unwrap();
    assert!(effects.selection_changed);
    assert_eq!(effects.scroll_document.as_deref(), Some("a"));
    assert_eq!(effects.scroll_pdf.as_ref().map(|t| t.page), Some(0));
    assert_eq!(session.selection().emphasis("a"), Emphasis::Selected);
    assert!(session.viewport().overlay_enabled());

    // Empty area of the page
    assert!(session.canvas_click(0, 850.0, 50.0).is_none());
    assert_eq!(session.selection().selected().as_deref(), Some("a"));
}

#[test]
fn test_host_owned_selection_behaves_like_owned() {
    let host_selected: Rc<RefCell<ChunkId>> = Rc::new(RefCell::new(None));
    let host_hovered: Rc<RefCell<ChunkId>> = Rc::new(RefCell::new(None));

    let selected = {
        let (get, set) = (Rc::clone(&host_selected), Rc::clone(&host_selected));
        StateSlot::delegated(move || get.borrow().clone(), move |v| *set.borrow_mut() = v)
    };
    let hovered = {
        let (get, set) = (Rc::clone(&host_hovered), Rc::clone(&host_hovered));
        StateSlot::delegated(move || get.borrow().clone(), move |v| *set.borrow_mut() = v)
    };

    let mut session = ReviewSession::with_selection(ReviewConfig::default(), SelectionSync::new(selected, hovered));
    session.load_payload(&drawing_payload());

    session.pointer_enter("c", Surface::Document);
    assert_eq!(host_hovered.borrow().as_deref(), Some("c"));

    session.click("c", Surface::Table);
    assert_eq!(host_selected.borrow().as_deref(), Some("c"));
    assert_eq!(*host_hovered.borrow(), None);

    // The host moves the selection on its own
    *host_selected.borrow_mut() = Some("b".to_string());
    let effects = session.sync();
    assert!(effects.selection_changed);
    assert!(!effects.show_overlay);
    assert_eq!(effects.scroll_pdf.map(|t| t.page), Some(1));
    let active: Vec<&str> = session.document().active().map(|r| r.chunk_id.as_str()).collect();
    assert_eq!(active, vec!["b"]);

    // Nothing changed since: no effects
    assert_eq!(session.sync(), Default::default());
}

#[test]
fn test_zoom_keeps_point_under_cursor() {
    let mut session = ReviewSession::new(ReviewConfig::default());
    session.open_document(Path::new("plan.pdf"), 1);
    session.load_payload(&drawing_payload());
    session.click("a", Surface::Document);

    let viewport = session.viewport_mut();
    viewport.set_scroll(ScrollOffset::new(100.0, 200.0));
    viewport.wheel(-120.0, Point::new(50.0, 50.0));
    assert!(!viewport.overlay_enabled());

    let zoom = viewport.zoom();
    assert!((zoom - 1.12).abs() < 1e-4);
    let corrected = viewport.on_frame(None).unwrap();
    assert!((corrected.x - (150.0 * zoom - 50.0)).abs() < 1e-2);
    assert!((corrected.y - (250.0 * zoom - 50.0)).abs() < 1e-2);

    // Replacing the document stops the correction loop
    session.open_document(Path::new("other.pdf"), 1);
    assert!(!session.viewport().has_pending_correction());
    assert_eq!(session.viewport().zoom(), 1.0);
}
