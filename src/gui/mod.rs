//! Native review window (eframe / egui).

pub mod app;
pub mod renderer;

pub use app::ReviewApp;
pub use renderer::{parse_page_count, PdftoppmRenderer, RenderedPage};
