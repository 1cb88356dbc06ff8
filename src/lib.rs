//! Review workbench for AI-extracted take-offs: chunk extraction from
//! arbitrary payloads, labels, the rendered document, selection sync between
//! panes and the PDF viewport controller.

pub mod chunks;
pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod geometry;
pub mod items;
pub mod labels;
pub mod logging;
pub mod selection;
pub mod session;
pub mod viewport;

#[cfg(feature = "gui")]
pub mod gui;

pub use chunks::{Chunk, ChunkSnapshot};
pub use error::{ReviewError, ReviewResult};
pub use session::ReviewSession;
