//! Page rasterisation through poppler's `pdfinfo` / `pdftoppm`.

use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

use crate::error::{ReviewError, ReviewResult};
use crate::geometry::PageSize;

/// One rendered page bitmap and its real pixel size
pub struct RenderedPage {
    pub size: PageSize,
    pub rgba: image::RgbaImage,
}

#[derive(Debug, Clone)]
pub struct PdftoppmRenderer {
    pdfinfo: String,
    pdftoppm: String,
}

impl Default for PdftoppmRenderer {
    fn default() -> Self {
        Self {
            pdfinfo: "pdfinfo".to_string(),
            pdftoppm: "pdftoppm".to_string(),
        }
    }
}

/// Page count from `pdfinfo` output; defaults to 1 when the line is missing.
pub fn parse_page_count(info: &str) -> usize {
    info.lines()
        .find(|line| line.starts_with("Pages:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|count| count.parse::<usize>().ok())
        .unwrap_or(1)
}

impl PdftoppmRenderer {
    pub fn page_count(&self, pdf: &Path) -> ReviewResult<usize> {
        let output = Command::new(&self.pdfinfo)
            .arg(pdf)
            .output()
            .map_err(|e| ReviewError::render(format!("could not run {}: {}", self.pdfinfo, e)))?;

        if !output.status.success() {
            return Err(ReviewError::render(format!(
                "failed to read PDF info: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let pages = parse_page_count(&String::from_utf8_lossy(&output.stdout));
        info!("PDF has {} pages: {}", pages, pdf.display());
        Ok(pages)
    }

    /// Render zero-based `page` at `width` pixels wide into `out` (a `.png`
    /// path) and decode it. The height follows the page's own aspect ratio.
    pub fn render(&self, pdf: &Path, page: usize, width: u32, out: &Path) -> ReviewResult<RenderedPage> {
        let page_1_based = (page + 1).to_string();
        let prefix = out.with_extension("");

        let output = Command::new(&self.pdftoppm)
            .args(["-png", "-singlefile"])
            .args(["-f", &page_1_based, "-l", &page_1_based])
            .args(["-scale-to-x", &width.to_string(), "-scale-to-y", "-1"])
            .arg(pdf)
            .arg(&prefix)
            .output()
            .map_err(|e| ReviewError::render(format!("could not run {}: {}", self.pdftoppm, e)))?;

        if !output.status.success() {
            return Err(ReviewError::render(format!(
                "pdftoppm failed on page {}: {}",
                page_1_based,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let rgba = image::open(out)
            .map_err(|e| ReviewError::render(format!("{}: {}", out.display(), e)))?
            .to_rgba8();
        let size = PageSize::new(rgba.width() as f32, rgba.height() as f32);
        debug!(page, width = size.width, height = size.height, "page rendered");

        Ok(RenderedPage { size, rgba })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_count() {
        let info = "Title:          Level 2 plan\nProducer:       CAD\nPages:          12\nEncrypted:      no\n";
        assert_eq!(parse_page_count(info), 12);
        assert_eq!(parse_page_count("garbage"), 1);
    }

    #[test]
    fn test_missing_binary_is_render_error() {
        let renderer = PdftoppmRenderer {
            pdfinfo: "definitely-not-pdfinfo".into(),
            pdftoppm: "definitely-not-pdftoppm".into(),
        };
        let err = renderer.page_count(Path::new("plan.pdf")).unwrap_err();
        assert!(matches!(err, ReviewError::Render { .. }));
    }
}
