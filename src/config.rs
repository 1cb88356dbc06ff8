use serde::{Deserialize, Serialize};
use std::path::Path;
use anyhow::{Result, anyhow};

use crate::error::{ReviewError, ReviewResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub viewer: ViewerConfig,
    pub extraction: ExtractionConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Lower zoom bound
    pub min_zoom: f32,

    /// Upper zoom bound
    pub max_zoom: f32,

    /// Multiplicative factor applied per wheel notch
    pub zoom_step: f32,

    /// Zoom changes smaller than this are ignored
    pub zoom_epsilon: f32,

    /// Pointer travel (px) before a press becomes a pan
    pub pan_threshold_px: f32,

    /// Frames over which the cursor-anchor scroll is re-applied after a zoom
    pub scroll_correction_frames: u32,

    /// Requested page width at zoom 1.0
    pub default_page_width: f32,

    /// Height / width used before a page has been measured
    pub fallback_aspect_ratio: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Maximum nodes visited while searching a payload for its chunk array
    pub search_budget: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub currency: String,
    pub default_format: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0.5,
            max_zoom: 3.5,
            zoom_step: 1.12,
            zoom_epsilon: 1e-3,
            pan_threshold_px: 4.0,
            scroll_correction_frames: 6,
            default_page_width: 900.0,
            fallback_aspect_ratio: 1.4142,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self { search_budget: 5000 }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            currency: "GBP".to_string(),
            default_format: "json".to_string(),
        }
    }
}

impl ReviewConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow!("Failed to read config file: {}", e))?;

        let config: ReviewConfig = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file: {}", e))?;

        Ok(config)
    }

    pub fn load_from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `TAKEOFF_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(value) = std::env::var("TAKEOFF_MAX_ZOOM") {
            if let Ok(value) = value.parse::<f32>() {
                self.viewer.max_zoom = value;
            }
        }

        if let Ok(value) = std::env::var("TAKEOFF_MIN_ZOOM") {
            if let Ok(value) = value.parse::<f32>() {
                self.viewer.min_zoom = value;
            }
        }

        if let Ok(value) = std::env::var("TAKEOFF_SEARCH_BUDGET") {
            if let Ok(value) = value.parse::<usize>() {
                self.extraction.search_budget = value;
            }
        }

        if let Ok(currency) = std::env::var("TAKEOFF_CURRENCY") {
            self.export.currency = currency;
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| anyhow!("Failed to write config file: {}", e))?;

        Ok(())
    }

    pub fn validate(&self) -> ReviewResult<()> {
        let v = &self.viewer;
        if !(v.min_zoom > 0.0 && v.min_zoom < v.max_zoom) {
            return Err(ReviewError::configuration(format!(
                "zoom bounds must satisfy 0 < min < max (got {} .. {})",
                v.min_zoom, v.max_zoom
            )));
        }
        if v.zoom_step <= 1.0 {
            return Err(ReviewError::configuration("zoom_step must be greater than 1"));
        }
        if v.default_page_width <= 0.0 || v.fallback_aspect_ratio <= 0.0 {
            return Err(ReviewError::configuration("page geometry defaults must be positive"));
        }
        if self.extraction.search_budget == 0 {
            return Err(ReviewError::configuration("search_budget must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ReviewConfig::default();
        assert_eq!(config.viewer.min_zoom, 0.5);
        assert_eq!(config.viewer.max_zoom, 3.5);
        assert_eq!(config.extraction.search_budget, 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = ReviewConfig::default();
        config.viewer.scroll_correction_frames = 9;
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("takeoff.toml");

        config.save_to_file(&config_path).unwrap();

        let loaded_config = ReviewConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded_config.viewer.scroll_correction_frames, 9);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("takeoff.toml");
        std::fs::write(&config_path, "[viewer]\nmax_zoom = 5.0\n").unwrap();

        let loaded = ReviewConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.viewer.max_zoom, 5.0);
        assert_eq!(loaded.viewer.min_zoom, 0.5);
        assert_eq!(loaded.export.currency, "GBP");
    }

    #[test]
    fn test_validate_rejects_inverted_zoom() {
        let mut config = ReviewConfig::default();
        config.viewer.min_zoom = 4.0;
        assert!(config.validate().is_err());

        let mut config = ReviewConfig::default();
        config.viewer.zoom_step = 1.0;
        assert!(config.validate().is_err());
    }
}
