use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::info;

use crate::error::{ErrorContext, ReviewError, ReviewResult};
use crate::items::ItemTable;
use crate::logging::PerformanceTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(ReviewError::export(format!("unsupported export format: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    pub item: usize,
    pub description: String,
    pub quantity: f64,
    pub unit: String,
    pub unit_rate: f64,
    pub amount: f64,
}

/// Row set plus computed total, ready to be written out
#[derive(Debug, Clone, Serialize)]
pub struct ExportTable {
    pub project: String,
    pub currency: String,
    pub generated_at: DateTime<Utc>,
    pub rows: Vec<ExportRow>,
    pub total: f64,
}

fn non_alnum_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"))
}

/// Extensions dropped from a source file name before it becomes a slug.
/// Anything else after a dot is part of the project name ("Phase 1.2").
const SOURCE_EXTENSIONS: &[&str] = &["pdf", "json", "csv", "xlsx", "xls", "dwg", "dxf", "png", "jpg", "jpeg", "tif", "tiff"];

/// Download name derived from the project or source file name,
/// e.g. `"Site A (rev 2).pdf"` -> `site_a_rev_2_takeoff.csv`.
pub fn file_name(project: &str, format: ExportFormat) -> String {
    let name = Path::new(project.trim())
        .file_name()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let stem = match name.rsplit_once('.') {
        Some((stem, ext)) if SOURCE_EXTENSIONS.contains(&ext) => stem,
        _ => name.as_str(),
    };
    let slug = non_alnum_re().replace_all(stem, "_");
    let slug = slug.trim_matches('_');

    if slug.is_empty() {
        format!("takeoff.{}", format.extension())
    } else {
        format!("{}_takeoff.{}", slug, format.extension())
    }
}

impl ExportTable {
    pub fn from_items(project: &str, currency: &str, items: &ItemTable) -> Self {
        let rows = items
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| ExportRow {
                item: i + 1,
                description: row.description.clone(),
                quantity: row.quantity,
                unit: row.unit.clone(),
                unit_rate: row.unit_rate,
                amount: row.amount(),
            })
            .collect();

        Self {
            project: project.to_string(),
            currency: currency.to_string(),
            generated_at: Utc::now(),
            rows,
            total: items.total(),
        }
    }

    /// Write into `dir` under the derived file name; returns the path written.
    pub fn write(&self, dir: &Path, format: ExportFormat) -> ReviewResult<PathBuf> {
        let _timer = PerformanceTimer::start(format!("export {}", format.extension()));
        let path = dir.join(file_name(&self.project, format));

        match format {
            ExportFormat::Json => self.write_json(&path)?,
            ExportFormat::Csv => self.write_csv(&path)?,
        }

        info!(rows = self.rows.len(), total = self.total, "Export completed: {:?}", path);
        Ok(path)
    }

    fn write_json(&self, path: &Path) -> ReviewResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_path(path)
    }

    #[cfg(feature = "data_export")]
    fn write_csv(&self, path: &Path) -> ReviewResult<()> {
        use polars::prelude::*;

        // Totals row goes last
        let mut items: Vec<Option<i64>> = self.rows.iter().map(|r| Some(r.item as i64)).collect();
        let mut descriptions: Vec<String> = self.rows.iter().map(|r| r.description.clone()).collect();
        let mut quantities: Vec<Option<f64>> = self.rows.iter().map(|r| Some(r.quantity)).collect();
        let mut units: Vec<String> = self.rows.iter().map(|r| r.unit.clone()).collect();
        let mut rates: Vec<Option<f64>> = self.rows.iter().map(|r| Some(r.unit_rate)).collect();
        let mut amounts: Vec<f64> = self.rows.iter().map(|r| r.amount).collect();

        items.push(None);
        descriptions.push(format!("TOTAL ({})", self.currency));
        quantities.push(None);
        units.push(String::new());
        rates.push(None);
        amounts.push(self.total);

        let mut df = df! {
            "item" => items,
            "description" => descriptions,
            "quantity" => quantities,
            "unit" => units,
            "unit_rate" => rates,
            "amount" => amounts,
        }
        .map_err(|e| ReviewError::export(e.to_string()))?;

        let mut file = std::fs::File::create(path).with_path(path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)
            .map_err(|e| ReviewError::export(e.to_string()))?;
        Ok(())
    }

    #[cfg(not(feature = "data_export"))]
    fn write_csv(&self, _path: &Path) -> ReviewResult<()> {
        Err(ReviewError::export(
            "CSV export needs the `data_export` feature; use JSON instead",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::LineItem;
    use tempfile::tempdir;

    fn items() -> ItemTable {
        let mut a = LineItem::new("Excavation");
        a.quantity = 10.0;
        a.unit = "m3".into();
        a.unit_rate = 12.5;
        let mut b = LineItem::new("Disposal");
        b.quantity = 10.0;
        b.unit = "m3".into();
        b.unit_rate = 20.0;
        ItemTable { rows: vec![a, b] }
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("Site A (rev 2).pdf", ExportFormat::Csv), "site_a_rev_2_takeoff.csv");
        assert_eq!(file_name("  Warehouse_Fitout ", ExportFormat::Json), "warehouse_fitout_takeoff.json");
        assert_eq!(file_name("", ExportFormat::Json), "takeoff.json");
        assert_eq!(file_name("???", ExportFormat::Csv), "takeoff.csv");
        // Dots that are not a file extension stay in the name
        assert_eq!(file_name("Phase 1.2", ExportFormat::Json), "phase_1_2_takeoff.json");
        assert_eq!(file_name("Plan.PDF", ExportFormat::Csv), "plan_takeoff.csv");
        assert_eq!(file_name("/plans/Block B.pdf", ExportFormat::Json), "block_b_takeoff.json");
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("xlsx".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_table_total_and_json() {
        let table = ExportTable::from_items("Plot 4", "GBP", &items());
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].item, 2);
        assert_eq!(table.total, 325.0);

        let dir = tempdir().unwrap();
        let path = table.write(dir.path(), ExportFormat::Json).unwrap();
        assert_eq!(path.file_name().unwrap(), "plot_4_takeoff.json");

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["total"], 325.0);
        assert_eq!(written["rows"][0]["amount"], 125.0);
    }

    #[cfg(feature = "data_export")]
    #[test]
    fn test_csv_has_total_row() {
        let table = ExportTable::from_items("Plot 4", "GBP", &items());
        let dir = tempdir().unwrap();
        let path = table.write(dir.path(), ExportFormat::Csv).unwrap();
        let csv = std::fs::read_to_string(path).unwrap();
        let last = csv.lines().last().unwrap();
        assert!(last.contains("TOTAL (GBP)"));
        assert!(last.contains("325"));
    }
}
