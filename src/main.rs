use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

use takeoff_review::chunks::ChunkSnapshot;
use takeoff_review::config::ReviewConfig;
use takeoff_review::document::DocumentPane;
use takeoff_review::error::{ReviewError, ReviewResult};
use takeoff_review::export::{ExportFormat, ExportTable};
use takeoff_review::geometry::PageSize;
use takeoff_review::items::{items_from_snapshot, ItemEditor, JsonFileSink};
use takeoff_review::logging::{init_logging, LoggingConfig};
use takeoff_review::selection::hit_test;
use takeoff_review::session::PayloadFileExtractor;

#[derive(Parser)]
#[command(name = "takeoff")]
#[command(about = "Inspect and export AI-extracted take-off results")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the chunks found in an extraction result, in reading order
    Inspect {
        payload: PathBuf,

        /// Print machine-readable JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Find the chunk under a pixel on a rendered page
    Locate {
        payload: PathBuf,

        /// Zero-based page index
        #[arg(long)]
        page: usize,

        #[arg(long)]
        x: f32,

        #[arg(long)]
        y: f32,

        /// Rendered page width in pixels
        #[arg(long)]
        width: f32,

        /// Rendered page height in pixels
        #[arg(long)]
        height: f32,
    },

    /// Seed bill-of-quantities rows from an extraction result
    Items {
        payload: PathBuf,

        /// Save the rows as JSON
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Export seeded rows with totals
    Export {
        payload: PathBuf,

        /// Project name used for the output file name (defaults to the payload name)
        #[arg(short, long)]
        project: Option<String>,

        /// json or csv (defaults to the configured format)
        #[arg(short, long)]
        format: Option<String>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Show the effective configuration
    Config {
        /// Write the configuration to this file instead of printing it
        #[arg(long)]
        init: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> ReviewResult<ReviewConfig> {
    let config = match path {
        Some(path) => {
            let mut config = ReviewConfig::load_from_file(path)
                .map_err(|e| ReviewError::configuration(e.to_string()))?;
            config.apply_env();
            config
        }
        None => ReviewConfig::load_from_env(),
    };
    config.validate()?;
    Ok(config)
}

async fn load_snapshot(payload: &Path, config: &ReviewConfig) -> ReviewResult<ChunkSnapshot> {
    let extractor = PayloadFileExtractor::new(Some(payload.to_path_buf()));
    let value: Value = extractor.read(payload).await?;
    Ok(ChunkSnapshot::from_payload(&value, config.extraction.search_budget))
}

async fn inspect_command(payload: &Path, as_json: bool, config: &ReviewConfig) -> ReviewResult<()> {
    let snapshot = load_snapshot(payload, config).await?;

    if as_json {
        let chunks: Vec<Value> = snapshot
            .reading_order()
            .into_iter()
            .map(|chunk| {
                json!({
                    "id": chunk.id,
                    "label": snapshot.label(&chunk.id),
                    "type": chunk.kind,
                    "page": chunk.page,
                    "bbox": chunk.bbox,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&chunks)?);
        return Ok(());
    }

    if snapshot.is_empty() {
        println!("No content chunks found in {}", payload.display());
        return Ok(());
    }

    println!("{:<12} {:<24} {:>5}  box", "label", "id", "page");
    for chunk in snapshot.reading_order() {
        let bbox = match chunk.bbox {
            Some(b) => format!("{:.3},{:.3} - {:.3},{:.3}", b.left, b.top, b.right, b.bottom),
            None => "-".to_string(),
        };
        println!(
            "{:<12} {:<24} {:>5}  {}",
            snapshot.label(&chunk.id).unwrap_or_default(),
            chunk.id,
            chunk.page + 1,
            bbox
        );
    }

    let document = DocumentPane::build(&snapshot);
    println!();
    println!(
        "{} chunks, {} with boxes, {} document regions",
        snapshot.len(),
        snapshot.grounded().count(),
        document.regions().len()
    );
    Ok(())
}

async fn locate_command(
    payload: &Path,
    page: usize,
    x: f32,
    y: f32,
    size: PageSize,
    config: &ReviewConfig,
) -> ReviewResult<()> {
    let snapshot = load_snapshot(payload, config).await?;
    match hit_test(&snapshot, page, x, y, size) {
        Some(chunk) => println!(
            "{} ({}) {}",
            snapshot.label(&chunk.id).unwrap_or_default(),
            chunk.id,
            chunk.content.lines().next().unwrap_or_default()
        ),
        None => println!("No chunk at ({}, {}) on page {}", x, y, page + 1),
    }
    Ok(())
}

async fn items_command(payload: &Path, out: Option<PathBuf>, config: &ReviewConfig) -> ReviewResult<()> {
    let snapshot = load_snapshot(payload, config).await?;
    let table = items_from_snapshot(&snapshot);

    for (i, row) in table.rows.iter().enumerate() {
        println!(
            "{:>3}  {:<40} {:>10.2} {:<5} {:>10.2} {:>12.2}",
            i + 1,
            row.description,
            row.quantity,
            row.unit,
            row.unit_rate,
            row.amount()
        );
    }
    println!("Total: {} {:.2}", config.export.currency, table.total());

    if let Some(out) = out {
        let mut editor = ItemEditor::new(table);
        let sink = JsonFileSink::new(&out);
        if !editor.save(&sink).await {
            let message = editor.last_error().unwrap_or("unknown error").to_string();
            return Err(ReviewError::save(message));
        }
        println!("💾 Saved {} rows to {}", editor.table().rows.len(), out.display());
    }
    Ok(())
}

async fn export_command(
    payload: &Path,
    project: Option<String>,
    format: Option<String>,
    out_dir: &Path,
    config: &ReviewConfig,
) -> ReviewResult<()> {
    let format: ExportFormat = format
        .as_deref()
        .unwrap_or(&config.export.default_format)
        .parse()?;
    let project = project.unwrap_or_else(|| {
        payload
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let snapshot = load_snapshot(payload, config).await?;
    let table = ExportTable::from_items(&project, &config.export.currency, &items_from_snapshot(&snapshot));
    let path = table.write(out_dir, format)?;

    println!("📊 Exported {} rows to {}", table.rows.len(), path.display());
    println!("   Total: {} {:.2}", table.currency, table.total);
    Ok(())
}

fn config_command(init: Option<PathBuf>, config: &ReviewConfig) -> ReviewResult<()> {
    match init {
        Some(path) => {
            config
                .save_to_file(&path)
                .map_err(|e| ReviewError::configuration(e.to_string()))?;
            println!("Configuration written to {}", path.display());
        }
        None => {
            let content = toml::to_string_pretty(config).map_err(anyhow::Error::from)?;
            print!("{}", content);
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> ReviewResult<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Inspect { payload, json } => inspect_command(&payload, json, &config).await,
        Commands::Locate {
            payload,
            page,
            x,
            y,
            width,
            height,
        } => locate_command(&payload, page, x, y, PageSize::new(width, height), &config).await,
        Commands::Items { payload, out } => items_command(&payload, out, &config).await,
        Commands::Export {
            payload,
            project,
            format,
            out_dir,
        } => export_command(&payload, project, format, &out_dir, &config).await,
        Commands::Config { init } => config_command(init, &config),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging_config = LoggingConfig {
        level: if cli.verbose { "debug" } else { "warn" }.to_string(),
        ..LoggingConfig::default()
    };
    let _guard = match init_logging(&logging_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("takeoff {}", env!("CARGO_PKG_VERSION"));

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            takeoff_review::log_error!(e, "cli");
            eprintln!("❌ {}", e.user_message());
            ExitCode::FAILURE
        }
    }
}
