use eframe::{egui, NativeOptions};
use std::path::PathBuf;

use takeoff_review::config::ReviewConfig;
use takeoff_review::gui::ReviewApp;
use takeoff_review::logging::{init_logging, LoggingConfig};

/// `TAKEOFF_CONFIG` names an optional TOML file; `TAKEOFF_*` variables override it.
fn load_config() -> Result<ReviewConfig, String> {
    let mut config = match std::env::var("TAKEOFF_CONFIG") {
        Ok(path) => ReviewConfig::load_from_file(&path).map_err(|e| e.to_string())?,
        Err(_) => ReviewConfig::default(),
    };
    config.apply_env();
    config.validate().map_err(|e| e.user_message())?;
    Ok(config)
}

fn main() -> Result<(), eframe::Error> {
    let logging_config = LoggingConfig {
        level: "info".to_string(),
        ..LoggingConfig::default()
    };
    let _guard = match init_logging(&logging_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("⚠️ Logging disabled: {}", e);
            None
        }
    };

    let config = load_config().unwrap_or_else(|message| {
        eprintln!("⚠️ {}; using defaults", message);
        ReviewConfig::default()
    });

    // Extraction runs on this runtime; the UI thread stays outside it
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("❌ Could not start async runtime: {}", e);
            std::process::exit(1);
        }
    };
    let handle = runtime.handle().clone();
    let initial = std::env::args_os().nth(1).map(PathBuf::from);

    let options = NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1600.0, 900.0])
            .with_resizable(true)
            .with_title("Take-off Review"),
        ..Default::default()
    };

    eframe::run_native(
        "takeoff-review",
        options,
        Box::new(move |cc| Ok(Box::new(ReviewApp::new(cc, config, handle, initial)))),
    )
}
