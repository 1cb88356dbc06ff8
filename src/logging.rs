use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::error::ReviewResult;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub log_dir: PathBuf,
    pub enable_file_logging: bool,
    pub enable_json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: PathBuf::from("logs"),
            enable_file_logging: false,
            enable_json_format: false,
        }
    }
}

/// Keeps the non-blocking file writer alive; drop it last.
pub struct LoggingGuard {
    #[cfg(feature = "advanced_logging")]
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Initialize the logging system
pub fn init_logging(config: &LoggingConfig) -> ReviewResult<LoggingGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("takeoff_review={},{}", config.level, config.level))
    });

    let registry = Registry::default().with(env_filter);

    #[cfg(feature = "advanced_logging")]
    {
        if config.enable_file_logging {
            use crate::error::ErrorContext;

            std::fs::create_dir_all(&config.log_dir).with_path(&config.log_dir)?;

            let file_appender = tracing_appender::rolling::daily(&config.log_dir, "takeoff.log");
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

            let file_layer = if config.enable_json_format {
                fmt::layer().json().with_writer(file_writer).boxed()
            } else {
                fmt::layer().with_writer(file_writer).with_ansi(false).boxed()
            };

            registry.with(file_layer).try_init().map_err(anyhow::Error::from)?;
            info!("File logging enabled: {}", config.log_dir.display());
            return Ok(LoggingGuard {
                _file_guard: Some(guard),
            });
        }
    }

    let console_layer = if config.enable_json_format {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .compact()
            .boxed()
    };

    registry.with(console_layer).try_init().map_err(anyhow::Error::from)?;
    info!("Log level: {}", config.level);

    Ok(LoggingGuard {
        #[cfg(feature = "advanced_logging")]
        _file_guard: None,
    })
}

/// Performance logging utilities
pub struct PerformanceTimer {
    start: std::time::Instant,
    operation: String,
}

impl PerformanceTimer {
    pub fn start(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        tracing::debug!("Starting: {}", operation);
        Self {
            start: std::time::Instant::now(),
            operation,
        }
    }

    pub fn checkpoint(&self, checkpoint: &str) {
        let elapsed = self.start.elapsed();
        tracing::debug!("{} - {}: {}ms", self.operation, checkpoint, elapsed.as_millis());
    }
}

impl Drop for PerformanceTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        info!("Completed {}: {}ms", self.operation, elapsed.as_millis());
    }
}

/// Macro for logging a surfaced error with context
#[macro_export]
macro_rules! log_error {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            recoverable = $error.is_recoverable(),
            "review error occurred"
        );
    };
}
