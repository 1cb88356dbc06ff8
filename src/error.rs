use thiserror::Error;

/// Main error type for the take-off review workbench
#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("Extraction payload rejected: {message}")]
    Payload { message: String },

    #[error("Extraction call failed: {message}")]
    Extraction {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Page rendering failed: {message}")]
    Render { message: String },

    #[error("Saving line items failed: {message}")]
    Save { message: String },

    #[error("Export failed: {message}")]
    Export { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("File I/O error: {path}")]
    FileIO {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("An extraction is already running")]
    Busy,

    #[error("Extraction result belongs to a document that is no longer open")]
    Superseded,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("General error: {0}")]
    General(#[from] anyhow::Error),
}

impl ReviewError {
    pub fn payload(message: impl Into<String>) -> Self {
        Self::Payload {
            message: message.into(),
        }
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
            source: None,
        }
    }

    /// Create an extraction error with source
    pub fn extraction_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Extraction {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn render(message: impl Into<String>) -> Self {
        Self::Render {
            message: message.into(),
        }
    }

    pub fn save(message: impl Into<String>) -> Self {
        Self::Save {
            message: message.into(),
        }
    }

    pub fn export(message: impl Into<String>) -> Self {
        Self::Export {
            message: message.into(),
        }
    }

    /// Create a file I/O error
    pub fn file_io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::FileIO {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Check if error is recoverable (the view stays interactive)
    pub fn is_recoverable(&self) -> bool {
        match self {
            ReviewError::Configuration { .. } => false,
            _ => true,
        }
    }

    /// Get user-friendly error message, shown inline in the view
    pub fn user_message(&self) -> String {
        match self {
            ReviewError::Payload { message } => {
                format!("The extraction result could not be read: {}", message)
            }
            ReviewError::Extraction { message, .. } => {
                format!("Extraction failed: {}. Try again in a moment.", message)
            }
            ReviewError::Render { message } => format!("Could not render the page: {}", message),
            ReviewError::Save { message } => {
                format!("Items were not saved ({}). Your edits are kept, retry when ready.", message)
            }
            ReviewError::Export { message } => format!("Export failed: {}", message),
            ReviewError::FileIO { path, .. } => {
                format!("File access error for {}. Check permissions and disk space.", path)
            }
            ReviewError::Configuration { message } => format!("Invalid configuration: {}", message),
            ReviewError::Busy => "Extraction is already in progress.".to_string(),
            ReviewError::Superseded => "A different drawing was opened; the earlier extraction was discarded.".to_string(),
            ReviewError::Json(e) => format!("The extraction result is not valid JSON: {}", e),
            _ => "Something went wrong. Check the logs for details.".to_string(),
        }
    }
}

/// Result type alias for convenience
pub type ReviewResult<T> = Result<T, ReviewError>;

/// Error context for adding the path that failed
pub trait ErrorContext<T> {
    fn with_path(self, path: &std::path::Path) -> ReviewResult<T>;
}

impl<T> ErrorContext<T> for Result<T, std::io::Error> {
    fn with_path(self, path: &std::path::Path) -> ReviewResult<T> {
        self.map_err(|e| ReviewError::file_io(path.display().to_string(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_message_mentions_retry() {
        let err = ReviewError::save("503 Service Unavailable");
        assert!(err.user_message().contains("retry"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_configuration_is_fatal() {
        assert!(!ReviewError::configuration("bad zoom").is_recoverable());
    }

    #[test]
    fn test_io_context_keeps_path() {
        let res: Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let err = res.with_path(std::path::Path::new("/tmp/items.json")).unwrap_err();
        assert!(err.to_string().contains("/tmp/items.json"));
    }
}
