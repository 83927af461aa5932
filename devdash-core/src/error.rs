/// Structured error types for devdash-core.
///
/// Library consumers get `thiserror` enums; the `devdash` binary wraps these
/// in `anyhow` with context.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::ValidationError;

/// Main error type for devdash-core operations
#[derive(Error, Debug)]
pub enum DashError {
    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// Config file could not be parsed
    #[error("Invalid config in {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Config could not be serialized
    #[error("Failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Semantic configuration error
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// Input failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// JSON encoding/decoding failed
    #[error("JSON error at {context}: {source}")]
    Json {
        context: String,
        source: serde_json::Error,
    },
}

/// Result type alias for devdash-core operations
pub type Result<T> = std::result::Result<T, DashError>;

impl DashError {
    /// Create a config error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Create a JSON error with context
    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DashError::config("mysql.url is empty");
        assert_eq!(err.to_string(), "Configuration error: mysql.url is empty");

        let err: DashError = ValidationError::Empty { field: "title" }.into();
        assert_eq!(err.to_string(), "title cannot be empty");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: DashError = io_err.into();

        assert!(matches!(err, DashError::Io { .. }));
    }
}
