//! Error types for batch background removal
//!
//! Two layers of failure exist in the pipeline. [`BgBatchError`] is the fatal
//! error returned by configuration, I/O, remover backends and the archive
//! packager. [`ItemFailure`] is the per-item outcome stored inside a batch
//! result; it never aborts the batch.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for batch operations
pub type Result<T> = std::result::Result<T, BgBatchError>;

/// Fatal error types for batch background removal operations
#[derive(Error, Debug)]
pub enum BgBatchError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image format or processing errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Background remover failed or returned unusable output
    #[error("Background removal error: {0}")]
    Removal(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Archive could not be written
    #[error("Archive write failed: {0}")]
    Archive(String),

    /// Encoding, decoding or compositing errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// A single-image request failed the way a batch item would
    #[error(transparent)]
    Item(#[from] ItemFailure),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgBatchError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new removal error
    pub fn removal<S: Into<String>>(msg: S) -> Self {
        Self::Removal(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new archive error
    pub fn archive<S: Into<String>>(msg: S) -> Self {
        Self::Archive(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {operation} '{path_display}': {error}"),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {rec}"),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {parameter}: {value} (valid range: {valid_range}).{recommendation}"
        ))
    }

    /// Create model error with troubleshooting context
    pub fn model_error_with_context<P: AsRef<std::path::Path>>(
        operation: &str,
        model_path: P,
        error: &str,
        suggestions: &[&str],
    ) -> Self {
        let path_display = model_path.as_ref().display();
        let suggestion_text = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Suggestions: {}", suggestions.join(", "))
        };

        Self::Model(format!(
            "Failed to {operation} model '{path_display}': {error}.{suggestion_text}"
        ))
    }
}

/// Reason a single batch item could not be fully processed
///
/// Stored in [`crate::types::ItemOutcome`]; serializable so it can be written
/// into batch reports.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ItemFailure {
    /// Upload exceeded the configured size ceiling
    #[error("file too large: {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },

    /// Bytes could not be decoded as an image
    #[error("undecodable image: {0}")]
    Undecodable(String),

    /// Remover returned a failure, empty output or undecodable output
    #[error("background removal failed: {0}")]
    RemovalFailed(String),

    /// Background could not be blended onto the foreground
    #[error("compositing failed: {0}")]
    CompositeFailed(String),

    /// Remover did not answer within the configured timeout
    #[error("background removal timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    /// Batch was cancelled before this item started
    #[error("cancelled before processing")]
    Cancelled,
}

impl ItemFailure {
    pub fn undecodable<S: Into<String>>(msg: S) -> Self {
        Self::Undecodable(msg.into())
    }

    pub fn removal_failed<S: Into<String>>(msg: S) -> Self {
        Self::RemovalFailed(msg.into())
    }

    pub fn composite_failed<S: Into<String>>(msg: S) -> Self {
        Self::CompositeFailed(msg.into())
    }

    /// Short machine-friendly name of the failure kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TooLarge { .. } => "too_large",
            Self::Undecodable(_) => "undecodable",
            Self::RemovalFailed(_) => "removal_failed",
            Self::CompositeFailed(_) => "composite_failed",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}
