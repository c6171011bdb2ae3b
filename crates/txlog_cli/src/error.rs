//! CLI error type.

use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The log file does not exist.
    #[error("log file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Log decoding error.
    #[error(transparent)]
    Log(#[from] txlog_core::LogError),

    /// Storage error.
    #[error(transparent)]
    Storage(#[from] txlog_storage::StorageError),

    /// JSON output error.
    #[error("JSON output: {0}")]
    Json(#[from] serde_json::Error),

    /// The log failed its check.
    #[error("log check failed: {0}")]
    CheckFailed(String),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;
