//! CLI error type.

use thiserror::Error;
use unitwork_core::CoreError;
use unitwork_storage::StorageError;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors raised by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The unit of work failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The store could not be opened or written.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A report could not be rendered.
    #[error("failed to render report: {0}")]
    Render(#[from] serde_json::Error),

    /// The requested output format is not supported.
    #[error("unknown output format '{0}' (expected text or json)")]
    UnknownFormat(String),
}
