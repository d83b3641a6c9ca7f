//! CLI command implementations.

pub mod dump;
pub mod run;
pub mod seed;

use crate::error::{CliError, CliResult};
use std::path::PathBuf;

/// Options shared by every command.
#[derive(Debug, Clone)]
pub struct Options {
    /// Store file; in-memory when absent.
    pub path: Option<PathBuf>,
    /// Log statements as they are sent.
    pub show_statements: bool,
    /// Output format name.
    pub format: String,
}

/// How command output is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl Options {
    /// Parses the output format.
    pub fn format(&self) -> CliResult<Format> {
        match self.format.as_str() {
            "text" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            other => Err(CliError::UnknownFormat(other.to_string())),
        }
    }
}
