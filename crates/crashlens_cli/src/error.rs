//! CLI-level failures that map to dedicated exit codes.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("No input: pass a log file or --stdin")]
    MissingInput,

    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),

    #[error("Cannot read input {path}: {source}")]
    InputUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Waste detected: {issues} issues, ${cost:.4}")]
    WasteFound { issues: usize, cost: f64 },
}
