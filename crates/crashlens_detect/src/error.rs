//! Error types for the detection module.

use thiserror::Error;

use crashlens_core::{CoreError, DetectorKind};

/// Result type alias for detection operations.
pub type DetectResult<T> = Result<T, DetectError>;

/// Errors that can occur while detecting or aggregating waste.
#[derive(Error, Debug)]
pub enum DetectError {
    #[error("No pricing available for model: {0}")]
    MissingPricing(String),

    #[error("Detector {detector} failed: {message}")]
    Internal {
        detector: DetectorKind,
        message: String,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl DetectError {
    /// Whether this error must abort a run rather than a single trace.
    pub fn is_fatal(&self) -> bool {
        match self {
            DetectError::Core(e) => e.is_fatal(),
            _ => false,
        }
    }
}
