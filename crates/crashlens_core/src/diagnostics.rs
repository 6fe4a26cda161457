//! Non-fatal problems collected during a run.

use serde::{Deserialize, Serialize};

use crate::models::DetectorKind;

/// Class of a non-fatal problem.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A record was skipped.
    InputError,
    /// A cost was estimated rather than computed.
    EstimationWarning,
    /// A detector failed on one trace.
    DetectorFailure,
}

/// A non-fatal problem, kept for the report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector: Option<DetectorKind>,
}

impl Diagnostic {
    pub fn input_error(line: usize, message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::InputError,
            message: message.into(),
            line: Some(line),
            trace_id: None,
            detector: None,
        }
    }

    pub fn estimation_warning(message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::EstimationWarning,
            message: message.into(),
            line: None,
            trace_id: None,
            detector: None,
        }
    }

    pub fn detector_failure(
        detector: DetectorKind,
        trace_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: DiagnosticKind::DetectorFailure,
            message: message.into(),
            line: None,
            trace_id: Some(trace_id.into()),
            detector: Some(detector),
        }
    }

    /// Copy without trace identifiers. Detector failure messages may quote
    /// trace ids, so they are replaced by a generic one.
    pub fn redacted(&self) -> Self {
        let message = match self.kind {
            DiagnosticKind::DetectorFailure => "failed on one trace".to_string(),
            _ => self.message.clone(),
        };
        Self {
            message,
            trace_id: None,
            ..self.clone()
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.line, &self.trace_id, &self.detector) {
            (Some(line), _, _) => write!(f, "line {}: {}", line, self.message),
            (None, Some(trace), Some(detector)) => {
                write!(f, "{} on trace {}: {}", detector, trace, self.message)
            }
            (None, None, Some(detector)) => write!(f, "{}: {}", detector, self.message),
            _ => f.write_str(&self.message),
        }
    }
}
