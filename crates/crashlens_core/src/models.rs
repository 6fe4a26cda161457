//! Canonical data model shared by the parser, the detectors and the reports.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single API call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Success,
    Failure,
    #[default]
    Unknown,
}

impl CallStatus {
    /// Normalize a free-form status string.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "success" | "ok" | "completed" | "succeeded" => CallStatus::Success,
            "failure" | "failed" | "error" | "errored" | "timeout" => CallStatus::Failure,
            _ => CallStatus::Unknown,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, CallStatus::Failure)
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStatus::Success => write!(f, "success"),
            CallStatus::Failure => write!(f, "failure"),
            CallStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// A single normalized API call.
///
/// Built once by the parser and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Call {
    pub trace_id: String,
    pub timestamp: DateTime<Utc>,
    pub model: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    /// Explicit cost reported by the provider, if any.
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub status: CallStatus,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Position of the record in the input batch.
    #[serde(default)]
    pub sequence: usize,
}

impl Call {
    /// Create a call with zero usage and unknown status.
    pub fn new(
        trace_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        model: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            timestamp,
            model: model.into(),
            prompt: prompt.into(),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            cost: None,
            status: CallStatus::Unknown,
            route: None,
            metadata: BTreeMap::new(),
            sequence: 0,
        }
    }

    /// Set token usage; the total is the sum of both counts.
    pub fn with_usage(mut self, prompt_tokens: u64, completion_tokens: u64) -> Self {
        self.prompt_tokens = prompt_tokens;
        self.completion_tokens = completion_tokens;
        self.total_tokens = prompt_tokens.saturating_add(completion_tokens);
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn with_status(mut self, status: CallStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_sequence(mut self, sequence: usize) -> Self {
        self.sequence = sequence;
        self
    }

    /// Team that issued the call (`metadata.team`).
    pub fn team(&self) -> Option<&str> {
        self.metadata.get("team").and_then(|v| v.as_str())
    }
}

/// All calls sharing one trace identifier, in timeline order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trace {
    pub trace_id: String,
    pub calls: Vec<Call>,
}

impl Trace {
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.calls.first().map(|c| c.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.calls.last().map(|c| c.timestamp)
    }

    /// Distinct models in first-seen order.
    pub fn models(&self) -> Vec<&str> {
        let mut models: Vec<&str> = Vec::new();
        for call in &self.calls {
            if !models.contains(&call.model.as_str()) {
                models.push(&call.model);
            }
        }
        models
    }

    pub fn total_tokens(&self) -> u64 {
        self.calls
            .iter()
            .fold(0, |acc, c| acc.saturating_add(c.total_tokens))
    }
}

/// The detectors, listed in evaluation order.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    RetryLoop,
    FallbackStorm,
    FallbackFailure,
    OverkillModel,
}

impl DetectorKind {
    /// Every detector in evaluation order.
    pub const ALL: [DetectorKind; 4] = [
        DetectorKind::RetryLoop,
        DetectorKind::FallbackStorm,
        DetectorKind::FallbackFailure,
        DetectorKind::OverkillModel,
    ];

    /// Report priority, 1 being the most fundamental problem.
    pub fn priority(&self) -> u8 {
        match self {
            DetectorKind::RetryLoop => 1,
            DetectorKind::FallbackStorm => 2,
            DetectorKind::FallbackFailure => 3,
            DetectorKind::OverkillModel => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::RetryLoop => "retry_loop",
            DetectorKind::FallbackStorm => "fallback_storm",
            DetectorKind::FallbackFailure => "fallback_failure",
            DetectorKind::OverkillModel => "overkill_model",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DetectorKind::RetryLoop => "Retry Loop",
            DetectorKind::FallbackStorm => "Fallback Storm",
            DetectorKind::FallbackFailure => "Fallback Failure",
            DetectorKind::OverkillModel => "Overkill Model",
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_parsing() {
        assert_eq!(CallStatus::parse("OK"), CallStatus::Success);
        assert_eq!(CallStatus::parse(" failed "), CallStatus::Failure);
        assert_eq!(CallStatus::parse("timeout"), CallStatus::Failure);
        assert_eq!(CallStatus::parse("pending"), CallStatus::Unknown);
    }

    #[test]
    fn test_call_builder_totals() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let call = Call::new("t1", ts, "gpt-4", "hi")
            .with_usage(12, 30)
            .with_metadata("team", serde_json::json!("search"));

        assert_eq!(call.total_tokens, 42);
        assert_eq!(call.team(), Some("search"));
    }

    #[test]
    fn test_trace_models_first_seen_order() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let trace = Trace {
            trace_id: "t1".into(),
            calls: vec![
                Call::new("t1", ts, "gpt-3.5-turbo", "a"),
                Call::new("t1", ts, "gpt-4", "a"),
                Call::new("t1", ts, "gpt-3.5-turbo", "a"),
            ],
        };
        assert_eq!(trace.models(), vec!["gpt-3.5-turbo", "gpt-4"]);
    }

    #[test]
    fn test_detector_order_matches_priority() {
        let mut sorted = DetectorKind::ALL.to_vec();
        sorted.sort_by_key(|k| k.priority());
        assert_eq!(sorted, DetectorKind::ALL.to_vec());
        assert_eq!(DetectorKind::FallbackStorm.to_string(), "fallback_storm");
    }
}
