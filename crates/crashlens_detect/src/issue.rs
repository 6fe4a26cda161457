//! Detected waste patterns.

use std::fmt;

use serde::{Deserialize, Serialize};

use crashlens_core::{Call, DetectorKind, GlobalOptions};

/// Length of the prompt excerpt kept on an issue.
pub const SAMPLE_PROMPT_CHARS: usize = 100;

/// Severity of an issue, derived from its waste cost.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn from_cost(cost: f64, options: &GlobalOptions) -> Self {
        if cost >= options.high_severity_cost {
            Severity::High
        } else if cost >= options.medium_severity_cost {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// One occurrence of a waste pattern on a trace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub detector: DetectorKind,
    pub trace_id: String,
    pub problem: String,
    pub estimated_cost: f64,
    pub waste_tokens: u64,
    pub severity: Severity,
    pub suppressed: bool,
    pub suppressed_by: Option<DetectorKind>,
    /// Some contributing cost came from fallback pricing.
    pub estimated: bool,
    pub call_count: usize,
    pub models: Vec<String>,
    pub sample_prompt: String,
    pub span_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_keyword: Option<String>,
}

impl Issue {
    /// Create an issue with no waste attached yet.
    pub fn new(
        detector: DetectorKind,
        trace_id: impl Into<String>,
        problem: impl Into<String>,
    ) -> Self {
        Self {
            detector,
            trace_id: trace_id.into(),
            problem: problem.into(),
            estimated_cost: 0.0,
            waste_tokens: 0,
            severity: Severity::Low,
            suppressed: false,
            suppressed_by: None,
            estimated: false,
            call_count: 0,
            models: Vec::new(),
            sample_prompt: String::new(),
            span_seconds: 0.0,
            suggested_model: None,
            matched_keyword: None,
        }
    }

    /// Record the calls involved: count, models, prompt excerpt and time span.
    pub fn with_calls(mut self, calls: &[&Call]) -> Self {
        self.call_count = calls.len();
        self.models.clear();
        for call in calls {
            if !self.models.contains(&call.model) {
                self.models.push(call.model.clone());
            }
        }
        if let Some(first) = calls.first() {
            self.sample_prompt = truncate(&first.prompt, SAMPLE_PROMPT_CHARS);
        }
        if let (Some(first), Some(last)) = (calls.first(), calls.last()) {
            self.span_seconds =
                (last.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0;
        }
        self
    }

    /// Attach the waste cost and derive severity from it.
    pub fn with_cost(mut self, cost: f64, options: &GlobalOptions) -> Self {
        self.estimated_cost = cost.max(0.0);
        self.severity = Severity::from_cost(self.estimated_cost, options);
        self
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.waste_tokens = tokens;
        self
    }

    pub fn with_estimated(mut self, estimated: bool) -> Self {
        self.estimated = estimated;
        self
    }

    pub fn with_suggested_model(mut self, model: impl Into<String>) -> Self {
        self.suggested_model = Some(model.into());
        self
    }

    pub fn with_matched_keyword(mut self, keyword: Option<String>) -> Self {
        self.matched_keyword = keyword;
        self
    }

    /// A suppressed copy of this issue.
    pub fn suppressed_by(&self, detector: DetectorKind) -> Issue {
        Issue {
            suppressed: true,
            suppressed_by: Some(detector),
            ..self.clone()
        }
    }

    /// Ordering used in reports: detector priority, then cost descending.
    pub fn report_order(a: &Issue, b: &Issue) -> std::cmp::Ordering {
        a.detector
            .priority()
            .cmp(&b.detector.priority())
            .then(b.estimated_cost.total_cmp(&a.estimated_cost))
            .then_with(|| a.trace_id.cmp(&b.trace_id))
            .then_with(|| a.problem.cmp(&b.problem))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_severity_cutoffs() {
        let options = GlobalOptions::default();
        assert_eq!(Severity::from_cost(0.5, &options), Severity::High);
        assert_eq!(Severity::from_cost(0.10, &options), Severity::High);
        assert_eq!(Severity::from_cost(0.02, &options), Severity::Medium);
        assert_eq!(Severity::from_cost(0.001, &options), Severity::Low);
    }

    #[test]
    fn test_with_calls() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let long_prompt = "é".repeat(150);
        let a = Call::new("t", t0, "gpt-3.5-turbo", long_prompt.as_str());
        let b = Call::new("t", t0 + Duration::seconds(90), "gpt-4", "x");
        let c = Call::new("t", t0 + Duration::seconds(95), "gpt-3.5-turbo", "y");

        let issue = Issue::new(DetectorKind::FallbackStorm, "t", "storm").with_calls(&[&a, &b, &c]);
        assert_eq!(issue.call_count, 3);
        assert_eq!(issue.models, vec!["gpt-3.5-turbo", "gpt-4"]);
        assert_eq!(issue.span_seconds, 95.0);
        assert_eq!(issue.sample_prompt.chars().count(), SAMPLE_PROMPT_CHARS + 3);
    }

    #[test]
    fn test_suppressed_copy_leaves_original() {
        let issue = Issue::new(DetectorKind::OverkillModel, "t", "overkill");
        let suppressed = issue.suppressed_by(DetectorKind::RetryLoop);
        assert!(!issue.suppressed);
        assert!(suppressed.suppressed);
        assert_eq!(suppressed.suppressed_by, Some(DetectorKind::RetryLoop));
    }

    #[test]
    fn test_report_order() {
        let options = GlobalOptions::default();
        let mut issues = vec![
            Issue::new(DetectorKind::OverkillModel, "a", "x").with_cost(5.0, &options),
            Issue::new(DetectorKind::RetryLoop, "b", "x").with_cost(0.1, &options),
            Issue::new(DetectorKind::RetryLoop, "a", "x").with_cost(0.3, &options),
        ];
        issues.sort_by(Issue::report_order);
        let order: Vec<(DetectorKind, &str)> = issues
            .iter()
            .map(|i| (i.detector, i.trace_id.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (DetectorKind::RetryLoop, "a"),
                (DetectorKind::RetryLoop, "b"),
                (DetectorKind::OverkillModel, "a"),
            ]
        );
    }
}
