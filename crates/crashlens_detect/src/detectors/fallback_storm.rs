//! Chaotic switching between models inside a short window.

use std::collections::BTreeSet;

use crashlens_core::{resolve_cost, Call, CrashlensConfig, DetectorKind, Trace};

use super::{token_sum, total_cost};
use crate::detector::Detector;
use crate::error::DetectResult;
use crate::issue::Issue;

/// Finds windows with many calls across several models.
///
/// Windows start at each call and extend to the last call within
/// `max_trace_window_minutes`. The earliest qualifying window is reported
/// and scanning resumes after its last call, so overlapping windows collapse
/// into one issue.
#[derive(Debug, Default)]
pub struct FallbackStormDetector;

impl FallbackStormDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Detector for FallbackStormDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::FallbackStorm
    }

    fn detect(&self, trace: &Trace, config: &CrashlensConfig) -> DetectResult<Vec<Issue>> {
        let thresholds = &config.thresholds.fallback_storm;
        let window = thresholds.window();
        let calls = &trace.calls;
        let mut issues = Vec::new();
        let mut start = 0;

        while start < calls.len() {
            let mut end = start + 1;
            while end < calls.len() && calls[end].timestamp - calls[start].timestamp <= window {
                end += 1;
            }

            let slice: Vec<&Call> = calls[start..end].iter().collect();
            let models: BTreeSet<&str> = slice.iter().map(|c| c.model.as_str()).collect();
            if slice.len() < thresholds.min_calls || models.len() < thresholds.min_distinct_models
            {
                start += 1;
                continue;
            }

            // Keep the cheapest successful call; everything else is waste.
            let keep = slice
                .iter()
                .enumerate()
                .filter(|(_, c)| !c.status.is_failure())
                .map(|(i, c)| (i, resolve_cost(c, &config.pricing).amount))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(i, _)| i);

            let wasted: Vec<&Call> = slice
                .iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != keep)
                .map(|(_, c)| *c)
                .collect();
            let waste = total_cost(wasted.iter().copied(), &config.pricing);
            let tokens = token_sum(wasted.iter().copied());

            issues.push(
                Issue::new(
                    DetectorKind::FallbackStorm,
                    &trace.trace_id,
                    format!(
                        "Fallback storm: {} calls across {} models",
                        slice.len(),
                        models.len()
                    ),
                )
                .with_calls(&slice)
                .with_cost(waste.amount, &config.options)
                .with_tokens(tokens)
                .with_estimated(waste.estimated),
            );
            start = end;
        }

        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::fixtures::{at, config, trace};
    use crashlens_core::CallStatus;

    #[test]
    fn test_storm_detected() {
        let calls = vec![
            at(0, "gpt-3.5-turbo", "q").with_status(CallStatus::Failure),
            at(20, "gpt-4", "q").with_status(CallStatus::Failure),
            at(40, "claude-3-haiku", "q"),
        ];
        let issues = FallbackStormDetector::new().detect(&trace(calls), &config()).unwrap();

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].call_count, 3);
        assert_eq!(issues[0].models.len(), 3);
        // claude-3-haiku is the only success and is kept
        assert_eq!(issues[0].waste_tokens, 300);
    }

    #[test]
    fn test_single_model_is_not_a_storm() {
        let calls = (0..5).map(|i| at(i * 10, "gpt-4", "q")).collect();
        let issues = FallbackStormDetector::new().detect(&trace(calls), &config()).unwrap();
        assert!(issues.is_empty());
    }

    #[test]
    fn test_calls_outside_window() {
        let calls = vec![
            at(0, "gpt-3.5-turbo", "q"),
            at(120, "gpt-4", "q"),
            at(400, "claude-3-haiku", "q"),
        ];
        let issues = FallbackStormDetector::new().detect(&trace(calls), &config()).unwrap();
        assert!(issues.is_empty());
    }

    #[test]
    fn test_overlapping_windows_collapse() {
        let calls = vec![
            at(0, "gpt-3.5-turbo", "q"),
            at(30, "gpt-4", "q"),
            at(60, "gpt-3.5-turbo", "q"),
            at(90, "gpt-4", "q"),
            at(150, "gpt-3.5-turbo", "q"),
        ];
        let issues = FallbackStormDetector::new().detect(&trace(calls), &config()).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].call_count, 5);
    }

    #[test]
    fn test_scan_resumes_after_reported_window() {
        let calls = vec![
            at(0, "gpt-3.5-turbo", "q"),
            at(20, "gpt-4", "q"),
            at(40, "claude-3-haiku", "q"),
            at(600, "gpt-3.5-turbo", "q"),
            at(620, "gpt-4", "q"),
            at(640, "claude-3-haiku", "q"),
        ];
        let issues = FallbackStormDetector::new().detect(&trace(calls), &config()).unwrap();

        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.call_count == 3));
        assert!(issues.iter().all(|i| i.span_seconds == 40.0));
    }

    #[test]
    fn test_no_success_means_whole_window_is_waste() {
        let calls = vec![
            at(0, "gpt-3.5-turbo", "q").with_status(CallStatus::Failure),
            at(10, "gpt-4", "q").with_status(CallStatus::Failure),
            at(20, "gpt-3.5-turbo", "q").with_status(CallStatus::Failure),
        ];
        let issues = FallbackStormDetector::new().detect(&trace(calls), &config()).unwrap();
        assert_eq!(issues[0].waste_tokens, 450);
    }
}
