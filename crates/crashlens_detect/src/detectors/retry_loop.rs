//! Repeated identical calls in quick succession.

use tracing::debug;

use crashlens_core::{Call, CrashlensConfig, DetectorKind, Trace};

use super::{token_sum, total_cost};
use crate::detector::Detector;
use crate::error::DetectResult;
use crate::issue::Issue;

/// Finds runs of consecutive calls with the same model and prompt.
///
/// A run qualifies when it holds the original call plus at least
/// `max_retries` repeats, no gap between attempts exceeds
/// `max_retry_interval_minutes` and the whole run fits in
/// `time_window_minutes`. Every call after the first is waste.
#[derive(Debug, Default)]
pub struct RetryLoopDetector;

impl RetryLoopDetector {
    pub fn new() -> Self {
        Self
    }

    /// Maximal runs of consecutive repeats, as index ranges into the trace.
    fn runs(trace: &Trace, config: &CrashlensConfig) -> Vec<std::ops::Range<usize>> {
        let max_gap = config.thresholds.retry_loop.max_retry_interval();
        let calls = &trace.calls;
        let mut runs = Vec::new();
        let mut start = 0;

        while start < calls.len() {
            let mut end = start + 1;
            if !calls[start].prompt.is_empty() {
                while end < calls.len() && continues(&calls[end - 1], &calls[end], max_gap) {
                    end += 1;
                }
            }
            runs.push(start..end);
            start = end;
        }
        runs
    }
}

fn continues(prev: &Call, next: &Call, max_gap: chrono::Duration) -> bool {
    next.model == prev.model
        && next.prompt == prev.prompt
        && next.timestamp - prev.timestamp <= max_gap
}

impl Detector for RetryLoopDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::RetryLoop
    }

    fn detect(&self, trace: &Trace, config: &CrashlensConfig) -> DetectResult<Vec<Issue>> {
        let thresholds = &config.thresholds.retry_loop;
        let window = thresholds.time_window();
        let mut issues = Vec::new();

        for run in Self::runs(trace, config) {
            let calls: Vec<&Call> = trace.calls[run].iter().collect();
            if calls.len() < thresholds.min_run_length() {
                continue;
            }
            let (first, last) = (calls[0], calls[calls.len() - 1]);
            if last.timestamp - first.timestamp > window {
                debug!(
                    "Run of {} calls on trace {} exceeds the retry window",
                    calls.len(),
                    trace.trace_id
                );
                continue;
            }

            let repeats = &calls[1..];
            let waste = total_cost(repeats.iter().copied(), &config.pricing);
            let tokens = token_sum(repeats.iter().copied());

            issues.push(
                Issue::new(
                    DetectorKind::RetryLoop,
                    &trace.trace_id,
                    format!(
                        "Retry loop: {} identical calls to {} ({} retries)",
                        calls.len(),
                        first.model,
                        repeats.len()
                    ),
                )
                .with_calls(&calls)
                .with_cost(waste.amount, &config.options)
                .with_tokens(tokens)
                .with_estimated(waste.estimated),
            );
        }

        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::fixtures::{at, config, trace};

    #[test]
    fn test_five_calls_one_minute_apart() {
        let calls = (0..5).map(|i| at(i * 60, "gpt-4", "What is 2+2?")).collect();
        let issues = RetryLoopDetector::new().detect(&trace(calls), &config()).unwrap();

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].waste_tokens, 4 * 150);
        assert_eq!(issues[0].call_count, 5);
        // 4 repeats of 100 in / 50 out on gpt-4
        let expected = 4.0 * (100.0 * 30.0 + 50.0 * 60.0) / 1_000_000.0;
        assert!((issues[0].estimated_cost - expected).abs() < 1e-12);
    }

    #[test]
    fn test_too_few_repeats() {
        let calls = (0..3).map(|i| at(i * 30, "gpt-4", "same")).collect();
        let issues = RetryLoopDetector::new().detect(&trace(calls), &config()).unwrap();
        assert!(issues.is_empty());
    }

    #[test]
    fn test_gap_breaks_run() {
        let calls = vec![
            at(0, "gpt-4", "same"),
            at(60, "gpt-4", "same"),
            at(300, "gpt-4", "same"),
            at(330, "gpt-4", "same"),
        ];
        let issues = RetryLoopDetector::new().detect(&trace(calls), &config()).unwrap();
        assert!(issues.is_empty());
    }

    #[test]
    fn test_gap_equal_to_interval_continues_run() {
        let mut config = config();
        config.thresholds.retry_loop.time_window_minutes = 10.0;

        let calls = (0..4).map(|i| at(i * 120, "gpt-4", "same")).collect();
        let issues = RetryLoopDetector::new().detect(&trace(calls), &config).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].call_count, 4);

        let calls = (0..4).map(|i| at(i * 121, "gpt-4", "same")).collect();
        let issues = RetryLoopDetector::new().detect(&trace(calls), &config).unwrap();
        assert!(issues.is_empty());
    }

    #[test]
    fn test_run_longer_than_window() {
        // 7 calls 100s apart: gaps are fine but the span is 10 minutes.
        let calls = (0..7).map(|i| at(i * 100, "gpt-4", "same")).collect();
        let issues = RetryLoopDetector::new().detect(&trace(calls), &config()).unwrap();
        assert!(issues.is_empty());
    }

    #[test]
    fn test_model_change_and_empty_prompts() {
        let calls = vec![
            at(0, "gpt-4", "same"),
            at(10, "gpt-4", "same"),
            at(20, "gpt-3.5-turbo", "same"),
            at(30, "gpt-4", "same"),
            at(40, "gpt-4", ""),
            at(50, "gpt-4", ""),
            at(60, "gpt-4", ""),
            at(70, "gpt-4", ""),
        ];
        let issues = RetryLoopDetector::new().detect(&trace(calls), &config()).unwrap();
        assert!(issues.is_empty());
    }

    #[test]
    fn test_two_separate_loops() {
        let mut calls: Vec<_> = (0..4).map(|i| at(i * 10, "gpt-4", "first")).collect();
        calls.extend((0..4).map(|i| at(100 + i * 10, "gpt-4", "second")));

        let issues = RetryLoopDetector::new().detect(&trace(calls), &config()).unwrap();
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.trace_id == "trace_1"));
    }
}
