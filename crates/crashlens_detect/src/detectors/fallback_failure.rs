//! Escalation to a pricier model after a cheap call failed.

use crashlens_core::{
    resolve_cost, Call, CallStatus, CrashlensConfig, DetectorKind, FallbackWastePolicy, Trace,
};

use crate::detector::Detector;
use crate::error::DetectResult;
use crate::issue::Issue;

/// Pairs each failed call with the first later success on a more expensive
/// model within `time_window_seconds`.
///
/// Each call takes part in at most one pair.
#[derive(Debug, Default)]
pub struct FallbackFailureDetector;

impl FallbackFailureDetector {
    pub fn new() -> Self {
        Self
    }

    fn waste(failed: &Call, escalated: &Call, config: &CrashlensConfig) -> (f64, bool) {
        let actual = resolve_cost(escalated, &config.pricing);
        match config.thresholds.fallback_failure.waste_policy {
            FallbackWastePolicy::FullCost => (actual.amount, actual.is_estimated()),
            FallbackWastePolicy::CostDelta => {
                let on_failed_model = config
                    .pricing
                    .lookup(&failed.model)
                    .unwrap_or(&config.pricing.fallback);
                let baseline =
                    on_failed_model.calculate(escalated.prompt_tokens, escalated.completion_tokens);
                let estimated = actual.is_estimated() || !config.pricing.contains(&failed.model);
                ((actual.amount - baseline).max(0.0), estimated)
            }
        }
    }
}

impl Detector for FallbackFailureDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::FallbackFailure
    }

    fn detect(&self, trace: &Trace, config: &CrashlensConfig) -> DetectResult<Vec<Issue>> {
        let window = config.thresholds.fallback_failure.window();
        let pricing = &config.pricing;
        let calls = &trace.calls;
        let mut used = vec![false; calls.len()];
        let mut issues = Vec::new();

        for (i, failed) in calls.iter().enumerate() {
            if used[i] || !failed.status.is_failure() {
                continue;
            }
            let failed_rate = pricing.rate_for(&failed.model);

            let partner = (i + 1..calls.len()).find(|&j| {
                let candidate = &calls[j];
                !used[j]
                    && candidate.status == CallStatus::Success
                    && candidate.timestamp - failed.timestamp <= window
                    && pricing.rate_for(&candidate.model) > failed_rate
            });

            let Some(j) = partner else { continue };
            used[i] = true;
            used[j] = true;

            let escalated = &calls[j];
            let (cost, estimated) = Self::waste(failed, escalated, config);

            issues.push(
                Issue::new(
                    DetectorKind::FallbackFailure,
                    &trace.trace_id,
                    format!(
                        "Fallback after failure: {} failed, retried on {}",
                        failed.model, escalated.model
                    ),
                )
                .with_calls(&[failed, escalated])
                .with_cost(cost, &config.options)
                .with_tokens(escalated.total_tokens)
                .with_estimated(estimated),
            );
        }

        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::fixtures::{at, config, trace};

    fn failed(seconds: i64, model: &str) -> Call {
        at(seconds, model, "q").with_status(CallStatus::Failure)
    }

    #[test]
    fn test_escalation_within_window() {
        let config = config();
        let t = trace(vec![failed(0, "gpt-3.5-turbo"), at(120, "gpt-4", "q")]);
        let issues = FallbackFailureDetector::new().detect(&t, &config).unwrap();

        assert_eq!(issues.len(), 1);
        let expected = resolve_cost(&t.calls[1], &config.pricing).amount;
        assert_eq!(issues[0].estimated_cost, expected);
        assert_eq!(issues[0].span_seconds, 120.0);
    }

    #[test]
    fn test_escalation_outside_window() {
        let t = trace(vec![failed(0, "gpt-3.5-turbo"), at(400, "gpt-4", "q")]);
        let issues = FallbackFailureDetector::new().detect(&t, &config()).unwrap();
        assert!(issues.is_empty());
    }

    #[test]
    fn test_cheaper_or_failed_followup_is_ignored() {
        let t = trace(vec![
            failed(0, "gpt-4"),
            at(10, "gpt-3.5-turbo", "q"),
            failed(20, "gpt-3.5-turbo"),
            failed(30, "gpt-4"),
            at(40, "gpt-3.5-turbo", "q").with_status(CallStatus::Unknown),
        ]);
        let issues = FallbackFailureDetector::new().detect(&t, &config()).unwrap();
        assert!(issues.is_empty());
    }

    #[test]
    fn test_success_pairs_only_once() {
        let t = trace(vec![
            failed(0, "gpt-3.5-turbo"),
            failed(10, "gpt-3.5-turbo"),
            at(20, "gpt-4", "q"),
        ]);
        let issues = FallbackFailureDetector::new().detect(&t, &config()).unwrap();
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_cost_delta_policy() {
        let mut config = config();
        config.thresholds.fallback_failure.waste_policy = FallbackWastePolicy::CostDelta;
        let t = trace(vec![failed(0, "gpt-3.5-turbo"), at(60, "gpt-4", "q")]);

        let issues = FallbackFailureDetector::new().detect(&t, &config).unwrap();
        // gpt-4: 100*30 + 50*60, gpt-3.5-turbo: 100*0.5 + 50*1.5 (per million)
        let expected = (6000.0 - 125.0) / 1_000_000.0;
        assert!((issues[0].estimated_cost - expected).abs() < 1e-12);
    }
}
