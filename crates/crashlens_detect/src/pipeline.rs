//! End-to-end analysis: records in, report out.

use std::io::BufRead;

use tracing::{debug, info, warn};

use crashlens_core::{
    Call, CrashlensConfig, Diagnostic, ParseOutcome, RecordParser, Trace, TraceGrouper,
};

use crate::aggregate::WasteAggregator;
use crate::detector::DetectorRegistry;
use crate::error::DetectResult;
use crate::issue::Issue;
use crate::report::Report;
use crate::suppression::SuppressionEngine;

/// Runs the detectors over a batch and aggregates the result.
///
/// The configuration is fixed at construction. A failing detector only
/// loses its own findings for the trace it failed on.
#[derive(Debug)]
pub struct WasteAnalyzer {
    config: CrashlensConfig,
    registry: DetectorRegistry,
    suppression: SuppressionEngine,
    aggregator: WasteAggregator,
}

impl WasteAnalyzer {
    /// Validate `config` and build the standard detector pipeline.
    pub fn new(config: CrashlensConfig) -> DetectResult<Self> {
        config.validate()?;
        let registry = DetectorRegistry::from_config(&config)?;
        Ok(Self {
            suppression: SuppressionEngine::new(config.suppression_rules.clone()),
            aggregator: WasteAggregator::new(&config),
            registry,
            config,
        })
    }

    /// Replace the detector pipeline.
    pub fn with_registry(mut self, registry: DetectorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &CrashlensConfig {
        &self.config
    }

    pub fn registry(&self) -> &DetectorRegistry {
        &self.registry
    }

    /// Analyze JSONL text.
    pub fn analyze_str(&self, text: &str) -> Report {
        self.analyze_outcome(RecordParser::parse_str(text))
    }

    /// Analyze raw JSONL bytes; lines that are not UTF-8 become diagnostics.
    pub fn analyze_bytes(&self, bytes: &[u8]) -> Report {
        self.analyze_outcome(RecordParser::parse_bytes(bytes))
    }

    /// Analyze JSONL from a reader. Fails only on I/O errors.
    pub fn analyze_reader<R: BufRead>(&self, reader: R) -> DetectResult<Report> {
        let outcome = RecordParser::parse_reader(reader)?;
        Ok(self.analyze_outcome(outcome))
    }

    /// Analyze already-normalized calls.
    pub fn analyze_calls(&self, calls: Vec<Call>) -> Report {
        self.analyze_outcome(ParseOutcome {
            calls,
            ..ParseOutcome::default()
        })
    }

    /// Analyze a parsed batch, keeping its diagnostics.
    pub fn analyze_outcome(&self, outcome: ParseOutcome) -> Report {
        let ParseOutcome {
            calls,
            mut diagnostics,
            ignored,
            ..
        } = outcome;

        for (model, count) in self.config.pricing.unpriced_models(&calls) {
            warn!("No pricing for model {}; estimating {} calls", model, count);
            diagnostics.push(Diagnostic::estimation_warning(format!(
                "No pricing for model '{}'; cost of {} calls estimated with fallback rates",
                model, count
            )));
        }

        let traces = TraceGrouper::group(calls);
        let mut issues = Vec::new();
        for trace in &traces {
            issues.extend(self.detect_trace(trace, &mut diagnostics));
        }
        info!(
            "Detectors produced {} raw issues over {} traces",
            issues.len(),
            traces.len()
        );

        let issues = self.suppression.apply(&issues);
        self.aggregator.aggregate(&traces, issues, diagnostics, ignored)
    }

    /// Run every detector on one trace, isolating failures.
    pub fn detect_trace(&self, trace: &Trace, diagnostics: &mut Vec<Diagnostic>) -> Vec<Issue> {
        let mut found = Vec::new();
        for detector in self.registry.detectors() {
            let kind = detector.kind();
            match detector.detect(trace, &self.config) {
                Ok(issues) => {
                    for issue in issues {
                        if issue.trace_id != trace.trace_id {
                            warn!(
                                "Detector {} reported trace {} while scanning {}",
                                kind, issue.trace_id, trace.trace_id
                            );
                            diagnostics.push(Diagnostic::detector_failure(
                                kind,
                                &trace.trace_id,
                                format!("issue references foreign trace '{}'", issue.trace_id),
                            ));
                            continue;
                        }
                        found.push(issue);
                    }
                }
                Err(e) => {
                    warn!("Detector {} failed on trace {}: {}", kind, trace.trace_id, e);
                    diagnostics.push(Diagnostic::detector_failure(
                        kind,
                        &trace.trace_id,
                        e.to_string(),
                    ));
                }
            }
        }
        debug!("Trace {}: {} issues", trace.trace_id, found.len());
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crashlens_core::{DetectorKind, DiagnosticKind};

    use crate::detector::MockDetector;
    use crate::error::DetectError;

    const LOG: &str = r#"{"trace_id":"t1","timestamp":"2024-01-15T10:00:00Z","model":"gpt-4","prompt":"hi","usage":{"prompt_tokens":5,"completion_tokens":5}}
{"trace_id":"t2","timestamp":"2024-01-15T10:00:00Z","model":"gpt-4","prompt":"hello","usage":{"prompt_tokens":5,"completion_tokens":5}}"#;

    #[test]
    fn test_failure_is_isolated_to_one_trace() {
        let mut failing = MockDetector::new();
        failing.expect_kind().return_const(DetectorKind::FallbackStorm);
        failing.expect_detect().returning(|trace, _| {
            if trace.trace_id == "t1" {
                Err(DetectError::Internal {
                    detector: DetectorKind::FallbackStorm,
                    message: "boom".into(),
                })
            } else {
                Ok(vec![Issue::new(DetectorKind::FallbackStorm, &trace.trace_id, "ok")])
            }
        });

        let config = CrashlensConfig::builtin().unwrap();
        let registry = DetectorRegistry::from_config(&config)
            .unwrap()
            .with_detector(Arc::new(failing));
        let analyzer = WasteAnalyzer::new(config).unwrap().with_registry(registry);

        let report = analyzer.analyze_str(LOG);
        let failures: Vec<_> = report.diagnostics_of(DiagnosticKind::DetectorFailure).collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].trace_id.as_deref(), Some("t1"));

        // Overkill still ran on both traces, the mock succeeded on t2.
        assert_eq!(report.detector(DetectorKind::OverkillModel).unwrap().issue_count, 2);
        assert_eq!(report.detector(DetectorKind::FallbackStorm).unwrap().issue_count, 1);
    }

    #[test]
    fn test_foreign_trace_issue_is_dropped() {
        let mut rogue = MockDetector::new();
        rogue.expect_kind().return_const(DetectorKind::RetryLoop);
        rogue
            .expect_detect()
            .returning(|_, _| Ok(vec![Issue::new(DetectorKind::RetryLoop, "elsewhere", "x")]));

        let config = CrashlensConfig::builtin().unwrap();
        let analyzer = WasteAnalyzer::new(config)
            .unwrap()
            .with_registry(DetectorRegistry::new().with_detector(Arc::new(rogue)));

        let report = analyzer.analyze_str(LOG);
        assert!(report.issues.is_empty());
        assert_eq!(report.diagnostics_of(DiagnosticKind::DetectorFailure).count(), 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = CrashlensConfig::builtin().unwrap();
        config.thresholds.fallback_storm.min_calls = 0;
        let err = WasteAnalyzer::new(config).unwrap_err();
        assert!(err.is_fatal());
    }
}
