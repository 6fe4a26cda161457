//! Cross-detector suppression.
//!
//! Precedence is a small declared graph: a retry loop on a trace can silence
//! the other detectors' findings on that same trace. Whether an edge is live
//! depends on the target detector's `suppress_if_retry_loop` rule.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crashlens_core::{DetectorKind, SuppressionRules};

use crate::issue::Issue;

/// `suppressor` silences `target` on a shared trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuppressionEdge {
    pub suppressor: DetectorKind,
    pub target: DetectorKind,
}

/// Every suppression relation, in precedence order.
pub const SUPPRESSION_EDGES: [SuppressionEdge; 3] = [
    SuppressionEdge {
        suppressor: DetectorKind::RetryLoop,
        target: DetectorKind::FallbackStorm,
    },
    SuppressionEdge {
        suppressor: DetectorKind::RetryLoop,
        target: DetectorKind::FallbackFailure,
    },
    SuppressionEdge {
        suppressor: DetectorKind::RetryLoop,
        target: DetectorKind::OverkillModel,
    },
];

/// Applies suppression rules to a batch of issues.
#[derive(Debug, Clone)]
pub struct SuppressionEngine {
    rules: SuppressionRules,
}

impl SuppressionEngine {
    pub fn new(rules: SuppressionRules) -> Self {
        Self { rules }
    }

    /// Whether an edge is switched on by the rules.
    pub fn is_active(&self, edge: &SuppressionEdge) -> bool {
        edge.suppressor != edge.target
            && match edge.suppressor {
                DetectorKind::RetryLoop => self.rules.rule(edge.target).suppress_if_retry_loop,
                _ => false,
            }
    }

    /// The detector that silences `target` on a trace where `fired` detectors
    /// produced issues, if any.
    pub fn suppressor_for(
        &self,
        target: DetectorKind,
        fired: &BTreeSet<DetectorKind>,
    ) -> Option<DetectorKind> {
        SUPPRESSION_EDGES
            .iter()
            .filter(|edge| edge.target == target && fired.contains(&edge.suppressor))
            .find(|edge| self.is_active(edge))
            .map(|edge| edge.suppressor)
    }

    /// Produce the suppressed view of `issues`. The input is left untouched
    /// and the output keeps its order and length.
    pub fn apply(&self, issues: &[Issue]) -> Vec<Issue> {
        let mut fired: BTreeMap<&str, BTreeSet<DetectorKind>> = BTreeMap::new();
        for issue in issues.iter().filter(|i| !i.suppressed) {
            fired
                .entry(issue.trace_id.as_str())
                .or_default()
                .insert(issue.detector);
        }

        issues
            .iter()
            .map(|issue| {
                let suppressor = fired
                    .get(issue.trace_id.as_str())
                    .and_then(|kinds| self.suppressor_for(issue.detector, kinds));
                match suppressor {
                    Some(by) if !issue.suppressed => {
                        debug!(
                            "Suppressing {} on trace {} (by {})",
                            issue.detector, issue.trace_id, by
                        );
                        issue.suppressed_by(by)
                    }
                    _ => issue.clone(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(kind: DetectorKind, trace: &str) -> Issue {
        Issue::new(kind, trace, "p")
    }

    #[test]
    fn test_retry_loop_suppresses_same_trace_only() {
        let engine = SuppressionEngine::new(SuppressionRules::default());
        let issues = vec![
            issue(DetectorKind::RetryLoop, "a"),
            issue(DetectorKind::FallbackStorm, "a"),
            issue(DetectorKind::OverkillModel, "b"),
        ];

        let view = engine.apply(&issues);
        assert!(!view[0].suppressed);
        assert!(view[1].suppressed);
        assert_eq!(view[1].suppressed_by, Some(DetectorKind::RetryLoop));
        assert!(!view[2].suppressed);
        assert!(issues.iter().all(|i| !i.suppressed));
    }

    #[test]
    fn test_rule_off_keeps_issue_active() {
        let mut rules = SuppressionRules::default();
        rules.fallback_failure.suppress_if_retry_loop = false;
        let engine = SuppressionEngine::new(rules);

        let view = engine.apply(&[
            issue(DetectorKind::RetryLoop, "a"),
            issue(DetectorKind::FallbackFailure, "a"),
        ]);
        assert!(!view[1].suppressed);
    }

    #[test]
    fn test_detector_never_suppresses_itself() {
        let mut rules = SuppressionRules::default();
        rules.retry_loop.suppress_if_retry_loop = true;
        let engine = SuppressionEngine::new(rules);

        let view = engine.apply(&[
            issue(DetectorKind::RetryLoop, "a"),
            issue(DetectorKind::RetryLoop, "a"),
        ]);
        assert!(view.iter().all(|i| !i.suppressed));
    }

    #[test]
    fn test_edges_are_declared() {
        let engine = SuppressionEngine::new(SuppressionRules::default());
        assert!(SUPPRESSION_EDGES.iter().all(|e| engine.is_active(e)));
        assert!(SUPPRESSION_EDGES
            .iter()
            .all(|e| e.suppressor == DetectorKind::RetryLoop));
    }
}
