//! The report produced by a run.

use serde::{Deserialize, Serialize};

use crashlens_core::{Diagnostic, DiagnosticKind, DetectorKind};

use crate::issue::Issue;

/// Label used when a call has no route or team.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Batch-wide totals. Waste figures cover active issues only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReportSummary {
    pub total_calls: usize,
    pub traces_analyzed: usize,
    pub total_spend: f64,
    pub total_tokens: u64,
    pub total_waste: f64,
    pub total_waste_tokens: u64,
    pub issue_count: usize,
    pub suppressed_count: usize,
    pub affected_traces: usize,
    /// Span of the batch in days; at least one for projection purposes.
    pub batch_days: f64,
    pub monthly_projection: f64,
    pub skipped_records: usize,
    pub ignored_records: usize,
    /// Some spend or waste figure relies on fallback pricing.
    pub estimated: bool,
}

impl ReportSummary {
    /// Share of spend that is waste, in percent.
    pub fn waste_percentage(&self) -> f64 {
        if self.total_spend > 0.0 {
            self.total_waste / self.total_spend * 100.0
        } else {
            0.0
        }
    }
}

/// Totals for one detector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectorSummary {
    pub detector: DetectorKind,
    pub issue_count: usize,
    pub affected_traces: usize,
    pub waste_cost: f64,
    pub waste_tokens: u64,
    pub suppressed_count: usize,
}

impl DetectorSummary {
    pub fn new(detector: DetectorKind) -> Self {
        Self {
            detector,
            issue_count: 0,
            affected_traces: 0,
            waste_cost: 0.0,
            waste_tokens: 0,
            suppressed_count: 0,
        }
    }
}

/// Spend attributed to one model, route or team.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostBreakdown {
    pub key: String,
    pub calls: usize,
    pub tokens: u64,
    pub cost: f64,
    /// Share of total spend, in percent.
    pub share: f64,
}

/// Spend of one trace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceCost {
    pub trace_id: String,
    pub calls: usize,
    pub cost: f64,
    pub models: Vec<String>,
}

/// Everything a reporter needs.
///
/// `issues` holds every issue that passed the report-cost filter, suppressed
/// ones included, sorted by detector priority then cost.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub summary: ReportSummary,
    pub detectors: Vec<DetectorSummary>,
    pub issues: Vec<Issue>,
    pub models: Vec<CostBreakdown>,
    pub routes: Vec<CostBreakdown>,
    pub teams: Vec<CostBreakdown>,
    pub top_traces: Vec<TraceCost>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Report {
    pub fn active_issues(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| !i.suppressed)
    }

    pub fn suppressed_issues(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.suppressed)
    }

    /// Issues to show, optionally including suppressed ones.
    pub fn visible_issues(&self, include_suppressed: bool) -> Vec<&Issue> {
        self.issues
            .iter()
            .filter(|i| include_suppressed || !i.suppressed)
            .collect()
    }

    pub fn has_waste(&self) -> bool {
        self.summary.issue_count > 0
    }

    pub fn detector(&self, kind: DetectorKind) -> Option<&DetectorSummary> {
        self.detectors.iter().find(|d| d.detector == kind)
    }

    pub fn diagnostics_of(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }

    /// Serialize as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
