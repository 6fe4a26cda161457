//! Turning issues and traces into a report.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crashlens_core::{
    resolve_cost, CrashlensConfig, DetectorKind, Diagnostic, DiagnosticKind, GlobalOptions,
    PricingTable, Trace,
};

use crate::issue::Issue;
use crate::report::{CostBreakdown, DetectorSummary, Report, ReportSummary, TraceCost, UNKNOWN_LABEL};

/// Number of traces listed in the top-spend table.
pub const TOP_TRACES: usize = 5;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Default)]
struct Bucket {
    calls: usize,
    tokens: u64,
    cost: f64,
}

impl Bucket {
    fn add(&mut self, tokens: u64, cost: f64) {
        self.calls += 1;
        self.tokens = self.tokens.saturating_add(tokens);
        self.cost += cost;
    }
}

/// Filters, sums and projects waste.
#[derive(Debug, Clone)]
pub struct WasteAggregator {
    options: GlobalOptions,
    pricing: PricingTable,
}

impl WasteAggregator {
    pub fn new(config: &CrashlensConfig) -> Self {
        Self {
            options: config.options.clone(),
            pricing: config.pricing.clone(),
        }
    }

    /// Build the report.
    ///
    /// Issues cheaper than `min_report_cost` are dropped whether suppressed
    /// or not; totals count active issues only.
    pub fn aggregate(
        &self,
        traces: &[Trace],
        issues: Vec<Issue>,
        diagnostics: Vec<Diagnostic>,
        ignored_records: usize,
    ) -> Report {
        let before = issues.len();
        let mut issues: Vec<Issue> = issues
            .into_iter()
            .filter(|i| i.estimated_cost >= self.options.min_report_cost)
            .collect();
        issues.sort_by(Issue::report_order);
        if issues.len() < before {
            debug!(
                "Dropped {} issues below the minimum report cost",
                before - issues.len()
            );
        }

        let detectors = Self::detector_summaries(&issues);

        let mut summary = ReportSummary {
            traces_analyzed: traces.len(),
            ignored_records,
            skipped_records: diagnostics
                .iter()
                .filter(|d| d.kind == DiagnosticKind::InputError)
                .count(),
            ..ReportSummary::default()
        };

        let mut models: BTreeMap<String, Bucket> = BTreeMap::new();
        let mut routes: BTreeMap<String, Bucket> = BTreeMap::new();
        let mut teams: BTreeMap<String, Bucket> = BTreeMap::new();
        let mut trace_costs = Vec::with_capacity(traces.len());

        for trace in traces {
            let mut trace_cost = 0.0;
            for call in &trace.calls {
                let cost = resolve_cost(call, &self.pricing);
                summary.total_calls += 1;
                summary.total_spend += cost.amount;
                summary.total_tokens = summary.total_tokens.saturating_add(call.total_tokens);
                summary.estimated |= cost.is_estimated();
                trace_cost += cost.amount;

                models
                    .entry(call.model.clone())
                    .or_default()
                    .add(call.total_tokens, cost.amount);
                routes
                    .entry(call.route.clone().unwrap_or_else(|| UNKNOWN_LABEL.to_string()))
                    .or_default()
                    .add(call.total_tokens, cost.amount);
                teams
                    .entry(call.team().unwrap_or(UNKNOWN_LABEL).to_string())
                    .or_default()
                    .add(call.total_tokens, cost.amount);
            }
            trace_costs.push(TraceCost {
                trace_id: trace.trace_id.clone(),
                calls: trace.len(),
                cost: trace_cost,
                models: trace.models().into_iter().map(str::to_string).collect(),
            });
        }

        let active: Vec<&Issue> = issues.iter().filter(|i| !i.suppressed).collect();
        summary.issue_count = active.len();
        summary.suppressed_count = issues.len() - active.len();
        summary.total_waste = active.iter().map(|i| i.estimated_cost).sum();
        summary.total_waste_tokens = active
            .iter()
            .fold(0, |acc, i| acc.saturating_add(i.waste_tokens));
        summary.affected_traces = active
            .iter()
            .map(|i| i.trace_id.as_str())
            .collect::<BTreeSet<_>>()
            .len();
        summary.estimated |= active.iter().any(|i| i.estimated);

        summary.batch_days = Self::batch_days(traces);
        summary.monthly_projection = summary.total_waste / summary.batch_days
            * self.options.monthly_projection_multiplier;

        trace_costs.sort_by(|a, b| {
            b.cost
                .total_cmp(&a.cost)
                .then_with(|| a.trace_id.cmp(&b.trace_id))
        });
        trace_costs.truncate(TOP_TRACES);

        info!(
            "Found {} issues ({} suppressed), ${:.4} wasted of ${:.4} spent",
            summary.issue_count, summary.suppressed_count, summary.total_waste, summary.total_spend
        );

        let total_spend = summary.total_spend;
        Report {
            summary,
            detectors,
            issues,
            models: Self::breakdown(models, total_spend),
            routes: Self::breakdown(routes, total_spend),
            teams: Self::breakdown(teams, total_spend),
            top_traces: trace_costs,
            diagnostics,
        }
    }

    fn detector_summaries(issues: &[Issue]) -> Vec<DetectorSummary> {
        DetectorKind::ALL
            .iter()
            .map(|&kind| {
                let mut summary = DetectorSummary::new(kind);
                let mut traces = BTreeSet::new();
                for issue in issues.iter().filter(|i| i.detector == kind) {
                    if issue.suppressed {
                        summary.suppressed_count += 1;
                        continue;
                    }
                    summary.issue_count += 1;
                    summary.waste_cost += issue.estimated_cost;
                    summary.waste_tokens = summary.waste_tokens.saturating_add(issue.waste_tokens);
                    traces.insert(issue.trace_id.as_str());
                }
                summary.affected_traces = traces.len();
                summary
            })
            .collect()
    }

    /// Days between the first and last call, never less than one.
    fn batch_days(traces: &[Trace]) -> f64 {
        let first = traces.iter().filter_map(|t| t.first_timestamp()).min();
        let last = traces.iter().filter_map(|t| t.last_timestamp()).max();
        match (first, last) {
            (Some(first), Some(last)) => {
                let seconds = (last - first).num_seconds() as f64;
                (seconds / SECONDS_PER_DAY).max(1.0)
            }
            _ => 1.0,
        }
    }

    fn breakdown(buckets: BTreeMap<String, Bucket>, total_spend: f64) -> Vec<CostBreakdown> {
        let mut rows: Vec<CostBreakdown> = buckets
            .into_iter()
            .map(|(key, bucket)| CostBreakdown {
                key,
                calls: bucket.calls,
                tokens: bucket.tokens,
                cost: bucket.cost,
                share: if total_spend > 0.0 {
                    bucket.cost / total_spend * 100.0
                } else {
                    0.0
                },
            })
            .collect();
        rows.sort_by(|a, b| b.cost.total_cmp(&a.cost).then_with(|| a.key.cmp(&b.key)));
        rows
    }
}
