//! Rendering reports as text, Markdown or JSON.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

use crashlens_core::{DetectorKind, Diagnostic};
use crashlens_detect::{CostBreakdown, Issue, Report, ReportSummary, TraceCost};

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Markdown,
    Json,
}

/// What to show.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    pub include_suppressed: bool,
    /// Hide prompts and trace identifiers.
    pub summary_only: bool,
}

pub fn render_report(report: &Report, format: OutputFormat, options: RenderOptions) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(report, options)),
        OutputFormat::Markdown => Ok(render_markdown(report, options)),
        OutputFormat::Json => render_json(report, options),
    }
}

/// Cost breakdown only.
pub fn render_cost_summary(report: &Report, format: OutputFormat) -> Result<String> {
    #[derive(Serialize)]
    struct CostSummary<'a> {
        summary: &'a ReportSummary,
        models: &'a [CostBreakdown],
        routes: &'a [CostBreakdown],
        teams: &'a [CostBreakdown],
        top_traces: &'a [TraceCost],
    }

    match format {
        OutputFormat::Json => serde_json::to_string_pretty(&CostSummary {
            summary: &report.summary,
            models: &report.models,
            routes: &report.routes,
            teams: &report.teams,
            top_traces: &report.top_traces,
        })
        .context("Failed to serialize cost summary"),
        OutputFormat::Markdown => Ok(markdown_costs(report, true)),
        OutputFormat::Text => Ok(text_costs(report)),
    }
}

fn render_json(report: &Report, options: RenderOptions) -> Result<String> {
    if options.include_suppressed && !options.summary_only {
        return report.to_json().context("Failed to serialize report");
    }

    let mut view = report.clone();
    if !options.include_suppressed {
        view.issues.retain(|i| !i.suppressed);
    }
    if options.summary_only {
        for issue in &mut view.issues {
            issue.sample_prompt.clear();
            issue.trace_id.clear();
        }
        view.top_traces.clear();
        view.diagnostics = view.diagnostics.iter().map(Diagnostic::redacted).collect();
    }
    view.to_json().context("Failed to serialize report")
}

fn money(value: f64) -> String {
    format!("${:.4}", value)
}

fn text_costs(report: &Report) -> String {
    let mut out = String::new();
    let summary = &report.summary;

    out.push_str("CrashLens Cost Summary\n");
    out.push_str(&"=".repeat(50));
    out.push('\n');
    out.push_str(&format!("Total cost:   {}\n", money(summary.total_spend)));
    out.push_str(&format!("Total tokens: {}\n", summary.total_tokens));
    out.push_str(&format!("Total traces: {}\n", summary.traces_analyzed));

    for (title, rows) in [
        ("Cost by model", &report.models),
        ("Cost by route", &report.routes),
        ("Cost by team", &report.teams),
    ] {
        if rows.is_empty() {
            continue;
        }
        out.push_str(&format!("\n{}\n", title));
        for row in rows.iter() {
            out.push_str(&format!(
                "  {:<28} {:>12} ({:.1}%)\n",
                row.key,
                money(row.cost),
                row.share
            ));
        }
    }

    if !report.top_traces.is_empty() {
        out.push_str("\nMost expensive traces\n");
        for trace in &report.top_traces {
            out.push_str(&format!(
                "  {:<28} {:>12} ({} calls)\n",
                trace.trace_id,
                money(trace.cost),
                trace.calls
            ));
        }
    }
    out
}

fn markdown_costs(report: &Report, show_traces: bool) -> String {
    let mut out = String::new();
    out.push_str("## Cost Summary\n\n");
    out.push_str(&format!(
        "**Total cost:** {} across {} traces ({} tokens)\n",
        money(report.summary.total_spend),
        report.summary.traces_analyzed,
        report.summary.total_tokens
    ));

    for (title, rows) in [
        ("Model", &report.models),
        ("Route", &report.routes),
        ("Team", &report.teams),
    ] {
        if rows.is_empty() {
            continue;
        }
        out.push_str(&format!("\n| {} | Calls | Tokens | Cost | Share |\n", title));
        out.push_str("|---|---:|---:|---:|---:|\n");
        for row in rows.iter() {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {:.1}% |\n",
                row.key,
                row.calls,
                row.tokens,
                money(row.cost),
                row.share
            ));
        }
    }

    if show_traces && !report.top_traces.is_empty() {
        out.push_str("\n| Trace | Calls | Cost |\n|---|---:|---:|\n");
        for trace in &report.top_traces {
            out.push_str(&format!(
                "| `{}` | {} | {} |\n",
                trace.trace_id,
                trace.calls,
                money(trace.cost)
            ));
        }
    }
    out
}

fn issues_for<'a>(report: &'a Report, kind: DetectorKind, options: RenderOptions) -> Vec<&'a Issue> {
    report
        .visible_issues(options.include_suppressed)
        .into_iter()
        .filter(|i| i.detector == kind)
        .collect()
}

fn render_text(report: &Report, options: RenderOptions) -> String {
    let mut out = String::new();
    let summary = &report.summary;

    out.push_str("CrashLens Waste Report\n");
    out.push_str(&"=".repeat(50));
    out.push('\n');
    out.push_str(&format!(
        "Traces analyzed:    {} ({} calls)\n",
        summary.traces_analyzed, summary.total_calls
    ));
    out.push_str(&format!("Total spend:        {}\n", money(summary.total_spend)));
    out.push_str(&format!(
        "Total waste:        {} ({:.1}%, {} tokens)\n",
        money(summary.total_waste),
        summary.waste_percentage(),
        summary.total_waste_tokens
    ));
    out.push_str(&format!(
        "Monthly projection: {}\n",
        money(summary.monthly_projection)
    ));
    if summary.estimated {
        out.push_str("Some costs are estimated from fallback pricing.\n");
    }

    if !report.has_waste() && !(options.include_suppressed && summary.suppressed_count > 0) {
        out.push_str("\n✅ No waste patterns detected.\n");
    }

    for detector in &report.detectors {
        let issues = issues_for(report, detector.detector, options);
        if issues.is_empty() {
            continue;
        }
        out.push_str(&format!(
            "\n{} ({} issues, {} traces, {})\n",
            detector.detector.display_name(),
            detector.issue_count,
            detector.affected_traces,
            money(detector.waste_cost)
        ));
        if options.summary_only {
            continue;
        }
        for issue in issues {
            let marker = match issue.suppressed_by {
                Some(by) => format!(" [suppressed by {}]", by),
                None => String::new(),
            };
            out.push_str(&format!(
                "  [{}] {}  {}  {}{}\n",
                issue.severity.to_string().to_uppercase(),
                issue.trace_id,
                money(issue.estimated_cost),
                issue.problem,
                marker
            ));
            if !issue.sample_prompt.is_empty() {
                out.push_str(&format!("      prompt: {:?}\n", issue.sample_prompt));
            }
        }
    }

    if !report.models.is_empty() {
        out.push_str("\nCost by model\n");
        for row in &report.models {
            out.push_str(&format!(
                "  {:<28} {:>12} ({:.1}%)\n",
                row.key,
                money(row.cost),
                row.share
            ));
        }
    }

    render_diagnostics_text(report, options, &mut out);
    out
}

fn render_diagnostics_text(report: &Report, options: RenderOptions, out: &mut String) {
    let summary = &report.summary;
    if summary.skipped_records > 0 || summary.ignored_records > 0 {
        out.push_str(&format!(
            "\nRecords skipped: {}, ignored: {}\n",
            summary.skipped_records, summary.ignored_records
        ));
    }
    let notes: Vec<_> = report
        .diagnostics
        .iter()
        .filter(|d| d.line.is_none())
        .collect();
    if !notes.is_empty() {
        out.push_str("\nNotes\n");
        for diagnostic in notes {
            if options.summary_only {
                out.push_str(&format!("  - {}\n", diagnostic.redacted()));
            } else {
                out.push_str(&format!("  - {}\n", diagnostic));
            }
        }
    }
}

fn render_markdown(report: &Report, options: RenderOptions) -> String {
    let mut out = String::new();
    let summary = &report.summary;

    out.push_str("# CrashLens Waste Report\n\n");
    out.push_str("| Metric | Value |\n|---|---:|\n");
    out.push_str(&format!("| Traces analyzed | {} |\n", summary.traces_analyzed));
    out.push_str(&format!("| Calls | {} |\n", summary.total_calls));
    out.push_str(&format!("| Total spend | {} |\n", money(summary.total_spend)));
    out.push_str(&format!(
        "| Total waste | {} ({:.1}%) |\n",
        money(summary.total_waste),
        summary.waste_percentage()
    ));
    out.push_str(&format!("| Wasted tokens | {} |\n", summary.total_waste_tokens));
    out.push_str(&format!(
        "| Monthly projection | {} |\n",
        money(summary.monthly_projection)
    ));
    if summary.estimated {
        out.push_str("\n> Some costs are estimated from fallback pricing.\n");
    }

    for detector in &report.detectors {
        let issues = issues_for(report, detector.detector, options);
        if issues.is_empty() {
            continue;
        }
        out.push_str(&format!(
            "\n## {}\n\n{} issues across {} traces, {} wasted\n",
            detector.detector.display_name(),
            detector.issue_count,
            detector.affected_traces,
            money(detector.waste_cost)
        ));
        if options.summary_only {
            continue;
        }
        out.push_str("\n| Trace | Severity | Waste | Problem | Prompt |\n");
        out.push_str("|---|---|---:|---|---|\n");
        for issue in issues {
            let problem = match issue.suppressed_by {
                Some(by) => format!("{} _(suppressed by {})_", issue.problem, by),
                None => issue.problem.clone(),
            };
            out.push_str(&format!(
                "| `{}` | {} | {} | {} | {} |\n",
                issue.trace_id,
                issue.severity,
                money(issue.estimated_cost),
                problem,
                issue.sample_prompt.replace('|', "\\|").replace('\n', " ")
            ));
        }
    }

    out.push('\n');
    out.push_str(&markdown_costs(report, !options.summary_only));
    out
}
