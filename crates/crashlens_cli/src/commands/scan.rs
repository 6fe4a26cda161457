//! Scan command - Detect waste patterns in a log.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crashlens_detect::WasteAnalyzer;

use super::{emit, load_config, read_input, InputArgs};
use crate::error::CliError;
use crate::render::{render_report, OutputFormat, RenderOptions};

#[derive(Args)]
pub struct ScanArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Also list issues silenced by a retry loop
    #[arg(long)]
    include_suppressed: bool,

    /// Hide prompts and trace identifiers
    #[arg(long)]
    summary_only: bool,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Exit with code 5 when any waste is found
    #[arg(long)]
    fail_on_waste: bool,
}

pub async fn execute(args: ScanArgs) -> Result<()> {
    let config = load_config(args.input.config.as_deref())?;
    let include_suppressed = args.include_suppressed || config.options.include_suppressed_by_default;

    let analyzer = WasteAnalyzer::new(config).context("Failed to build analyzer")?;
    let bytes = read_input(&args.input).await?;
    let report = analyzer.analyze_bytes(&bytes);

    info!(
        "Scanned {} traces: {} issues",
        report.summary.traces_analyzed, report.summary.issue_count
    );

    let options = RenderOptions {
        include_suppressed,
        summary_only: args.summary_only,
    };
    let rendered = render_report(&report, args.format, options)?;
    emit(args.output.as_deref(), &rendered).await?;

    if args.fail_on_waste && report.has_waste() {
        return Err(CliError::WasteFound {
            issues: report.summary.issue_count,
            cost: report.summary.total_waste,
        }
        .into());
    }
    Ok(())
}
