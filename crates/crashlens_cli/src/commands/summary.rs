//! Summary command - Print spend by model, route and team.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crashlens_detect::{DetectorRegistry, WasteAnalyzer};

use super::{emit, load_config, read_input, InputArgs};
use crate::render::{render_cost_summary, OutputFormat};

#[derive(Args)]
pub struct SummaryArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Write the summary to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

pub async fn execute(args: SummaryArgs) -> Result<()> {
    let config = load_config(args.input.config.as_deref())?;
    // Spend only; no detectors needed.
    let analyzer = WasteAnalyzer::new(config)
        .context("Failed to build analyzer")?
        .with_registry(DetectorRegistry::new());

    let bytes = read_input(&args.input).await?;
    let report = analyzer.analyze_bytes(&bytes);

    let rendered = render_cost_summary(&report, args.format)?;
    emit(args.output.as_deref(), &rendered).await
}
