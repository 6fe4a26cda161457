//! Check-config command - Validate a configuration file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crashlens_core::DetectorKind;

use super::load_config;

#[derive(Args)]
pub struct CheckConfigArgs {
    /// Configuration file (defaults to the built-in configuration)
    #[arg(short, long, env = "CRASHLENS_CONFIG")]
    config: Option<PathBuf>,

    /// Print the resolved thresholds as YAML
    #[arg(long)]
    show: bool,
}

pub async fn execute(args: CheckConfigArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;

    println!("📋 Checking configuration...");
    match &args.config {
        Some(path) => println!("   Source: {}", path.display()),
        None => println!("   Source: built-in"),
    }
    println!("   Priced models: {}", config.pricing.models.len());

    for kind in DetectorKind::ALL {
        let rule = config.suppression_rules.rule(kind);
        let state = if rule.enabled { "enabled" } else { "disabled" };
        let suppression = if rule.suppress_if_retry_loop && kind != DetectorKind::RetryLoop {
            ", suppressed by retry loops"
        } else {
            ""
        };
        println!("   {:<18} {}{}", kind.display_name(), state, suppression);
    }

    if args.show {
        let yaml = serde_yaml::to_string(&config.thresholds)
            .context("Failed to serialize thresholds")?;
        println!();
        println!("{}", yaml);
    }

    println!();
    println!("✅ Configuration is valid");
    Ok(())
}
