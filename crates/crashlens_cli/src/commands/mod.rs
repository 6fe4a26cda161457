//! CLI command definitions.
//!
//! Each subcommand loads a configuration, reads a JSONL log and hands the
//! resulting report to a renderer.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crashlens_core::CrashlensConfig;

use crate::error::CliError;

pub mod check_config;
pub mod scan;
pub mod summary;

/// CrashLens - find wasted spend in LLM API logs
#[derive(Parser)]
#[command(name = "crashlens")]
#[command(version, about = "CrashLens - find wasted spend in LLM API logs")]
#[command(long_about = r#"
CrashLens reads JSONL logs of LLM API calls and reports patterns of wasted
spend: retry loops, fallback storms, escalation after failure and expensive
models used for trivial prompts. Everything runs locally.

COMMANDS:
  scan          → Detect waste patterns and print a report
  summary       → Print spend by model, route and team
  check-config  → Validate a configuration file

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Configuration error
  4 - Input error
  5 - Waste found (with --fail-on-waste)
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Detect waste patterns in a log
    Scan(scan::ScanArgs),

    /// Print the cost breakdown of a log
    Summary(summary::SummaryArgs),

    /// Validate a configuration file
    #[command(name = "check-config")]
    CheckConfig(check_config::CheckConfigArgs),
}

/// Where the log comes from.
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// JSONL log file
    pub file: Option<PathBuf>,

    /// Read the log from standard input
    #[arg(long, conflicts_with = "file")]
    pub stdin: bool,

    /// Configuration file (defaults to the built-in configuration)
    #[arg(short, long, env = "CRASHLENS_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Load the configuration named on the command line, or the built-in one.
pub fn load_config(path: Option<&Path>) -> Result<CrashlensConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            CrashlensConfig::load(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))
        }
        None => {
            debug!("Using built-in configuration");
            let mut config =
                CrashlensConfig::builtin().context("Built-in configuration is invalid")?;
            config.apply_overrides(|key| std::env::var(key).ok());
            config.validate().context("Invalid environment override")?;
            Ok(config)
        }
    }
}

/// Read the whole log. Decoding is left to the parser so one bad line
/// cannot reject the file.
pub async fn read_input(input: &InputArgs) -> Result<Vec<u8>> {
    if input.stdin {
        let mut bytes = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut bytes)
            .await
            .map_err(|source| CliError::InputUnreadable {
                path: "<stdin>".to_string(),
                source,
            })?;
        return Ok(bytes);
    }

    let path = input.file.as_ref().ok_or(CliError::MissingInput)?;
    if !path.exists() {
        return Err(CliError::InputNotFound(path.clone()).into());
    }
    info!("Reading log from {:?}", path);
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| CliError::InputUnreadable {
            path: path.display().to_string(),
            source,
        })?;
    Ok(bytes)
}

/// Write to a file, or print to stdout.
pub async fn emit(output: Option<&Path>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            tokio::fs::write(path, content)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Report saved to {}", path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_read_input_from_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("logs.jsonl");
        fs::write(&path, "{}\n").unwrap();

        let input = InputArgs {
            file: Some(path),
            stdin: false,
            config: None,
        };
        assert_eq!(read_input(&input).await.unwrap(), b"{}\n");
    }

    #[tokio::test]
    async fn test_read_input_keeps_invalid_utf8() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("logs.jsonl");
        fs::write(&path, b"\xff\xfe\n{}\n").unwrap();

        let input = InputArgs {
            file: Some(path),
            stdin: false,
            config: None,
        };
        let bytes = read_input(&input).await.unwrap();
        assert_eq!(bytes.len(), 6);

        let analyzer = crashlens_detect::WasteAnalyzer::new(load_config(None).unwrap()).unwrap();
        let report = analyzer.analyze_bytes(&bytes);
        assert_eq!(report.summary.skipped_records, 2);
    }

    #[tokio::test]
    async fn test_missing_input() {
        let input = InputArgs {
            file: None,
            stdin: false,
            config: None,
        };
        let err = read_input(&input).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::MissingInput)
        ));

        let input = InputArgs {
            file: Some(PathBuf::from("/nonexistent/logs.jsonl")),
            ..input
        };
        let err = read_input(&input).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::InputNotFound(_))
        ));
    }

    #[test]
    fn test_load_builtin_config() {
        let config = load_config(None).unwrap();
        assert!(config.pricing.contains("gpt-4"));
    }
}
