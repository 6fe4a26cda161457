//! CrashLens CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Configuration error
//! - 4: Input error
//! - 5: Waste found (with `--fail-on-waste`)

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{filter::Directive, fmt, prelude::*, EnvFilter};

mod commands;
mod error;
mod render;

use commands::{Cli, Commands};
use crashlens_core::CoreError;
use crashlens_detect::DetectError;
use error::CliError;

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const CONFIG_ERROR: u8 = 3;
    pub const INPUT_ERROR: u8 = 4;
    pub const WASTE_FOUND: u8 = 5;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Scan(args) => commands::scan::execute(args).await,
        Commands::Summary(args) => commands::summary::execute(args).await,
        Commands::CheckConfig(args) => commands::check_config::execute(args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            if exit_code != ExitCodes::WASTE_FOUND {
                eprintln!("❌ Error: {:#}", e);
            } else {
                eprintln!("⚠️  {}", e);
            }
            ExitCode::from(exit_code)
        }
    }
}

/// Logs go to stderr so reports on stdout stay machine-readable.
fn init_logging(verbose: bool, quiet: bool) {
    let directives: &[&str] = if verbose {
        &["crashlens=debug", "info"]
    } else if quiet {
        &["error"]
    } else {
        &["crashlens=info", "warn"]
    };

    let mut filter = EnvFilter::from_default_env();
    for directive in directives {
        if let Ok(directive) = directive.parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
    }

    // Already initialized is fine.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(err) = cause.downcast_ref::<CliError>() {
            return match err {
                CliError::MissingInput => ExitCodes::INVALID_ARGS,
                CliError::InputNotFound(_) | CliError::InputUnreadable { .. } => {
                    ExitCodes::INPUT_ERROR
                }
                CliError::WasteFound { .. } => ExitCodes::WASTE_FOUND,
            };
        }
        if let Some(err) = cause.downcast_ref::<CoreError>() {
            return match err {
                CoreError::Configuration(_) => ExitCodes::CONFIG_ERROR,
                _ => ExitCodes::INPUT_ERROR,
            };
        }
        if let Some(err) = cause.downcast_ref::<DetectError>() {
            return match err {
                DetectError::Core(CoreError::Configuration(_)) => ExitCodes::CONFIG_ERROR,
                DetectError::Core(_) => ExitCodes::INPUT_ERROR,
                _ => ExitCodes::GENERAL_ERROR,
            };
        }
    }
    ExitCodes::GENERAL_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_exit_codes() {
        let config: anyhow::Result<()> =
            Err(CoreError::Configuration("bad".into())).context("Failed to load configuration");
        assert_eq!(categorize_error(&config.unwrap_err()), ExitCodes::CONFIG_ERROR);

        let waste = anyhow::Error::new(CliError::WasteFound { issues: 2, cost: 0.5 });
        assert_eq!(categorize_error(&waste), ExitCodes::WASTE_FOUND);

        let missing = anyhow::Error::new(CliError::MissingInput);
        assert_eq!(categorize_error(&missing), ExitCodes::INVALID_ARGS);

        let wrapped = anyhow::Error::new(DetectError::Core(CoreError::Configuration("x".into())));
        assert_eq!(categorize_error(&wrapped), ExitCodes::CONFIG_ERROR);

        assert_eq!(categorize_error(&anyhow::anyhow!("boom")), ExitCodes::GENERAL_ERROR);
    }
}
