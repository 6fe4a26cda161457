//! # crashlens_core
//!
//! Data model, log parsing, pricing and configuration for CrashLens.
//!
//! This crate provides:
//! - **Call model**: normalized [`Call`] records grouped into [`Trace`]s
//! - **Parser**: tolerant JSONL reader for flat and Langfuse-style logs
//! - **Pricing**: per-model rates with a conservative fallback estimate
//! - **Configuration**: thresholds, suppression rules and report options
//!
//! ## Example
//!
//! ```rust,ignore
//! use crashlens_core::{CrashlensConfig, RecordParser, TraceGrouper};
//!
//! let config = CrashlensConfig::builtin()?;
//! let outcome = RecordParser::parse_str(&std::fs::read_to_string("logs.jsonl")?);
//! let traces = TraceGrouper::group(outcome.calls);
//! println!("{} traces, {} skipped lines", traces.len(), outcome.diagnostics.len());
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod grouping;
pub mod models;
pub mod parser;
pub mod pricing;

pub use config::{
    CrashlensConfig, DetectorRule, FallbackFailureThresholds, FallbackStormThresholds,
    FallbackWastePolicy, GlobalOptions, OverkillThresholds, RetryLoopThresholds,
    SuppressionRules, Thresholds,
};
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use error::{CoreError, CoreResult};
pub use grouping::TraceGrouper;
pub use models::{Call, CallStatus, DetectorKind, Trace};
pub use parser::{parse_timestamp, ParseOutcome, ParsedLine, RecordParser};
pub use pricing::{resolve_cost, CostSource, ModelPricing, PricingTable, ResolvedCost};
