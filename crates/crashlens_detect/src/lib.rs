//! # crashlens_detect
//!
//! Waste detection for LLM API call logs.
//!
//! This crate provides:
//! - **Detectors**: retry loops, fallback storms, escalation after failure
//!   and expensive models spent on trivial prompts
//! - **Suppression**: retry loops silence the other findings on a trace
//! - **Aggregation**: per-detector totals, cost breakdowns and a monthly
//!   projection in a serializable [`Report`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use crashlens_core::CrashlensConfig;
//! use crashlens_detect::WasteAnalyzer;
//!
//! let analyzer = WasteAnalyzer::new(CrashlensConfig::builtin()?)?;
//! let report = analyzer.analyze_str(&std::fs::read_to_string("logs.jsonl")?);
//! println!("${:.4} wasted", report.summary.total_waste);
//! ```

pub mod aggregate;
pub mod detector;
pub mod detectors;
pub mod error;
pub mod issue;
pub mod pipeline;
pub mod report;
pub mod suppression;

pub use aggregate::WasteAggregator;
pub use detector::{Detector, DetectorRegistry};
pub use detectors::{
    FallbackFailureDetector, FallbackStormDetector, OverkillModelDetector, RetryLoopDetector,
};
pub use error::{DetectError, DetectResult};
pub use issue::{Issue, Severity};
pub use pipeline::WasteAnalyzer;
pub use report::{CostBreakdown, DetectorSummary, Report, ReportSummary, TraceCost};
pub use suppression::{SuppressionEdge, SuppressionEngine, SUPPRESSION_EDGES};
