//! Configuration schema, loading and validation.
//!
//! A configuration is read once, validated eagerly and then passed to the
//! engine as an immutable value. The `pricing` and `thresholds` sections are
//! mandatory in a user-supplied file; every field inside them has a default.
//!
//! ```yaml
//! pricing:
//!   models:
//!     gpt-4: { input_cost_per_1m: 30.0, output_cost_per_1m: 60.0 }
//! thresholds:
//!   retry_loop: { max_retries: 3, time_window_minutes: 5 }
//! suppression_rules:
//!   overkill_model: { enabled: true, suppress_if_retry_loop: true }
//! options:
//!   min_report_cost: 0.001
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::Duration;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CoreError, CoreResult};
use crate::models::DetectorKind;
use crate::pricing::PricingTable;

/// Built-in configuration shipped with the crate.
const BUILTIN_CONFIG: &str = include_str!("../config/crashlens.yaml");

pub const ENV_MIN_REPORT_COST: &str = "CRASHLENS_MIN_REPORT_COST";
pub const ENV_INCLUDE_SUPPRESSED: &str = "CRASHLENS_INCLUDE_SUPPRESSED";
pub const ENV_MONTHLY_MULTIPLIER: &str = "CRASHLENS_MONTHLY_MULTIPLIER";

fn default_true() -> bool {
    true
}

fn minutes(value: f64) -> Duration {
    Duration::milliseconds((value * 60_000.0).round() as i64)
}

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CrashlensConfig {
    pub pricing: PricingTable,
    pub thresholds: Thresholds,
    #[serde(default)]
    pub suppression_rules: SuppressionRules,
    #[serde(default)]
    pub options: GlobalOptions,
}

/// Per-detector thresholds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Thresholds {
    #[serde(default)]
    pub retry_loop: RetryLoopThresholds,
    #[serde(default)]
    pub fallback_storm: FallbackStormThresholds,
    #[serde(default)]
    pub fallback_failure: FallbackFailureThresholds,
    #[serde(default, alias = "overkill_model")]
    pub overkill: OverkillThresholds,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RetryLoopThresholds {
    /// Repeats required on top of the original call.
    pub max_retries: u32,
    /// Longest span a loop may cover.
    pub time_window_minutes: f64,
    /// Longest gap between two consecutive attempts.
    pub max_retry_interval_minutes: f64,
}

impl Default for RetryLoopThresholds {
    fn default() -> Self {
        Self {
            max_retries: 3,
            time_window_minutes: 5.0,
            max_retry_interval_minutes: 2.0,
        }
    }
}

impl RetryLoopThresholds {
    pub fn time_window(&self) -> Duration {
        minutes(self.time_window_minutes)
    }

    pub fn max_retry_interval(&self) -> Duration {
        minutes(self.max_retry_interval_minutes)
    }

    /// Smallest run length that counts as a loop.
    pub fn min_run_length(&self) -> usize {
        self.max_retries as usize + 1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FallbackStormThresholds {
    pub min_calls: usize,
    #[serde(alias = "min_models")]
    pub min_distinct_models: usize,
    pub max_trace_window_minutes: f64,
}

impl Default for FallbackStormThresholds {
    fn default() -> Self {
        Self {
            min_calls: 3,
            min_distinct_models: 2,
            max_trace_window_minutes: 3.0,
        }
    }
}

impl FallbackStormThresholds {
    pub fn window(&self) -> Duration {
        minutes(self.max_trace_window_minutes)
    }
}

/// How much of an escalation counts as waste.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FallbackWastePolicy {
    /// The whole cost of the expensive successful call.
    #[default]
    FullCost,
    /// The expensive call's cost minus what its tokens cost on the failed model.
    CostDelta,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FallbackFailureThresholds {
    pub time_window_seconds: f64,
    pub waste_policy: FallbackWastePolicy,
}

impl Default for FallbackFailureThresholds {
    fn default() -> Self {
        Self {
            time_window_seconds: 300.0,
            waste_policy: FallbackWastePolicy::FullCost,
        }
    }
}

impl FallbackFailureThresholds {
    pub fn window(&self) -> Duration {
        Duration::milliseconds((self.time_window_seconds * 1000.0).round() as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct OverkillThresholds {
    pub max_prompt_tokens: u64,
    pub max_prompt_chars: usize,
    pub expensive_models: Vec<String>,
    /// Cheap model used to price the hypothetical call.
    pub reference_model: String,
    /// Preferred cheaper model per expensive model.
    pub cheaper_alternatives: BTreeMap<String, String>,
    pub simple_task_keywords: Vec<String>,
    /// Only flag calls whose prompt contains a simple-task keyword.
    pub require_keyword_match: bool,
    /// Skip prompts that look like JSON payloads.
    pub skip_structured_prompts: bool,
}

impl Default for OverkillThresholds {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            max_prompt_tokens: 20,
            max_prompt_chars: 150,
            expensive_models: strings(&[
                "gpt-4",
                "gpt-4-32k",
                "gpt-4-turbo",
                "claude-3-opus",
                "claude-3-sonnet",
                "claude-2.1",
                "claude-2.0",
            ]),
            reference_model: "gpt-3.5-turbo".to_string(),
            cheaper_alternatives: [
                ("gpt-4", "gpt-3.5-turbo"),
                ("gpt-4-32k", "gpt-3.5-turbo-16k"),
                ("gpt-4-turbo", "gpt-3.5-turbo"),
                ("claude-3-opus", "claude-3-sonnet"),
                ("claude-3-sonnet", "claude-3-haiku"),
                ("claude-2.1", "claude-3-haiku"),
                ("claude-2.0", "claude-3-haiku"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
            simple_task_keywords: strings(&[
                "summarize",
                "translate",
                "classify",
                "extract",
                "explain",
                "define",
                "list",
                "rewrite",
                "fix grammar",
            ]),
            require_keyword_match: false,
            skip_structured_prompts: true,
        }
    }
}

impl OverkillThresholds {
    /// Whether a model belongs to the expensive set (case-insensitive).
    pub fn is_expensive(&self, model: &str) -> bool {
        let model = model.trim();
        self.expensive_models
            .iter()
            .any(|m| m.eq_ignore_ascii_case(model))
    }

    /// Cheaper model suggested for an expensive one.
    pub fn alternative_for(&self, model: &str) -> &str {
        let lower = model.trim().to_lowercase();
        self.cheaper_alternatives
            .iter()
            .find(|(k, _)| k.to_lowercase() == lower)
            .map(|(_, v)| v.as_str())
            .unwrap_or(&self.reference_model)
    }

    /// Whole-word, case-insensitive matcher for the keyword list.
    pub fn keyword_pattern(&self) -> CoreResult<Option<Regex>> {
        if self.simple_task_keywords.is_empty() {
            return Ok(None);
        }
        if let Some(bad) = self.simple_task_keywords.iter().find(|k| k.trim().is_empty()) {
            return Err(CoreError::Configuration(format!(
                "overkill keyword list contains an empty entry ({:?})",
                bad
            )));
        }
        let alternatives: Vec<String> = self
            .simple_task_keywords
            .iter()
            .map(|k| regex::escape(k.trim()))
            .collect();
        let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
        Regex::new(&pattern)
            .map(Some)
            .map_err(|e| CoreError::Configuration(format!("invalid keyword pattern: {}", e)))
    }
}

/// Whether a detector runs and whether a retry loop silences it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DetectorRule {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub suppress_if_retry_loop: bool,
}

impl DetectorRule {
    pub fn new(enabled: bool, suppress_if_retry_loop: bool) -> Self {
        Self {
            enabled,
            suppress_if_retry_loop,
        }
    }
}

impl Default for DetectorRule {
    fn default() -> Self {
        Self::new(true, false)
    }
}

fn suppressing_rule() -> DetectorRule {
    DetectorRule::new(true, true)
}

/// Suppression rules, one per detector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SuppressionRules {
    #[serde(default)]
    pub retry_loop: DetectorRule,
    #[serde(default = "suppressing_rule")]
    pub fallback_storm: DetectorRule,
    #[serde(default = "suppressing_rule")]
    pub fallback_failure: DetectorRule,
    #[serde(default = "suppressing_rule", alias = "overkill")]
    pub overkill_model: DetectorRule,
}

impl Default for SuppressionRules {
    fn default() -> Self {
        Self {
            retry_loop: DetectorRule::default(),
            fallback_storm: suppressing_rule(),
            fallback_failure: suppressing_rule(),
            overkill_model: suppressing_rule(),
        }
    }
}

impl SuppressionRules {
    pub fn rule(&self, kind: DetectorKind) -> &DetectorRule {
        match kind {
            DetectorKind::RetryLoop => &self.retry_loop,
            DetectorKind::FallbackStorm => &self.fallback_storm,
            DetectorKind::FallbackFailure => &self.fallback_failure,
            DetectorKind::OverkillModel => &self.overkill_model,
        }
    }

    pub fn rule_mut(&mut self, kind: DetectorKind) -> &mut DetectorRule {
        match kind {
            DetectorKind::RetryLoop => &mut self.retry_loop,
            DetectorKind::FallbackStorm => &mut self.fallback_storm,
            DetectorKind::FallbackFailure => &mut self.fallback_failure,
            DetectorKind::OverkillModel => &mut self.overkill_model,
        }
    }

    pub fn is_enabled(&self, kind: DetectorKind) -> bool {
        self.rule(kind).enabled
    }
}

/// Run-wide reporting options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalOptions {
    pub include_suppressed_by_default: bool,
    /// Issues cheaper than this are dropped from the report.
    pub min_report_cost: f64,
    pub high_severity_cost: f64,
    pub medium_severity_cost: f64,
    /// Days per month used to project daily waste.
    pub monthly_projection_multiplier: f64,
}

impl Default for GlobalOptions {
    fn default() -> Self {
        Self {
            include_suppressed_by_default: false,
            min_report_cost: 0.0,
            high_severity_cost: 0.10,
            medium_severity_cost: 0.01,
            monthly_projection_multiplier: 30.0,
        }
    }
}

impl CrashlensConfig {
    /// Build a configuration from parts, with default rules and options.
    pub fn new(pricing: PricingTable, thresholds: Thresholds) -> Self {
        Self {
            pricing,
            thresholds,
            suppression_rules: SuppressionRules::default(),
            options: GlobalOptions::default(),
        }
    }

    /// The configuration shipped with the crate.
    pub fn builtin() -> CoreResult<Self> {
        Self::from_yaml_str(BUILTIN_CONFIG)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(content: &str) -> CoreResult<Self> {
        let config: CrashlensConfig = serde_yaml::from_str(content).map_err(|e| {
            CoreError::Configuration(format!("failed to parse configuration: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, apply environment overrides and validate.
    pub fn load(path: &Path) -> CoreResult<Self> {
        debug!("Loading configuration from {:?}", path);
        let content = fs::read_to_string(path).map_err(|e| {
            CoreError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config: CrashlensConfig = serde_yaml::from_str(&content).map_err(|e| {
            CoreError::Configuration(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        info!(
            "Loaded configuration with {} priced models",
            config.pricing.models.len()
        );
        Ok(config)
    }

    /// Apply overrides from a key lookup (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MIN_REPORT_COST) {
            match raw.trim().parse::<f64>() {
                Ok(value) => self.options.min_report_cost = value,
                Err(_) => warn!("Ignoring {}={:?}: not a number", ENV_MIN_REPORT_COST, raw),
            }
        }

        if let Some(raw) = lookup(ENV_INCLUDE_SUPPRESSED) {
            match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" => self.options.include_suppressed_by_default = true,
                "0" | "false" | "no" => self.options.include_suppressed_by_default = false,
                _ => warn!("Ignoring {}={:?}: not a boolean", ENV_INCLUDE_SUPPRESSED, raw),
            }
        }

        if let Some(raw) = lookup(ENV_MONTHLY_MULTIPLIER) {
            match raw.trim().parse::<f64>() {
                Ok(value) => self.options.monthly_projection_multiplier = value,
                Err(_) => warn!("Ignoring {}={:?}: not a number", ENV_MONTHLY_MULTIPLIER, raw),
            }
        }
    }

    /// Reject configurations the detectors cannot work with.
    pub fn validate(&self) -> CoreResult<()> {
        let mut errors: Vec<String> = Vec::new();

        let rate_ok = |v: f64| v.is_finite() && v >= 0.0;
        for (model, pricing) in &self.pricing.models {
            if !rate_ok(pricing.input_cost_per_1m) || !rate_ok(pricing.output_cost_per_1m) {
                errors.push(format!("pricing for '{}' must be finite and non-negative", model));
            }
        }
        if !rate_ok(self.pricing.fallback.input_cost_per_1m)
            || !rate_ok(self.pricing.fallback.output_cost_per_1m)
        {
            errors.push("fallback pricing must be finite and non-negative".to_string());
        }

        let positive = |v: f64| v.is_finite() && v > 0.0;
        let retry = &self.thresholds.retry_loop;
        if retry.max_retries == 0 {
            errors.push("retry_loop.max_retries must be at least 1".to_string());
        }
        if !positive(retry.time_window_minutes) {
            errors.push("retry_loop.time_window_minutes must be positive".to_string());
        }
        if !positive(retry.max_retry_interval_minutes) {
            errors.push("retry_loop.max_retry_interval_minutes must be positive".to_string());
        }

        let storm = &self.thresholds.fallback_storm;
        if storm.min_calls < 2 {
            errors.push("fallback_storm.min_calls must be at least 2".to_string());
        }
        if storm.min_distinct_models < 2 {
            errors.push("fallback_storm.min_distinct_models must be at least 2".to_string());
        }
        if !positive(storm.max_trace_window_minutes) {
            errors.push("fallback_storm.max_trace_window_minutes must be positive".to_string());
        }

        if !positive(self.thresholds.fallback_failure.time_window_seconds) {
            errors.push("fallback_failure.time_window_seconds must be positive".to_string());
        }

        let overkill = &self.thresholds.overkill;
        if !self.pricing.contains(&overkill.reference_model) {
            errors.push(format!(
                "overkill.reference_model '{}' has no pricing entry",
                overkill.reference_model
            ));
        }
        if let Err(e) = overkill.keyword_pattern() {
            errors.push(e.to_string());
        }
        if overkill.require_keyword_match && overkill.simple_task_keywords.is_empty() {
            errors.push("overkill.require_keyword_match needs simple_task_keywords".to_string());
        }

        let options = &self.options;
        if !options.min_report_cost.is_finite() || options.min_report_cost < 0.0 {
            errors.push("options.min_report_cost must be non-negative".to_string());
        }
        if !options.monthly_projection_multiplier.is_finite()
            || options.monthly_projection_multiplier < 0.0
        {
            errors.push("options.monthly_projection_multiplier must be non-negative".to_string());
        }
        if !(options.medium_severity_cost.is_finite() && options.high_severity_cost.is_finite())
            || options.medium_severity_cost < 0.0
            || options.medium_severity_cost > options.high_severity_cost
        {
            errors.push(
                "options.medium_severity_cost must be between 0 and high_severity_cost".to_string(),
            );
        }

        if self.suppression_rules.retry_loop.suppress_if_retry_loop {
            warn!("suppression_rules.retry_loop.suppress_if_retry_loop has no effect");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Configuration(errors.join("; ")))
        }
    }
}
