//! Expensive models spent on trivial prompts.

use regex::Regex;

use crashlens_core::{resolve_cost, Call, CrashlensConfig, DetectorKind, OverkillThresholds, Trace};

use crate::detector::Detector;
use crate::error::{DetectError, DetectResult};
use crate::issue::Issue;

/// Flags short prompts sent to a model from the expensive set.
///
/// The waste is what the call cost minus what the same tokens would have
/// cost on the suggested cheaper model, never below zero.
#[derive(Debug)]
pub struct OverkillModelDetector {
    keywords: Option<Regex>,
}

impl OverkillModelDetector {
    /// Compile the keyword matcher from the overkill thresholds.
    pub fn from_config(thresholds: &OverkillThresholds) -> DetectResult<Self> {
        Ok(Self {
            keywords: thresholds.keyword_pattern()?,
        })
    }

    fn is_short(call: &Call, thresholds: &OverkillThresholds) -> bool {
        if call.prompt_tokens > 0 {
            call.prompt_tokens < thresholds.max_prompt_tokens
        } else {
            call.prompt.chars().count() < thresholds.max_prompt_chars
        }
    }

    fn is_structured(prompt: &str) -> bool {
        matches!(prompt.trim_start().chars().next(), Some('{') | Some('['))
    }

    fn matched_keyword(&self, prompt: &str) -> Option<String> {
        self.keywords
            .as_ref()
            .and_then(|re| re.find(prompt))
            .map(|m| m.as_str().to_lowercase())
    }

    /// Model used to price the hypothetical call.
    fn cheaper_model<'a>(call: &Call, config: &'a CrashlensConfig) -> DetectResult<&'a str> {
        let thresholds = &config.thresholds.overkill;
        let preferred = thresholds.alternative_for(&call.model);
        if config.pricing.contains(preferred) {
            return Ok(preferred);
        }
        if config.pricing.contains(&thresholds.reference_model) {
            return Ok(thresholds.reference_model.as_str());
        }
        Err(DetectError::MissingPricing(
            thresholds.reference_model.clone(),
        ))
    }
}

impl Detector for OverkillModelDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::OverkillModel
    }

    fn detect(&self, trace: &Trace, config: &CrashlensConfig) -> DetectResult<Vec<Issue>> {
        let thresholds = &config.thresholds.overkill;
        let mut issues = Vec::new();

        for call in &trace.calls {
            if !thresholds.is_expensive(&call.model) || call.status.is_failure() {
                continue;
            }
            if thresholds.skip_structured_prompts && Self::is_structured(&call.prompt) {
                continue;
            }
            if !Self::is_short(call, thresholds) {
                continue;
            }
            let keyword = self.matched_keyword(&call.prompt);
            if thresholds.require_keyword_match && keyword.is_none() {
                continue;
            }

            let cheaper = Self::cheaper_model(call, config)?;
            let actual = resolve_cost(call, &config.pricing);
            let hypothetical = config
                .pricing
                .cost_for(cheaper, call.prompt_tokens, call.completion_tokens)
                .ok_or_else(|| DetectError::MissingPricing(cheaper.to_string()))?;

            let size = if call.prompt_tokens > 0 {
                format!("{} tokens", call.prompt_tokens)
            } else {
                format!("{} chars", call.prompt.chars().count())
            };

            issues.push(
                Issue::new(
                    DetectorKind::OverkillModel,
                    &trace.trace_id,
                    format!(
                        "{} used for a short prompt ({}); {} would do",
                        call.model, size, cheaper
                    ),
                )
                .with_calls(&[call])
                .with_cost(actual.amount - hypothetical, &config.options)
                .with_tokens(call.total_tokens)
                .with_estimated(actual.is_estimated())
                .with_suggested_model(cheaper)
                .with_matched_keyword(keyword),
            );
        }

        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::fixtures::{at, config, trace};
    use crashlens_core::CallStatus;

    fn detector(config: &CrashlensConfig) -> OverkillModelDetector {
        OverkillModelDetector::from_config(&config.thresholds.overkill).unwrap()
    }

    #[test]
    fn test_short_prompt_flagged() {
        let config = config();
        let call = at(0, "gpt-4", "Summarize this").with_usage(15, 40);
        let issues = detector(&config).detect(&trace(vec![call]), &config).unwrap();

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].suggested_model.as_deref(), Some("gpt-3.5-turbo"));
        assert_eq!(issues[0].matched_keyword.as_deref(), Some("summarize"));
        // gpt-4 minus gpt-3.5-turbo on 15 in / 40 out
        let expected = (15.0 * 29.5 + 40.0 * 58.5) / 1_000_000.0;
        assert!((issues[0].estimated_cost - expected).abs() < 1e-12);
    }

    #[test]
    fn test_long_prompt_not_flagged() {
        let config = config();
        let call = at(0, "gpt-4", "Summarize this").with_usage(5000, 40);
        let issues = detector(&config).detect(&trace(vec![call]), &config).unwrap();
        assert!(issues.is_empty());
    }

    #[test]
    fn test_char_length_used_without_token_counts() {
        let config = config();
        let short = at(0, "gpt-4", "hi").with_usage(0, 0);
        let long = at(1, "gpt-4", &"word ".repeat(40)).with_usage(0, 0);
        let issues = detector(&config)
            .detect(&trace(vec![short, long]), &config)
            .unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].sample_prompt, "hi");
    }

    #[test]
    fn test_exclusions() {
        let config = config();
        let calls = vec![
            at(0, "gpt-3.5-turbo", "hi").with_usage(5, 5),
            at(1, "gpt-4", "hi").with_usage(5, 5).with_status(CallStatus::Failure),
            at(2, "gpt-4", r#"{"task":"x"}"#).with_usage(5, 5),
        ];
        let issues = detector(&config).detect(&trace(calls), &config).unwrap();
        assert!(issues.is_empty());
    }

    #[test]
    fn test_keyword_requirement() {
        let mut config = config();
        config.thresholds.overkill.require_keyword_match = true;
        let calls = vec![
            at(0, "claude-3-opus", "hello there").with_usage(5, 5),
            at(1, "claude-3-opus", "Translate: bonjour").with_usage(5, 5),
        ];
        let issues = detector(&config).detect(&trace(calls), &config).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].suggested_model.as_deref(), Some("claude-3-sonnet"));
    }

    #[test]
    fn test_waste_never_negative() {
        let config = config();
        let call = at(0, "gpt-4", "hi").with_usage(5, 5).with_cost(0.0);
        let issues = detector(&config).detect(&trace(vec![call]), &config).unwrap();
        assert_eq!(issues[0].estimated_cost, 0.0);
    }
}
