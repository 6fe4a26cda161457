//! Model pricing and cost resolution.
//!
//! Cost for a call is resolved in this order:
//! 1. the cost reported on the record,
//! 2. token counts times the model's rates from the pricing table,
//! 3. token counts times the table's fallback rates, flagged as estimated.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::Call;

const TOKENS_PER_MILLION: f64 = 1_000_000.0;

/// Pricing for one model, in USD per million tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ModelPricing {
    #[serde(alias = "input_cost_per_million")]
    pub input_cost_per_1m: f64,
    #[serde(alias = "output_cost_per_million")]
    pub output_cost_per_1m: f64,
    #[serde(default)]
    pub description: String,
}

impl ModelPricing {
    pub fn new(input_cost_per_1m: f64, output_cost_per_1m: f64) -> Self {
        Self {
            input_cost_per_1m,
            output_cost_per_1m,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Cost for the given token counts.
    pub fn calculate(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        let input_cost = (prompt_tokens as f64 / TOKENS_PER_MILLION) * self.input_cost_per_1m;
        let output_cost =
            (completion_tokens as f64 / TOKENS_PER_MILLION) * self.output_cost_per_1m;
        input_cost + output_cost
    }

    /// Combined input and output rate, used to rank models by price.
    pub fn blended_rate(&self) -> f64 {
        self.input_cost_per_1m + self.output_cost_per_1m
    }
}

fn default_fallback() -> ModelPricing {
    ModelPricing::new(10.0, 30.0).with_description("Conservative estimate for unpriced models")
}

/// Pricing for every known model plus a fallback for the rest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PricingTable {
    pub models: BTreeMap<String, ModelPricing>,
    #[serde(default = "default_fallback")]
    pub fallback: ModelPricing,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            models: BTreeMap::new(),
            fallback: default_fallback(),
        }
    }
}

impl PricingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a model's pricing.
    pub fn insert(&mut self, model: impl Into<String>, pricing: ModelPricing) {
        self.models.insert(model.into(), pricing);
    }

    pub fn with_model(mut self, model: impl Into<String>, pricing: ModelPricing) -> Self {
        self.insert(model, pricing);
        self
    }

    pub fn with_fallback(mut self, fallback: ModelPricing) -> Self {
        self.fallback = fallback;
        self
    }

    /// Find pricing for a model.
    ///
    /// Tries the exact name, the lowercase name, then the name without a
    /// provider prefix (`openai/gpt-4` -> `gpt-4`).
    pub fn lookup(&self, model: &str) -> Option<&ModelPricing> {
        if let Some(pricing) = self.models.get(model) {
            return Some(pricing);
        }
        let lower = model.trim().to_lowercase();
        if let Some(pricing) = self.models.get(&lower) {
            return Some(pricing);
        }
        lower
            .rsplit_once('/')
            .and_then(|(_, name)| self.models.get(name))
    }

    pub fn contains(&self, model: &str) -> bool {
        self.lookup(model).is_some()
    }

    /// Cost of the given token counts on a priced model.
    pub fn cost_for(&self, model: &str, prompt_tokens: u64, completion_tokens: u64) -> Option<f64> {
        self.lookup(model)
            .map(|p| p.calculate(prompt_tokens, completion_tokens))
    }

    /// Price rank of a model; unpriced models rank at the fallback rate.
    pub fn rate_for(&self, model: &str) -> f64 {
        self.lookup(model).unwrap_or(&self.fallback).blended_rate()
    }

    /// Models whose calls needed the fallback estimate, with call counts.
    pub fn unpriced_models<'a>(&self, calls: impl IntoIterator<Item = &'a Call>) -> BTreeMap<String, usize> {
        let mut unpriced = BTreeMap::new();
        for call in calls {
            if call.cost.is_none() && !self.contains(&call.model) {
                *unpriced.entry(call.model.clone()).or_insert(0) += 1;
            }
        }
        unpriced
    }
}

/// Where a resolved cost came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CostSource {
    /// Reported on the record.
    Reported,
    /// Computed from the model's table entry.
    Computed,
    /// Computed from fallback rates.
    Estimated,
}

/// A cost together with its provenance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ResolvedCost {
    pub amount: f64,
    pub source: CostSource,
}

impl ResolvedCost {
    pub fn is_estimated(&self) -> bool {
        self.source == CostSource::Estimated
    }
}

/// Resolve the monetary cost of a call. Never fails; never negative.
pub fn resolve_cost(call: &Call, table: &PricingTable) -> ResolvedCost {
    if let Some(cost) = call.cost {
        return ResolvedCost {
            amount: cost.max(0.0),
            source: CostSource::Reported,
        };
    }

    match table.lookup(&call.model) {
        Some(pricing) => ResolvedCost {
            amount: pricing.calculate(call.prompt_tokens, call.completion_tokens),
            source: CostSource::Computed,
        },
        None => ResolvedCost {
            amount: table
                .fallback
                .calculate(call.prompt_tokens, call.completion_tokens),
            source: CostSource::Estimated,
        },
    }
}
