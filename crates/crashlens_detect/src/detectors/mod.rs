//! The four waste detectors.

mod fallback_failure;
mod fallback_storm;
mod overkill;
mod retry_loop;

pub use fallback_failure::FallbackFailureDetector;
pub use fallback_storm::FallbackStormDetector;
pub use overkill::OverkillModelDetector;
pub use retry_loop::RetryLoopDetector;

use crashlens_core::{resolve_cost, Call, PricingTable};

/// Summed cost of some calls and whether any of it was estimated.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct CostTotal {
    pub amount: f64,
    pub estimated: bool,
}

pub(crate) fn total_cost<'a>(
    calls: impl IntoIterator<Item = &'a Call>,
    pricing: &PricingTable,
) -> CostTotal {
    calls
        .into_iter()
        .fold(CostTotal::default(), |mut total, call| {
            let resolved = resolve_cost(call, pricing);
            total.amount += resolved.amount;
            total.estimated |= resolved.is_estimated();
            total
        })
}

/// Token count of some calls, clamped at `u64::MAX`.
pub(crate) fn token_sum<'a>(calls: impl IntoIterator<Item = &'a Call>) -> u64 {
    calls
        .into_iter()
        .fold(0, |acc, call| acc.saturating_add(call.total_tokens))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use crashlens_core::{Call, CallStatus, CrashlensConfig, Trace};

    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    pub fn at(seconds: i64, model: &str, prompt: &str) -> Call {
        Call::new("trace_1", t0() + Duration::seconds(seconds), model, prompt)
            .with_usage(100, 50)
            .with_status(CallStatus::Success)
    }

    pub fn trace(calls: Vec<Call>) -> Trace {
        let calls = calls
            .into_iter()
            .enumerate()
            .map(|(i, c)| c.with_sequence(i))
            .collect();
        Trace {
            trace_id: "trace_1".to_string(),
            calls,
        }
    }

    pub fn config() -> CrashlensConfig {
        CrashlensConfig::builtin().unwrap()
    }
}
