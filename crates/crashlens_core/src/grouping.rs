//! Grouping calls into traces.

use std::collections::BTreeMap;

use tracing::debug;

use crate::models::{Call, Trace};

/// Partitions calls by trace identifier.
pub struct TraceGrouper;

impl TraceGrouper {
    /// Group calls into traces, ordered by trace identifier.
    ///
    /// Calls inside a trace are sorted by timestamp; calls sharing a timestamp
    /// keep their input order.
    pub fn group(calls: Vec<Call>) -> Vec<Trace> {
        let mut by_trace: BTreeMap<String, Vec<Call>> = BTreeMap::new();
        for call in calls {
            by_trace.entry(call.trace_id.clone()).or_default().push(call);
        }

        let traces: Vec<Trace> = by_trace
            .into_iter()
            .map(|(trace_id, mut calls)| {
                calls.sort_by(|a, b| {
                    a.timestamp
                        .cmp(&b.timestamp)
                        .then(a.sequence.cmp(&b.sequence))
                });
                Trace { trace_id, calls }
            })
            .collect();

        debug!("Grouped calls into {} traces", traces.len());
        traces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_group_and_sort() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let calls = vec![
            Call::new("b", t0, "m", "late").with_sequence(0),
            Call::new("a", t0 + Duration::seconds(30), "m", "second").with_sequence(1),
            Call::new("a", t0, "m", "first").with_sequence(2),
            Call::new("a", t0 + Duration::seconds(30), "m", "third").with_sequence(3),
        ];

        let traces = TraceGrouper::group(calls);
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].trace_id, "a");

        let prompts: Vec<&str> = traces[0].calls.iter().map(|c| c.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["first", "second", "third"]);
        assert_eq!(traces[1].len(), 1);
    }

    #[test]
    fn test_empty_input() {
        assert!(TraceGrouper::group(Vec::new()).is_empty());
    }
}
