//! JSONL log parsing.
//!
//! Each non-blank line of the input is one JSON object describing a single
//! API call. Field names follow both the flat style (`trace_id`, `timestamp`,
//! `model`, `prompt`) and the Langfuse style (`traceId`, `startTime`,
//! `input.model`, `input.prompt`).
//!
//! A line that cannot be turned into a [`Call`] is skipped and reported as an
//! [`DiagnosticKind::InputError`](crate::DiagnosticKind::InputError); it never
//! aborts the batch.

use std::collections::BTreeMap;
use std::io::BufRead;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::diagnostics::Diagnostic;
use crate::error::{CoreError, CoreResult};
use crate::models::{Call, CallStatus};

/// Langfuse observation type that carries model usage.
const GENERATION_TYPE: &str = "generation";

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    trace_id: Option<String>,
    #[serde(default, rename = "traceId")]
    trace_id_camel: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default, rename = "startTime")]
    start_time: Option<String>,
    #[serde(default, rename = "type")]
    record_type: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    input: Option<Value>,
    #[serde(default)]
    usage: Option<RawUsage>,
    #[serde(default)]
    cost: Option<f64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    route: Option<String>,
    #[serde(default)]
    metadata: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawUsage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
    #[serde(default)]
    total_tokens: Option<u64>,
}

/// What a single line turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    Call(Box<Call>),
    /// A well-formed record that is not a model call (span, event).
    Ignored,
    Blank,
}

/// Result of parsing a whole batch.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub calls: Vec<Call>,
    /// One entry per skipped line.
    pub diagnostics: Vec<Diagnostic>,
    /// Records ignored because they are not generations.
    pub ignored: usize,
    pub lines_read: usize,
}

impl ParseOutcome {
    pub fn skipped(&self) -> usize {
        self.diagnostics.len()
    }
}

/// Parser turning raw log lines into [`Call`]s.
pub struct RecordParser;

impl RecordParser {
    /// Parse a JSONL string.
    pub fn parse_str(text: &str) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();
        for (index, line) in text.lines().enumerate() {
            Self::accept(&mut outcome, index + 1, line);
        }
        Self::log_outcome(&outcome);
        outcome
    }

    /// Parse raw JSONL bytes. Lines that are not UTF-8 are skipped.
    pub fn parse_bytes(bytes: &[u8]) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();
        if !bytes.is_empty() {
            let body = bytes.strip_suffix(b"\n").unwrap_or(bytes);
            for (index, line) in body.split(|b| *b == b'\n').enumerate() {
                Self::accept_bytes(&mut outcome, index + 1, line);
            }
        }
        Self::log_outcome(&outcome);
        outcome
    }

    /// Parse JSONL from any buffered reader. Only I/O failures are errors;
    /// a line that is not UTF-8 is skipped like any other bad record.
    pub fn parse_reader<R: BufRead>(mut reader: R) -> CoreResult<ParseOutcome> {
        let mut outcome = ParseOutcome::default();
        let mut buf = Vec::new();
        let mut line_no = 0;
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line_no += 1;
            let line = buf.strip_suffix(b"\n").unwrap_or(&buf);
            Self::accept_bytes(&mut outcome, line_no, line);
        }
        Self::log_outcome(&outcome);
        Ok(outcome)
    }

    fn accept_bytes(outcome: &mut ParseOutcome, line_no: usize, line: &[u8]) {
        match std::str::from_utf8(line) {
            Ok(line) => Self::accept(outcome, line_no, line),
            Err(e) => {
                outcome.lines_read += 1;
                debug!("Skipping line {}: invalid UTF-8", line_no);
                outcome
                    .diagnostics
                    .push(Diagnostic::input_error(line_no, format!("invalid UTF-8: {}", e)));
            }
        }
    }

    fn accept(outcome: &mut ParseOutcome, line_no: usize, line: &str) {
        outcome.lines_read += 1;
        match Self::parse_line(line) {
            Ok(ParsedLine::Call(call)) => {
                let sequence = outcome.calls.len();
                outcome.calls.push((*call).with_sequence(sequence));
            }
            Ok(ParsedLine::Ignored) => outcome.ignored += 1,
            Ok(ParsedLine::Blank) => {}
            Err(e) => {
                debug!("Skipping line {}: {}", line_no, e);
                outcome.diagnostics.push(Diagnostic::input_error(line_no, e.to_string()));
            }
        }
    }

    fn log_outcome(outcome: &ParseOutcome) {
        info!(
            "Parsed {} calls from {} lines ({} skipped, {} ignored)",
            outcome.calls.len(),
            outcome.lines_read,
            outcome.skipped(),
            outcome.ignored
        );
    }

    /// Parse one line.
    pub fn parse_line(line: &str) -> CoreResult<ParsedLine> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(ParsedLine::Blank);
        }

        let raw: RawRecord = serde_json::from_str(line)?;

        if let Some(kind) = &raw.record_type {
            if !kind.eq_ignore_ascii_case(GENERATION_TYPE) {
                return Ok(ParsedLine::Ignored);
            }
        }

        Self::normalize(raw).map(|call| ParsedLine::Call(Box::new(call)))
    }

    fn normalize(raw: RawRecord) -> CoreResult<Call> {
        let trace_id = raw
            .trace_id
            .or(raw.trace_id_camel)
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::InvalidRecord("missing trace_id".to_string()))?
            .to_string();

        let input = raw.input.as_ref();
        let model = raw
            .model
            .clone()
            .or_else(|| nested_str(input, "model"))
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| {
                CoreError::InvalidRecord(format!("missing model for trace {}", trace_id))
            })?;

        let prompt = raw
            .prompt
            .clone()
            .or_else(|| nested_str(input, "prompt"))
            .or_else(|| input.and_then(Value::as_str).map(str::to_string))
            .ok_or_else(|| {
                CoreError::InvalidRecord(format!("missing prompt for trace {}", trace_id))
            })?;

        let timestamp = raw
            .timestamp
            .as_deref()
            .or(raw.start_time.as_deref())
            .ok_or_else(|| {
                CoreError::InvalidRecord(format!("missing timestamp for trace {}", trace_id))
            })
            .and_then(|ts| {
                parse_timestamp(ts).ok_or_else(|| {
                    CoreError::InvalidRecord(format!("unparsable timestamp '{}'", ts))
                })
            })?;

        if let Some(cost) = raw.cost {
            if !cost.is_finite() || cost < 0.0 {
                return Err(CoreError::InvalidRecord(format!(
                    "negative or non-finite cost {} for trace {}",
                    cost, trace_id
                )));
            }
        }

        let usage = raw.usage.unwrap_or_default();
        let prompt_tokens = usage.prompt_tokens.unwrap_or(0);
        let completion_tokens = usage.completion_tokens.unwrap_or(0);
        let summed = prompt_tokens.checked_add(completion_tokens).ok_or_else(|| {
            CoreError::InvalidRecord(format!("token counts overflow for trace {}", trace_id))
        })?;
        let total_tokens = match (usage.prompt_tokens, usage.completion_tokens) {
            (Some(_), Some(_)) => summed,
            _ => usage.total_tokens.unwrap_or(summed),
        };

        let metadata = raw.metadata.unwrap_or_default();
        let route = raw.route.or_else(|| {
            metadata
                .get("route")
                .and_then(Value::as_str)
                .map(str::to_string)
        });

        Ok(Call {
            trace_id,
            timestamp,
            model,
            prompt,
            prompt_tokens,
            completion_tokens,
            total_tokens,
            cost: raw.cost,
            status: infer_status(raw.status.as_deref(), raw.level.as_deref(), raw.error.is_some()),
            route,
            metadata,
            sequence: 0,
        })
    }
}

fn nested_str(value: Option<&Value>, key: &str) -> Option<String> {
    value
        .and_then(|v| v.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn infer_status(status: Option<&str>, level: Option<&str>, has_error: bool) -> CallStatus {
    let parsed = status.map(CallStatus::parse).unwrap_or_default();
    if parsed != CallStatus::Unknown {
        return parsed;
    }
    let level_error = level.is_some_and(|l| l.eq_ignore_ascii_case("error"));
    if level_error || has_error {
        CallStatus::Failure
    } else {
        parsed
    }
}

/// Parse an ISO-8601 timestamp; naive timestamps are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
