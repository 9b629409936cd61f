//! Turning cycle outcomes into operator-visible lines and forwardable reports.
//!
//! Line format, one fact per line:
//!
//! ```text
//! CHECKPOINT=start T_NS=812345000
//! CHECKPOINT=submit_ack T_NS=818345000
//! ===START=812345000===
//! ===END=818345000===
//! TOTAL_NS=6000000
//! CANCEL_NS=1000000000
//! RESULT=ok ORDER_ID=SIM000001 TICKET_ID=T1-2330
//! ```
//!
//! The `===START=`/`===END=` pair is what the profiling wrappers grep for.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

use crate::driver::CycleOutcome;
use crate::timing::{Checkpoint, TimingRecord};
use crate::types::OrderRequest;

pub struct Reporter<W: Write> {
    writer: W,
    timing_enabled: bool,
}

impl Reporter<io::Stderr> {
    pub fn stderr(timing_enabled: bool) -> Self {
        Self::new(io::stderr(), timing_enabled)
    }
}

impl<W: Write> Reporter<W> {
    pub fn new(writer: W, timing_enabled: bool) -> Self {
        Self {
            writer,
            timing_enabled,
        }
    }

    /// Writes the outcome and flushes.
    pub fn emit(&mut self, outcome: &CycleOutcome) -> io::Result<()> {
        for line in format_lines(outcome, self.timing_enabled) {
            writeln!(self.writer, "{}", line)?;
        }
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Renders an outcome as report lines. Timing lines are left out when
/// `timing_enabled` is false.
pub fn format_lines(outcome: &CycleOutcome, timing_enabled: bool) -> Vec<String> {
    let mut lines = Vec::new();
    match outcome {
        Ok(result) => {
            if timing_enabled {
                push_timing(&mut lines, &result.record);
                lines.push(format!("TOTAL_NS={}", result.total_latency_ns));
                lines.push(format!("CANCEL_NS={}", result.cancel_latency_ns));
            }
            lines.push(format!(
                "RESULT=ok ORDER_ID={} TICKET_ID={}",
                result.handle.order_id, result.handle.ticket_id
            ));
        }
        Err(failure) => {
            if timing_enabled {
                push_timing(&mut lines, &failure.record);
                if let Some(total) = failure.submit_latency_ns {
                    lines.push(format!("TOTAL_NS={}", total));
                }
            }
            lines.push(format!(
                "FAILURE={} REASON={:?}",
                failure.reason.code(),
                failure.reason.to_string()
            ));
            lines.push(format!("ORDER_STATE={}", failure.order_state));
        }
    }
    lines
}

fn push_timing(lines: &mut Vec<String>, record: &TimingRecord) {
    for (checkpoint, ts) in record.marks() {
        lines.push(format!("CHECKPOINT={} T_NS={}", checkpoint, ts));
    }
    if let (Some(start), Some(end)) = (
        record.get(Checkpoint::Start),
        record.get(Checkpoint::SubmitAck),
    ) {
        lines.push(format!("===START={}===", start));
        lines.push(format!("===END={}===", end));
    }
}

/// Timing markers recovered from a captured log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedMarkers {
    pub start_ns: u64,
    pub end_ns: u64,
    pub total_ns: u64,
}

/// Finds the first start/end/total markers in `text`.
///
/// Accepts both `===START=n===` / `===END=n===` and the
/// `CHECKPOINT=start` / `CHECKPOINT=submit_ack` style. All three values must
/// be present.
pub fn parse_markers(text: &str) -> Option<ParsedMarkers> {
    let mut start = None;
    let mut end = None;
    let mut total = None;

    for line in text.lines() {
        if start.is_none() {
            start = number_after(line, "===START=")
                .or_else(|| number_after(line, "CHECKPOINT=start T_NS="));
        }
        if end.is_none() {
            end = number_after(line, "===END=")
                .or_else(|| number_after(line, "CHECKPOINT=submit_ack T_NS="));
        }
        if total.is_none() {
            total = number_after(line, "TOTAL_NS=");
        }
    }

    Some(ParsedMarkers {
        start_ns: start?,
        end_ns: end?,
        total_ns: total?,
    })
}

fn number_after(line: &str, tag: &str) -> Option<u64> {
    let rest = &line[line.find(tag)? + tag.len()..];
    let digits: &str = &rest[..rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len())];
    digits.parse().ok()
}

/// JSON body forwarded to a latency collection endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyReport {
    pub timestamp: DateTime<Utc>,
    pub broker: String,
    /// Submit round trip in milliseconds; absent when the submit never acked.
    pub latency_ms: Option<f64>,
    pub total_latency_ns: Option<i64>,
    pub cancel_latency_ns: Option<i64>,
    pub symbol: String,
    /// `B` or `S`.
    pub side: String,
    pub price: Decimal,
    pub volume: u32,
    /// `ok` or a failure code such as `submit_timeout`.
    pub outcome: String,
}

impl LatencyReport {
    pub fn from_outcome(broker: &str, request: &OrderRequest, outcome: &CycleOutcome) -> Self {
        let (total, cancel, code) = match outcome {
            Ok(result) => (
                Some(result.total_latency_ns),
                Some(result.cancel_latency_ns),
                "ok",
            ),
            Err(failure) => (failure.submit_latency_ns, None, failure.reason.code()),
        };
        Self {
            timestamp: Utc::now(),
            broker: broker.to_string(),
            latency_ms: total.map(|ns| ns as f64 / 1_000_000.0),
            total_latency_ns: total,
            cancel_latency_ns: cancel,
            symbol: request.symbol.clone(),
            side: request.side.code().to_string(),
            price: request.price,
            volume: request.quantity,
            outcome: code.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == "ok"
    }
}
