//! API types for the REST and WebSocket interfaces.

use chrono::{DateTime, Utc};
use harness::{LatencyReport, LatencyStats};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A report as accepted by the collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredReport {
    pub id: Uuid,
    pub received_at: DateTime<Utc>,
    #[serde(flatten)]
    pub report: LatencyReport,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportAccepted {
    pub id: Uuid,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ReportsQuery {
    pub broker: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StreamQuery {
    pub broker: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BrokersResponse {
    pub brokers: Vec<String>,
}

/// Per-broker aggregate over stored reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSummary {
    pub broker: String,
    pub reports: usize,
    pub failures: usize,
    /// Submit round trip, successful and cancel-failed cycles alike.
    pub submit: Option<LatencyStats>,
    pub cancel: Option<LatencyStats>,
}

/// WebSocket message types.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamMessage {
    #[serde(rename = "report")]
    Report(StoredReport),
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "ping")]
    Ping { timestamp: i64 },
    #[serde(rename = "pong")]
    Pong { timestamp: i64 },
}
