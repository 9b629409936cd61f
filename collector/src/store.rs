//! In-memory report storage keyed by broker.
//!
//! Each broker's reports sit behind their own `RwLock`, so writes for one
//! broker never wait on readers of another. History is bounded: once a broker
//! holds `capacity` reports the oldest are dropped.

use chrono::Utc;
use dashmap::DashMap;
use harness::{LatencyReport, LatencyStats};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::{BrokerSummary, StoredReport};

pub const DEFAULT_CAPACITY: usize = 10_000;

pub struct ReportStore {
    reports: DashMap<String, RwLock<Vec<StoredReport>>>,
    capacity: usize,
}

impl ReportStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            reports: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub async fn insert(&self, report: LatencyReport) -> StoredReport {
        let stored = StoredReport {
            id: Uuid::new_v4(),
            received_at: Utc::now(),
            report,
        };

        let broker = stored.report.broker.clone();
        if !self.reports.contains_key(&broker) {
            self.reports.entry(broker.clone()).or_default();
        }
        if let Some(slot) = self.reports.get(&broker) {
            let mut history = slot.write().await;
            history.push(stored.clone());
            if history.len() > self.capacity {
                let excess = history.len() - self.capacity;
                history.drain(..excess);
            }
        }
        stored
    }

    /// Newest first, across all brokers unless one is named.
    pub async fn recent(&self, broker: Option<&str>, limit: usize) -> Vec<StoredReport> {
        let mut out = Vec::new();
        match broker {
            Some(name) => {
                if let Some(slot) = self.reports.get(name) {
                    out.extend(slot.read().await.iter().rev().take(limit).cloned());
                }
            }
            None => {
                for name in self.brokers() {
                    if let Some(slot) = self.reports.get(&name) {
                        out.extend(slot.read().await.iter().rev().take(limit).cloned());
                    }
                }
                out.sort_by(|a, b| b.received_at.cmp(&a.received_at));
                out.truncate(limit);
            }
        }
        out
    }

    /// Broker names, sorted.
    pub fn brokers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.reports.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        let mut total = 0;
        for name in self.brokers() {
            if let Some(slot) = self.reports.get(&name) {
                total += slot.read().await.len();
            }
        }
        total
    }

    pub async fn summary(&self, broker: &str) -> Option<BrokerSummary> {
        let slot = self.reports.get(broker)?;
        let history = slot.read().await;

        let submit: Vec<i64> = history
            .iter()
            .filter_map(|r| r.report.total_latency_ns)
            .collect();
        let cancel: Vec<i64> = history
            .iter()
            .filter_map(|r| r.report.cancel_latency_ns)
            .collect();

        Some(BrokerSummary {
            broker: broker.to_string(),
            reports: history.len(),
            failures: history.iter().filter(|r| !r.report.is_success()).count(),
            submit: LatencyStats::from_samples(submit),
            cancel: LatencyStats::from_samples(cancel),
        })
    }
}

impl Default for ReportStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
