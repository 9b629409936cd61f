//! Summary statistics over latency samples.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: usize,
    pub min_ns: i64,
    pub max_ns: i64,
    pub mean_ns: f64,
    pub p50_ns: i64,
    pub p90_ns: i64,
    pub p99_ns: i64,
}

impl LatencyStats {
    /// `None` for an empty sample set.
    pub fn from_samples(mut samples: Vec<i64>) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        samples.sort_unstable();

        let sum: i128 = samples.iter().map(|&v| v as i128).sum();
        Some(Self {
            count: samples.len(),
            min_ns: samples[0],
            max_ns: samples[samples.len() - 1],
            mean_ns: sum as f64 / samples.len() as f64,
            p50_ns: percentile(&samples, 0.50),
            p90_ns: percentile(&samples, 0.90),
            p99_ns: percentile(&samples, 0.99),
        })
    }

    pub fn mean_ms(&self) -> f64 {
        self.mean_ns / 1_000_000.0
    }
}

/// Value at the rounded linear index `(n - 1) * p` of sorted, non-empty values.
fn percentile(sorted: &[i64], p: f64) -> i64 {
    let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Nanoseconds as milliseconds with three decimals.
pub fn fmt_ms(ns: i64) -> String {
    format!("{:.3} ms", ns as f64 / 1_000_000.0)
}
