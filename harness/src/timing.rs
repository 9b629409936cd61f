//! Checkpoint timestamps for one measurement cycle.
//!
//! Timestamps are nanoseconds since a process-wide monotonic origin. Each
//! record pins its own base at creation and advances on tokio's clock from
//! there, so intervals inside a record stay exact under `tokio::time::pause`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;
use tokio::time::Instant;

static PROCESS_ORIGIN: OnceLock<std::time::Instant> = OnceLock::new();

/// Monotonic nanoseconds since the first call in this process.
pub fn process_ns() -> u64 {
    PROCESS_ORIGIN
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_nanos() as u64
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Checkpoint {
    Start,
    SubmitAck,
    CancelAck,
}

impl Checkpoint {
    pub fn name(&self) -> &'static str {
        match self {
            Checkpoint::Start => "start",
            Checkpoint::SubmitAck => "submit_ack",
            Checkpoint::CancelAck => "cancel_ack",
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimingError {
    #[error("checkpoint missing: {0}")]
    CheckpointMissing(Checkpoint),
}

/// Ordered (checkpoint, ns) pairs. Non-decreasing because the clock is.
#[derive(Clone, Debug)]
pub struct TimingRecord {
    anchor: Instant,
    base_ns: u64,
    marks: Vec<(Checkpoint, u64)>,
}

impl Default for TimingRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for TimingRecord {
    fn eq(&self, other: &Self) -> bool {
        self.marks == other.marks
    }
}

impl Eq for TimingRecord {}

impl TimingRecord {
    pub fn new() -> Self {
        Self {
            anchor: Instant::now(),
            base_ns: process_ns(),
            marks: Vec::new(),
        }
    }

    /// Appends `checkpoint` at the current time and returns the timestamp.
    pub fn mark(&mut self, checkpoint: Checkpoint) -> u64 {
        self.mark_at(checkpoint, Instant::now())
    }

    /// Appends `checkpoint` at an instant observed elsewhere, such as the
    /// moment a broker callback fired. Instants before the last mark are
    /// clamped so the record stays non-decreasing.
    pub fn mark_at(&mut self, checkpoint: Checkpoint, at: Instant) -> u64 {
        let mut ts = self.base_ns + at.saturating_duration_since(self.anchor).as_nanos() as u64;
        if let Some(&(_, last)) = self.marks.last() {
            ts = ts.max(last);
        }
        self.marks.push((checkpoint, ts));
        ts
    }

    /// First timestamp recorded for `checkpoint`.
    pub fn get(&self, checkpoint: Checkpoint) -> Option<u64> {
        self.marks
            .iter()
            .find(|(cp, _)| *cp == checkpoint)
            .map(|&(_, ts)| ts)
    }

    /// Nanoseconds from `from` to `to`.
    pub fn elapsed(&self, from: Checkpoint, to: Checkpoint) -> Result<i64, TimingError> {
        let start = self.get(from).ok_or(TimingError::CheckpointMissing(from))?;
        let end = self.get(to).ok_or(TimingError::CheckpointMissing(to))?;
        Ok(end as i64 - start as i64)
    }

    pub fn marks(&self) -> &[(Checkpoint, u64)] {
        &self.marks
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// All of start, submit_ack and cancel_ack are present.
    pub fn is_complete(&self) -> bool {
        [Checkpoint::Start, Checkpoint::SubmitAck, Checkpoint::CancelAck]
            .iter()
            .all(|cp| self.get(*cp).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn elapsed_follows_the_clock() {
        let mut record = TimingRecord::new();
        record.mark(Checkpoint::Start);
        tokio::time::advance(Duration::from_millis(6)).await;
        record.mark(Checkpoint::SubmitAck);

        assert_eq!(
            record.elapsed(Checkpoint::Start, Checkpoint::SubmitAck),
            Ok(6_000_000)
        );
        assert!(!record.is_complete());

        tokio::time::advance(Duration::from_secs(1)).await;
        record.mark(Checkpoint::CancelAck);
        assert!(record.is_complete());
        assert_eq!(
            record.elapsed(Checkpoint::SubmitAck, Checkpoint::CancelAck),
            Ok(1_000_000_000)
        );
    }

    #[tokio::test]
    async fn missing_checkpoint_is_reported() {
        let mut record = TimingRecord::new();
        record.mark(Checkpoint::Start);

        assert_eq!(
            record.elapsed(Checkpoint::Start, Checkpoint::CancelAck),
            Err(TimingError::CheckpointMissing(Checkpoint::CancelAck))
        );
        assert_eq!(
            TimingError::CheckpointMissing(Checkpoint::SubmitAck).to_string(),
            "checkpoint missing: submit_ack"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn mark_at_uses_the_given_instant() {
        let mut record = TimingRecord::new();
        let start = record.mark(Checkpoint::Start);
        let callback_at = Instant::now() + Duration::from_millis(3);
        tokio::time::advance(Duration::from_millis(10)).await;

        let acked = record.mark_at(Checkpoint::SubmitAck, callback_at);
        assert_eq!(acked - start, 3_000_000);
    }

    #[tokio::test]
    async fn mark_at_clamps_stale_instants() {
        let early = Instant::now();
        let mut record = TimingRecord::new();
        tokio::time::sleep(Duration::from_millis(1)).await;
        let start = record.mark(Checkpoint::Start);
        let acked = record.mark_at(Checkpoint::SubmitAck, early);
        assert_eq!(acked, start);
    }

    #[tokio::test]
    async fn marks_never_go_backwards() {
        let mut record = TimingRecord::new();
        for cp in [Checkpoint::Start, Checkpoint::SubmitAck, Checkpoint::CancelAck] {
            record.mark(cp);
        }
        let stamps: Vec<u64> = record.marks().iter().map(|&(_, ts)| ts).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(record.len(), 3);
    }
}
