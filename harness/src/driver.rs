//! Order lifecycle driver: submit, await ack, settle, cancel, await ack.
//!
//! One call places exactly one real order. Nothing here retries: any failure
//! ends the cycle and is handed back to the caller with the partial timing
//! record, and a repeat is a new, explicit `run_cycle` call.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::adapter::{AckReceiver, BrokerAdapter, CancelAck, SubmitAck};
use crate::timing::{Checkpoint, TimingRecord};
use crate::types::{OrderHandle, OrderRequest};

/// Timeouts and the pause before cancelling.
///
/// The settle delay exists because some brokers refuse a cancel that lands
/// right behind the submit. It is policy, not protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyclePolicy {
    pub submit_timeout: Duration,
    pub cancel_timeout: Duration,
    pub settle_delay: Duration,
}

impl Default for CyclePolicy {
    fn default() -> Self {
        Self {
            submit_timeout: Duration::from_secs(10),
            cancel_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Submit,
    Settle,
    Cancel,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Submit => "submit",
            Phase::Settle => "settle",
            Phase::Cancel => "cancel",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("submit timed out")]
    SubmitTimeout,
    #[error("submit rejected: {0}")]
    SubmitRejected(String),
    #[error("cancel timed out")]
    CancelTimeout,
    #[error("cancel rejected: {0}")]
    CancelRejected(String),
    /// The adapter dropped the ack without answering.
    #[error("{0} acknowledgement dropped by adapter")]
    AckDropped(Phase),
    #[error("interrupted during {0}")]
    Interrupted(Phase),
}

impl FailureReason {
    /// Stable machine-readable name.
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::SubmitTimeout => "submit_timeout",
            FailureReason::SubmitRejected(_) => "submit_rejected",
            FailureReason::CancelTimeout => "cancel_timeout",
            FailureReason::CancelRejected(_) => "cancel_rejected",
            FailureReason::AckDropped(_) => "ack_dropped",
            FailureReason::Interrupted(_) => "interrupted",
        }
    }
}

/// What the operator has to reconcile after a failed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderState {
    /// No order reached the broker.
    NotPlaced,
    /// The broker holds this order; it was not cancelled.
    Placed(OrderHandle),
    /// The broker never confirmed either way. Left alone on purpose.
    Unknown(Option<OrderHandle>),
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderState::NotPlaced => f.write_str("not_placed"),
            OrderState::Placed(handle) => write!(f, "placed:{}", handle),
            OrderState::Unknown(Some(handle)) => write!(f, "unknown:{}", handle),
            OrderState::Unknown(None) => f.write_str("unknown"),
        }
    }
}

/// A completed cycle. Derived once from the record and never recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementResult {
    pub handle: OrderHandle,
    pub record: TimingRecord,
    /// submit_ack - start
    pub total_latency_ns: i64,
    /// cancel_ack - submit_ack, settle delay included
    pub cancel_latency_ns: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleFailure {
    pub reason: FailureReason,
    pub record: TimingRecord,
    /// Present whenever the submit was acknowledged before the failure.
    pub submit_latency_ns: Option<i64>,
    pub order_state: OrderState,
}

pub type CycleOutcome = Result<MeasurementResult, CycleFailure>;

enum Wait<T> {
    Done(T, tokio::time::Instant),
    Dropped,
    TimedOut,
    Interrupted,
}

/// Runs one cycle with no external interruption.
pub async fn run_cycle<A>(
    adapter: &mut A,
    request: &OrderRequest,
    policy: &CyclePolicy,
) -> CycleOutcome
where
    A: BrokerAdapter + ?Sized,
{
    let (_, shutdown) = watch::channel(false);
    run_cycle_with_shutdown(adapter, request, policy, shutdown).await
}

/// Runs one cycle, abandoning it as soon as `shutdown` turns true.
///
/// An interrupted cycle never cancels on its way out: the order is reported
/// with whatever state is known and the caller disconnects.
pub async fn run_cycle_with_shutdown<A>(
    adapter: &mut A,
    request: &OrderRequest,
    policy: &CyclePolicy,
    mut shutdown: watch::Receiver<bool>,
) -> CycleOutcome
where
    A: BrokerAdapter + ?Sized,
{
    let mut record = TimingRecord::new();
    if *shutdown.borrow_and_update() {
        warn!(broker = adapter.name(), "shutdown already requested, order not sent");
        return Err(CycleFailure {
            reason: FailureReason::Interrupted(Phase::Submit),
            record,
            submit_latency_ns: None,
            order_state: OrderState::NotPlaced,
        });
    }

    let (ack, rx) = SubmitAck::channel();
    let start = record.mark(Checkpoint::Start);
    info!(broker = adapter.name(), order = %request, "submitting order");
    if let Err(e) = adapter.submit_order(request, ack) {
        warn!(error = %e, "submit refused by adapter");
        return Err(CycleFailure {
            reason: FailureReason::SubmitRejected(e.to_string()),
            record,
            submit_latency_ns: None,
            order_state: OrderState::NotPlaced,
        });
    }

    let fail = |reason: FailureReason, record: TimingRecord, state: OrderState| -> CycleOutcome {
        warn!(reason = %reason, state = %state, "cycle failed during submit");
        Err(CycleFailure {
            reason,
            record,
            submit_latency_ns: None,
            order_state: state,
        })
    };
    let handle = match await_ack(rx, policy.submit_timeout, &mut shutdown).await {
        Wait::Done(Ok(handle), at) => {
            let acked = record.mark_at(Checkpoint::SubmitAck, at);
            info!(
                order_id = %handle.order_id,
                ticket_id = %handle.ticket_id,
                latency_ns = acked - start,
                "order acknowledged"
            );
            handle
        }
        Wait::Done(Err(message), _) => {
            return fail(FailureReason::SubmitRejected(message), record, OrderState::NotPlaced)
        }
        Wait::Dropped => {
            let reason = FailureReason::AckDropped(Phase::Submit);
            return fail(reason, record, OrderState::Unknown(None));
        }
        Wait::TimedOut => {
            return fail(FailureReason::SubmitTimeout, record, OrderState::Unknown(None));
        }
        Wait::Interrupted => {
            let reason = FailureReason::Interrupted(Phase::Submit);
            return fail(reason, record, OrderState::Unknown(None));
        }
    };

    let acked = record.get(Checkpoint::SubmitAck).unwrap_or(start);
    let total_latency_ns = acked as i64 - start as i64;
    let fail = |reason: FailureReason, record: TimingRecord, state: OrderState| -> CycleOutcome {
        warn!(
            reason = %reason,
            state = %state,
            submit_latency_ns = total_latency_ns,
            "cycle failed after submit"
        );
        Err(CycleFailure {
            reason,
            record,
            submit_latency_ns: Some(total_latency_ns),
            order_state: state,
        })
    };

    tokio::select! {
        _ = tokio::time::sleep(policy.settle_delay) => {}
        _ = shutdown_requested(&mut shutdown) => {
            let reason = FailureReason::Interrupted(Phase::Settle);
            return fail(reason, record, OrderState::Placed(handle));
        }
    }

    let (ack, rx) = CancelAck::channel();
    info!(order_id = %handle.order_id, "cancelling order");
    if let Err(e) = adapter.cancel_order(&handle, request, ack) {
        let reason = FailureReason::CancelRejected(e.to_string());
        return fail(reason, record, OrderState::Placed(handle));
    }

    match await_ack(rx, policy.cancel_timeout, &mut shutdown).await {
        Wait::Done(Ok(()), at) => {
            let cancelled = record.mark_at(Checkpoint::CancelAck, at);
            let cancel_latency_ns = cancelled as i64 - acked as i64;
            info!(
                order_id = %handle.order_id,
                latency_ns = cancel_latency_ns,
                "cancel acknowledged"
            );
            Ok(MeasurementResult {
                handle,
                record,
                total_latency_ns,
                cancel_latency_ns,
            })
        }
        Wait::Done(Err(message), _) => {
            fail(FailureReason::CancelRejected(message), record, OrderState::Placed(handle))
        }
        Wait::Dropped => fail(
            FailureReason::AckDropped(Phase::Cancel),
            record,
            OrderState::Unknown(Some(handle)),
        ),
        Wait::TimedOut => fail(
            FailureReason::CancelTimeout,
            record,
            OrderState::Unknown(Some(handle)),
        ),
        Wait::Interrupted => fail(
            FailureReason::Interrupted(Phase::Cancel),
            record,
            OrderState::Unknown(Some(handle)),
        ),
    }
}

async fn await_ack<T>(
    rx: AckReceiver<T>,
    limit: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> Wait<T> {
    tokio::select! {
        res = tokio::time::timeout(limit, rx) => match res {
            Ok(Ok(acked)) => Wait::Done(acked.value, acked.at),
            Ok(Err(_)) => Wait::Dropped,
            Err(_) => Wait::TimedOut,
        },
        _ = shutdown_requested(shutdown) => Wait::Interrupted,
    }
}

/// Resolves once the flag is true. Never resolves if the sender is gone.
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
