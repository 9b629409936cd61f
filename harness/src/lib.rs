//! Order round-trip latency measurement against broker APIs.
//!
//! One measurement cycle:
//! - submit a limit order and time it until the broker acknowledges
//! - wait a configurable settle delay
//! - cancel it and time that acknowledgement
//!
//! Brokers plug in behind [`BrokerAdapter`]; [`SimulatedAdapter`] stands in
//! for a real SDK in tests and the lab binary.

pub mod adapter;
pub mod config;
pub mod driver;
pub mod report;
pub mod sim;
pub mod stats;
pub mod timing;
pub mod types;

pub use adapter::{AdapterError, BrokerAdapter, CancelAck, Capabilities, SubmitAck};
pub use config::{ConfigError, HarnessConfig};
pub use driver::{
    run_cycle, run_cycle_with_shutdown, shutdown_requested, CycleFailure, CycleOutcome,
    CyclePolicy, FailureReason, MeasurementResult, OrderState,
};
pub use report::{format_lines, parse_markers, LatencyReport, Reporter};
pub use sim::{AckBehavior, SimBehavior, SimulatedAdapter};
pub use stats::LatencyStats;
pub use timing::{Checkpoint, TimingRecord};
pub use types::{Credentials, OrderHandle, OrderRequest, Side};
