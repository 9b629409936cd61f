use anyhow::bail;
use harness::{BrokerAdapter, HarnessConfig, SimulatedAdapter};

/// Adapters this build can drive.
pub const KNOWN_BROKERS: &[&str] = &["sim"];

/// Builds the adapter selected with `--broker`.
pub fn build(name: &str, config: &HarnessConfig) -> anyhow::Result<Box<dyn BrokerAdapter>> {
    match name {
        "sim" => Ok(Box::new(SimulatedAdapter::named(name, config.sim.behavior()))),
        other => bail!(
            "no adapter for broker {:?} in this build (available: {})",
            other,
            KNOWN_BROKERS.join(", ")
        ),
    }
}
