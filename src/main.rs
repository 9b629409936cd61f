//! Order latency lab
//!
//! Runs measurement cycles against the simulated broker, then one annotated
//! cycle with the full one-second settle and its report lines.

use harness::{
    run_cycle, BrokerAdapter, Credentials, CyclePolicy, OrderRequest, Reporter, Side, SimBehavior,
    SimulatedAdapter,
};
use tracing_subscriber::EnvFilter;

mod latency_lab;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    println!("=== Order Latency Lab ===");

    latency_lab::run_recorder_overhead();
    latency_lab::run_profiles().await;
    latency_lab::run_silent_broker().await;

    println!("=== Demo Cycle ===");
    run_demo_cycle().await;
}

/// One cycle with default timing: 6 ms submit ack, 1 s settle, immediate cancel ack.
async fn run_demo_cycle() {
    let mut sim = SimulatedAdapter::named("demo", SimBehavior::default());
    let credentials = Credentials {
        user_id: "A123456789".into(),
        ..Credentials::default()
    };

    if let Err(e) = sim.connect().await {
        println!("Connect failed: {}", e);
        return;
    }
    if let Err(e) = sim.login(&credentials).await {
        println!("Login failed: {}", e);
        sim.disconnect().await;
        return;
    }

    let request = OrderRequest::limit("2330", Side::Buy, 1, 500.into());
    println!("Submitting: {}", request);

    let outcome = run_cycle(&mut sim, &request, &CyclePolicy::default()).await;
    match &outcome {
        Ok(result) => {
            println!("Order {} placed and cancelled", result.handle);
            println!("Submit round trip: {:.3} ms", result.total_latency_ns as f64 / 1e6);
            // includes the settle delay
            println!("Submit ack to cancel ack: {:.3} ms", result.cancel_latency_ns as f64 / 1e6);
        }
        Err(failure) => println!("Cycle failed: {} ({})", failure.reason, failure.order_state),
    }

    println!("Report lines:");
    let mut reporter = Reporter::new(std::io::stdout(), true);
    if let Err(e) = reporter.emit(&outcome) {
        println!("Could not write report: {}", e);
    }

    sim.disconnect().await;
}
