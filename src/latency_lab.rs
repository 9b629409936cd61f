//! Measurement runs against the simulated broker.
//!
//! - Recorder overhead per checkpoint
//! - Round trips across broker profiles, with measured vs configured delay
//! - Behaviour under a broker that never answers

use harness::stats::fmt_ms;
use harness::{
    run_cycle, AckBehavior, BrokerAdapter, Checkpoint, Credentials, CyclePolicy, LatencyStats,
    OrderRequest, Side, SimBehavior, SimulatedAdapter, TimingRecord,
};
use std::time::{Duration, Instant};

pub const CYCLES_PER_PROFILE: usize = 50;

/// A simulated broker with a nominal ack delay and uniform jitter on top.
pub struct Profile {
    pub name: &'static str,
    pub submit_ms: u64,
    pub cancel_ms: u64,
    pub jitter_ms: u64,
}

pub const PROFILES: &[Profile] = &[
    Profile {
        name: "colocated",
        submit_ms: 1,
        cancel_ms: 1,
        jitter_ms: 0,
    },
    Profile {
        name: "typical",
        submit_ms: 6,
        cancel_ms: 4,
        jitter_ms: 3,
    },
    Profile {
        name: "congested",
        submit_ms: 25,
        cancel_ms: 15,
        jitter_ms: 20,
    },
];

fn lab_request() -> OrderRequest {
    OrderRequest::limit("2330", Side::Buy, 1, 500.into())
}

/// Short settle so many cycles fit in a run.
fn lab_policy() -> CyclePolicy {
    CyclePolicy {
        settle_delay: Duration::from_millis(5),
        ..CyclePolicy::default()
    }
}

async fn logged_in(behavior: SimBehavior) -> SimulatedAdapter {
    let mut sim = SimulatedAdapter::new(behavior);
    if let Err(e) = sim.connect().await {
        println!("  connect failed: {}", e);
    }
    if let Err(e) = sim.login(&Credentials::default()).await {
        println!("  login failed: {}", e);
    }
    sim
}

/// Cost of stamping checkpoints and reading an elapsed time.
pub fn run_recorder_overhead() {
    println!(" Recorder Overhead");

    let iterations = 1_000_000;
    let start = Instant::now();
    for _ in 0..iterations {
        let mut record = TimingRecord::new();
        record.mark(Checkpoint::Start);
        record.mark(Checkpoint::SubmitAck);
        record.mark(Checkpoint::CancelAck);
        std::hint::black_box(record.elapsed(Checkpoint::Start, Checkpoint::CancelAck).ok());
    }
    let per_record = start.elapsed().as_nanos() as f64 / iterations as f64;

    println!("  Three checkpoints + elapsed: {:.2} ns/record", per_record);
    println!("  Per checkpoint: {:.2} ns\n", per_record / 3.0);
}

pub async fn run_profiles() {
    println!(" Broker Profiles ({} cycles each)", CYCLES_PER_PROFILE);

    for (i, profile) in PROFILES.iter().enumerate() {
        let behavior = SimBehavior {
            submit: AckBehavior::ack_after_ms(profile.submit_ms),
            cancel: AckBehavior::ack_after_ms(profile.cancel_ms),
            jitter: Duration::from_millis(profile.jitter_ms),
            seed: 0x9E37_79B9 + i as u64,
            ..SimBehavior::default()
        };
        let mut sim = logged_in(behavior).await;
        let policy = lab_policy();
        let request = lab_request();

        let mut submit = Vec::with_capacity(CYCLES_PER_PROFILE);
        let mut cancel = Vec::with_capacity(CYCLES_PER_PROFILE);
        let mut failures = 0;
        for _ in 0..CYCLES_PER_PROFILE {
            match run_cycle(&mut sim, &request, &policy).await {
                Ok(result) => {
                    submit.push(result.total_latency_ns);
                    cancel.push(result.cancel_latency_ns - policy.settle_delay.as_nanos() as i64);
                }
                Err(_) => failures += 1,
            }
        }
        sim.disconnect().await;

        println!("  {}:", profile.name);
        print_stats("submit", profile.submit_ms, profile.jitter_ms, submit);
        print_stats("cancel", profile.cancel_ms, profile.jitter_ms, cancel);
        if failures > 0 {
            println!("    failures: {}", failures);
        }
    }
    println!();
}

fn print_stats(label: &str, nominal_ms: u64, jitter_ms: u64, samples: Vec<i64>) {
    let Some(stats) = LatencyStats::from_samples(samples) else {
        println!("    {}: no samples", label);
        return;
    };
    let expected_ms = nominal_ms as f64 + jitter_ms as f64 / 2.0;
    println!(
        "    {}: p50 {}  p99 {}  mean {:.3} ms (expected ~{:.1} ms, overhead {:+.3} ms)",
        label,
        fmt_ms(stats.p50_ns),
        fmt_ms(stats.p99_ns),
        stats.mean_ms(),
        expected_ms,
        stats.mean_ms() - expected_ms
    );
}

/// A broker that swallows every submit: each cycle should end at the timeout.
pub async fn run_silent_broker() {
    println!(" Silent Broker");

    let mut sim = logged_in(SimBehavior {
        submit: AckBehavior::Silent,
        ..SimBehavior::default()
    })
    .await;
    let policy = CyclePolicy {
        submit_timeout: Duration::from_millis(50),
        ..lab_policy()
    };

    let request = lab_request();
    for _ in 0..3 {
        let started = Instant::now();
        match run_cycle(&mut sim, &request, &policy).await {
            Ok(_) => println!("  unexpected success"),
            Err(failure) => println!(
                "  {} after {:.1} ms, order {}",
                failure.reason.code(),
                started.elapsed().as_secs_f64() * 1_000.0,
                failure.order_state
            ),
        }
    }
    sim.disconnect().await;
    println!();
}
