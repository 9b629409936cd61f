use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use harness::report::parse_markers;
use harness::stats::fmt_ms;
use harness::{BrokerAdapter, HarnessConfig, LatencyStats, Reporter};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod broker;
mod forward;
mod schedule;
mod session;

use forward::Forwarder;
use schedule::TradingWindow;
use session::{Sink, WatchPlan};

#[derive(Parser)]
#[command(name = "orderlat-cli")]
#[command(about = "Measures order submit and cancel round trips against a broker")]
struct Cli {
    #[arg(short, long, default_value = "order_config.toml", global = true)]
    config: PathBuf,
    /// Suppress checkpoint and latency lines
    #[arg(long, global = true)]
    no_timing: bool,
    #[arg(short, long, default_value = "sim", global = true)]
    broker: String,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Place and cancel one order (default)
    Run,
    /// Measure repeatedly inside the configured trading window
    Watch,
    /// Validate the config and print the order it describes
    Check,
    /// Latency statistics from captured run logs
    Summarize {
        #[arg(required = true)]
        logs: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match &cli.command {
        None | Some(Commands::Run) => run(&cli).await,
        Some(Commands::Watch) => watch_window(&cli).await,
        Some(Commands::Check) => check(&cli),
        Some(Commands::Summarize { logs }) => summarize(logs),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

fn load(cli: &Cli) -> anyhow::Result<HarnessConfig> {
    HarnessConfig::load(&cli.config).with_context(|| format!("loading {}", cli.config.display()))
}

/// Shutdown flag flipped by Ctrl-C.
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, abandoning in-flight work");
            let _ = tx.send(true);
        }
    });
    rx
}

fn sink(
    cli: &Cli,
    config: &HarnessConfig,
    adapter: &dyn BrokerAdapter,
) -> anyhow::Result<Sink<std::io::Stderr>> {
    let forwarder = config
        .api
        .as_ref()
        .map(Forwarder::from_config)
        .transpose()
        .context("building report client")?;
    let broker = forwarder
        .as_ref()
        .map(|f| f.broker().to_string())
        .unwrap_or_else(|| adapter.name().to_string());
    Ok(Sink {
        reporter: Reporter::stderr(!cli.no_timing),
        forwarder,
        broker,
    })
}

async fn run(cli: &Cli) -> anyhow::Result<bool> {
    let config = load(cli)?;
    let request = config.order_request()?;
    let mut adapter = broker::build(&cli.broker, &config)?;
    let mut sink = sink(cli, &config, adapter.as_ref())?;
    let mut shutdown = shutdown_on_ctrl_c();

    if let Err(e) = session::open(adapter.as_mut(), &config, &mut shutdown).await {
        adapter.disconnect().await;
        return Err(e);
    }

    let policy = config.policy();
    let ok = session::measure(adapter.as_mut(), &request, &policy, shutdown, &mut sink).await;
    adapter.disconnect().await;
    info!(broker = adapter.name(), "disconnected");
    Ok(ok)
}

async fn watch_window(cli: &Cli) -> anyhow::Result<bool> {
    let config = load(cli)?;
    let schedule = config
        .schedule
        .as_ref()
        .context("watch needs a [schedule] section")?;
    let request = config.order_request()?;
    let plan = WatchPlan {
        window: TradingWindow::from_config(schedule)?,
        interval: schedule.interval(),
        request: &request,
        policy: config.policy(),
    };
    let mut adapter = broker::build(&cli.broker, &config)?;
    let mut sink = sink(cli, &config, adapter.as_ref())?;
    let mut shutdown = shutdown_on_ctrl_c();

    if let Err(e) = session::open(adapter.as_mut(), &config, &mut shutdown).await {
        adapter.disconnect().await;
        return Err(e);
    }

    let summary =
        session::repeat(adapter.as_mut(), &plan, &mut shutdown, &mut sink, Utc::now).await;

    adapter.disconnect().await;
    info!(cycles = summary.cycles, failures = summary.failures, "watch stopped");
    Ok(summary.succeeded())
}

fn check(cli: &Cli) -> anyhow::Result<bool> {
    let config = load(cli)?;
    let request = config.order_request()?;
    let policy = config.policy();

    println!("order:    {}", request);
    println!("account:  {}", config.user.account);
    println!(
        "timeouts: submit {:?}, cancel {:?}, settle {:?}",
        policy.submit_timeout, policy.cancel_timeout, policy.settle_delay
    );
    if let Some(api) = &config.api {
        println!("reports:  {} as {}", api.url, api.broker_name);
    }
    if let Some(schedule) = &config.schedule {
        println!(
            "schedule: {}-{} every {}s (UTC+8)",
            schedule.start_time, schedule.end_time, schedule.interval_seconds
        );
    }
    Ok(true)
}

fn summarize(logs: &[PathBuf]) -> anyhow::Result<bool> {
    let mut samples = Vec::new();
    for path in logs {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        match parse_markers(&text) {
            Some(markers) => samples.push(markers.total_ns as i64),
            None => warn!(log = %path.display(), "no complete timing markers"),
        }
    }

    let stats = LatencyStats::from_samples(samples).context("no log contained timing markers")?;
    println!("samples: {}", stats.count);
    println!("min:     {}", fmt_ms(stats.min_ns));
    println!("mean:    {:.3} ms", stats.mean_ms());
    println!("p50:     {}", fmt_ms(stats.p50_ns));
    println!("p90:     {}", fmt_ms(stats.p90_ns));
    println!("p99:     {}", fmt_ms(stats.p99_ns));
    println!("max:     {}", fmt_ms(stats.max_ns));
    Ok(true)
}
