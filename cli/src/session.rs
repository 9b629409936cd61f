//! Connection lifecycle around measurement cycles.

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use harness::{
    run_cycle_with_shutdown, shutdown_requested, BrokerAdapter, CyclePolicy, HarnessConfig,
    LatencyReport, OrderRequest, Reporter,
};
use std::io::Write;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::forward::Forwarder;
use crate::schedule::TradingWindow;

/// Connects and logs in, pausing after each step as configured.
pub async fn open<A>(
    adapter: &mut A,
    config: &HarnessConfig,
    shutdown: &mut watch::Receiver<bool>,
) -> anyhow::Result<()>
where
    A: BrokerAdapter + ?Sized,
{
    adapter
        .connect()
        .await
        .with_context(|| format!("connecting to {}", adapter.name()))?;
    info!(
        broker = adapter.name(),
        concurrent_orders = adapter.capabilities().concurrent_orders,
        "connected"
    );
    if pause(config.connect_delay(), shutdown).await {
        bail!("interrupted before login");
    }

    adapter
        .login(&config.user)
        .await
        .with_context(|| format!("logging in as {}", config.user.user_id))?;
    info!(broker = adapter.name(), user = %config.user.user_id, "logged in");
    if pause(config.login_delay(), shutdown).await {
        bail!("interrupted before the first order");
    }
    Ok(())
}

/// Sleeps for `duration`. Returns true if shutdown was requested first.
pub async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown_requested(shutdown) => true,
    }
}

/// Where each finished cycle goes.
pub struct Sink<W: Write> {
    pub reporter: Reporter<W>,
    pub forwarder: Option<Forwarder>,
    pub broker: String,
}

/// One cycle, reported and forwarded. Returns whether it succeeded.
pub async fn measure<A, W>(
    adapter: &mut A,
    request: &OrderRequest,
    policy: &CyclePolicy,
    shutdown: watch::Receiver<bool>,
    sink: &mut Sink<W>,
) -> bool
where
    A: BrokerAdapter + ?Sized,
    W: Write,
{
    let outcome = run_cycle_with_shutdown(adapter, request, policy, shutdown).await;

    if let Err(e) = sink.reporter.emit(&outcome) {
        warn!(error = %e, "could not write cycle report");
    }
    if let Some(forwarder) = &sink.forwarder {
        let report = LatencyReport::from_outcome(&sink.broker, request, &outcome);
        forwarder.forward(&report).await;
    }

    match &outcome {
        Ok(result) => {
            info!(
                order_id = %result.handle.order_id,
                total_ns = result.total_latency_ns,
                cancel_ns = result.cancel_latency_ns,
                "cycle complete"
            );
            true
        }
        Err(failure) => {
            warn!(reason = %failure.reason, state = %failure.order_state, "cycle failed");
            false
        }
    }
}

/// What [`repeat`] measures and how often.
pub struct WatchPlan<'a> {
    pub window: TradingWindow,
    pub interval: Duration,
    pub request: &'a OrderRequest,
    pub policy: CyclePolicy,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WatchSummary {
    pub cycles: u64,
    pub failures: u64,
}

impl WatchSummary {
    pub fn succeeded(&self) -> bool {
        self.failures == 0
    }
}

/// Runs one cycle per interval while the window is open and sleeps through
/// closed hours. Failed cycles are counted, not fatal. Returns on shutdown.
pub async fn repeat<A, W, C>(
    adapter: &mut A,
    plan: &WatchPlan<'_>,
    shutdown: &mut watch::Receiver<bool>,
    sink: &mut Sink<W>,
    now: C,
) -> WatchSummary
where
    A: BrokerAdapter + ?Sized,
    W: Write,
    C: Fn() -> DateTime<Utc>,
{
    let mut summary = WatchSummary::default();
    loop {
        let wait = plan.window.until_open(now());
        if !wait.is_zero() {
            info!(wait_secs = wait.as_secs(), "outside trading window");
            if pause(wait, shutdown).await {
                break;
            }
            continue;
        }

        summary.cycles += 1;
        let ok = measure(adapter, plan.request, &plan.policy, shutdown.clone(), sink).await;
        if !ok {
            summary.failures += 1;
        }
        if pause(plan.interval, shutdown).await {
            break;
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};
    use harness::{AckBehavior, SimBehavior, SimulatedAdapter};

    const CONFIG: &str = r#"
[user]
user_id = "A123456789"
password = "secret"
account = "9800-0012345"
cert_path = "/certs/A123456789.pfx"
cert_password = "pfx"

[order]
symbol = "2330"
price = "500"
quantity = 1
market = "TSE"
order_board = "RoundLot"
funding_type = "Cash"
side = "Buy"
order_type = "Limit"
time_in_force = "ROD"
daytrade_shortsell = "N"
"#;

    fn sink() -> Sink<Vec<u8>> {
        Sink {
            reporter: Reporter::new(Vec::new(), true),
            forwarder: None,
            broker: "sim".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn open_waits_after_connect_and_login() {
        let config = HarnessConfig::from_toml_str(CONFIG).unwrap();
        let mut sim = SimulatedAdapter::new(SimBehavior::default());
        let (_tx, mut rx) = watch::channel(false);

        let started = tokio::time::Instant::now();
        open(&mut sim, &config, &mut rx).await.unwrap();

        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(2) && waited < Duration::from_millis(2_010));
        assert!(sim.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_login_names_the_user() {
        let config = HarnessConfig::from_toml_str(CONFIG).unwrap();
        let mut sim = SimulatedAdapter::new(SimBehavior {
            login_fails: true,
            ..SimBehavior::default()
        });
        let (_tx, mut rx) = watch::channel(false);

        let err = open(&mut sim, &config, &mut rx).await.unwrap_err();
        assert!(format!("{:#}", err).contains("A123456789"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cuts_the_connect_pause() {
        let config = HarnessConfig::from_toml_str(CONFIG).unwrap();
        let mut sim = SimulatedAdapter::new(SimBehavior::default());
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();

        assert!(open(&mut sim, &config, &mut rx).await.is_err());
        assert_eq!(sim.stats().logins(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_returns_early_on_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            let _ = tx.send(true);
        });

        let started = tokio::time::Instant::now();
        assert!(pause(Duration::from_secs(60), &mut rx).await);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_sleeps_when_nobody_can_signal() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        assert!(!pause(Duration::from_secs(5), &mut rx).await);
    }

    #[tokio::test(start_paused = true)]
    async fn measure_emits_lines_and_reports_success() {
        let config = HarnessConfig::from_toml_str(CONFIG).unwrap();
        let request = config.order_request().unwrap();
        let mut sim = SimulatedAdapter::new(SimBehavior::default());
        let (_tx, mut rx) = watch::channel(false);
        open(&mut sim, &config, &mut rx).await.unwrap();

        let mut sink = sink();
        assert!(measure(&mut sim, &request, &config.policy(), rx, &mut sink).await);

        let text = String::from_utf8(sink.reporter.into_inner()).unwrap();
        assert!(text.contains("===START="));
        assert!(text.contains("RESULT=ok ORDER_ID=SIM000001"));
    }

    #[tokio::test(start_paused = true)]
    async fn measure_reports_silent_broker_as_failure() {
        let config = HarnessConfig::from_toml_str(CONFIG).unwrap();
        let request = config.order_request().unwrap();
        let mut sim = SimulatedAdapter::new(SimBehavior {
            submit: AckBehavior::Silent,
            ..SimBehavior::default()
        });
        let (_tx, mut rx) = watch::channel(false);
        open(&mut sim, &config, &mut rx).await.unwrap();

        let mut sink = sink();
        assert!(!measure(&mut sim, &request, &config.policy(), rx, &mut sink).await);

        let text = String::from_utf8(sink.reporter.into_inner()).unwrap();
        assert!(text.contains("FAILURE=submit_timeout"));
        assert!(text.contains("ORDER_STATE=unknown"));
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    // 10:00 in Taipei on Wednesday 2024-06-05
    fn wednesday_morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 5, 2, 0, 0).unwrap()
    }

    fn shutdown_after(secs: u64) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            let _ = tx.send(true);
        });
        rx
    }

    async fn logged_in(behavior: SimBehavior) -> (SimulatedAdapter, HarnessConfig) {
        let config = HarnessConfig::from_toml_str(CONFIG).unwrap();
        let mut sim = SimulatedAdapter::new(behavior);
        let (_tx, mut rx) = watch::channel(false);
        open(&mut sim, &config, &mut rx).await.unwrap();
        (sim, config)
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_measures_every_interval_until_shutdown() {
        let (mut sim, config) = logged_in(SimBehavior::default()).await;
        let request = config.order_request().unwrap();
        let plan = WatchPlan {
            window: TradingWindow::new(hm(9, 0), hm(13, 30), true),
            interval: Duration::from_secs(10),
            request: &request,
            policy: config.policy(),
        };
        let mut rx = shutdown_after(25);
        let mut sink = sink();

        let summary = repeat(&mut sim, &plan, &mut rx, &mut sink, wednesday_morning).await;

        assert_eq!(summary, WatchSummary { cycles: 3, failures: 0 });
        assert!(summary.succeeded());
        assert_eq!(sim.stats().submits(), 3);
        assert_eq!(sim.stats().cancels(), 3);
        let text = String::from_utf8(sink.reporter.into_inner()).unwrap();
        assert_eq!(text.matches("RESULT=ok").count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_keeps_going_after_rejections() {
        let (mut sim, config) = logged_in(SimBehavior {
            submit: AckBehavior::reject("insufficient margin"),
            ..SimBehavior::default()
        })
        .await;
        let request = config.order_request().unwrap();
        let plan = WatchPlan {
            window: TradingWindow::new(hm(9, 0), hm(13, 30), true),
            interval: Duration::from_secs(10),
            request: &request,
            policy: config.policy(),
        };
        let mut rx = shutdown_after(25);
        let mut sink = sink();

        let summary = repeat(&mut sim, &plan, &mut rx, &mut sink, wednesday_morning).await;

        assert_eq!(summary, WatchSummary { cycles: 3, failures: 3 });
        assert!(!summary.succeeded());
        assert_eq!(sim.stats().cancels(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_sends_nothing_while_the_window_is_closed() {
        let (mut sim, config) = logged_in(SimBehavior::default()).await;
        let request = config.order_request().unwrap();
        let plan = WatchPlan {
            window: TradingWindow::new(hm(9, 0), hm(13, 30), true),
            interval: Duration::from_secs(10),
            request: &request,
            policy: config.policy(),
        };
        // Saturday 10:00 in Taipei
        let saturday = || Utc.with_ymd_and_hms(2024, 6, 8, 2, 0, 0).unwrap();
        let mut rx = shutdown_after(60);
        let mut sink = sink();

        let summary = repeat(&mut sim, &plan, &mut rx, &mut sink, saturday).await;

        assert_eq!(summary, WatchSummary::default());
        assert_eq!(sim.stats().submits(), 0);
    }
}
