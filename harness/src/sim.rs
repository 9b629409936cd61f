//! In-process broker stand-in.
//!
//! Acknowledges, rejects, or ignores requests after configurable delays so the
//! driver can be exercised without a live broker. Call counts are shared
//! through [`SimStats`] and stay readable after the adapter moves.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::adapter::{AdapterError, BrokerAdapter, CancelAck, SubmitAck};
use crate::types::{Credentials, OrderHandle, OrderRequest};

/// How the simulated broker answers one kind of request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckBehavior {
    Ack { after: Duration },
    Reject { after: Duration, message: String },
    /// Never answers. The ack is held until the adapter is dropped or the
    /// waiting side gives up.
    Silent,
}

impl AckBehavior {
    pub fn ack_after_ms(ms: u64) -> Self {
        AckBehavior::Ack {
            after: Duration::from_millis(ms),
        }
    }

    pub fn reject(message: impl Into<String>) -> Self {
        AckBehavior::Reject {
            after: Duration::ZERO,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimBehavior {
    pub connect_fails: bool,
    pub login_fails: bool,
    pub submit: AckBehavior,
    pub cancel: AckBehavior,
    /// Upper bound of uniform noise added to every ack delay.
    pub jitter: Duration,
    pub seed: u64,
}

impl Default for SimBehavior {
    fn default() -> Self {
        Self {
            connect_fails: false,
            login_fails: false,
            submit: AckBehavior::ack_after_ms(6),
            cancel: AckBehavior::ack_after_ms(0),
            jitter: Duration::ZERO,
            seed: 0x9E37_79B9_7F4A_7C15,
        }
    }
}

/// Side-effect counters.
#[derive(Debug, Default)]
pub struct SimStats {
    connects: AtomicU32,
    logins: AtomicU32,
    submits: AtomicU32,
    cancels: AtomicU32,
    disconnects: AtomicU32,
}

impl SimStats {
    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::Relaxed)
    }

    pub fn logins(&self) -> u32 {
        self.logins.load(Ordering::Relaxed)
    }

    pub fn submits(&self) -> u32 {
        self.submits.load(Ordering::Relaxed)
    }

    pub fn cancels(&self) -> u32 {
        self.cancels.load(Ordering::Relaxed)
    }

    pub fn disconnects(&self) -> u32 {
        self.disconnects.load(Ordering::Relaxed)
    }
}

pub struct SimulatedAdapter {
    name: String,
    behavior: SimBehavior,
    connected: bool,
    logged_in: bool,
    next_order: u64,
    rng: u64,
    open_orders: HashSet<String>,
    held_submits: Vec<SubmitAck>,
    held_cancels: Vec<CancelAck>,
    stats: Arc<SimStats>,
}

impl SimulatedAdapter {
    pub fn new(behavior: SimBehavior) -> Self {
        Self::named("sim", behavior)
    }

    pub fn named(name: impl Into<String>, behavior: SimBehavior) -> Self {
        let rng = behavior.seed.max(1);
        Self {
            name: name.into(),
            behavior,
            connected: false,
            logged_in: false,
            next_order: 1,
            rng,
            open_orders: HashSet::new(),
            held_submits: Vec::new(),
            held_cancels: Vec::new(),
            stats: Arc::new(SimStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<SimStats> {
        Arc::clone(&self.stats)
    }

    /// Orders acknowledged and not yet cancelled.
    pub fn open_orders(&self) -> usize {
        self.open_orders.len()
    }

    // xorshift64: deterministic noise for the lab without pulling in an RNG
    fn next_jitter(&mut self) -> Duration {
        let max = self.behavior.jitter.as_nanos() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        self.rng ^= self.rng << 13;
        self.rng ^= self.rng >> 7;
        self.rng ^= self.rng << 17;
        Duration::from_nanos(self.rng % (max + 1))
    }

    fn ensure_session(&self) -> Result<(), AdapterError> {
        if self.connected && self.logged_in {
            Ok(())
        } else {
            Err(AdapterError::NotConnected)
        }
    }
}

#[async_trait]
impl BrokerAdapter for SimulatedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<(), AdapterError> {
        if self.connected {
            return Ok(());
        }
        self.stats.connects.fetch_add(1, Ordering::Relaxed);
        if self.behavior.connect_fails {
            return Err(AdapterError::Connect("simulated gateway unreachable".into()));
        }
        self.connected = true;
        debug!(adapter = %self.name, "connected");
        Ok(())
    }

    async fn login(&mut self, credentials: &Credentials) -> Result<(), AdapterError> {
        if !self.connected {
            return Err(AdapterError::NotConnected);
        }
        self.stats.logins.fetch_add(1, Ordering::Relaxed);
        if self.behavior.login_fails {
            return Err(AdapterError::Auth(format!(
                "credentials rejected for {}",
                credentials.user_id
            )));
        }
        self.logged_in = true;
        debug!(adapter = %self.name, user = %credentials.user_id, "logged in");
        Ok(())
    }

    fn submit_order(&mut self, request: &OrderRequest, ack: SubmitAck) -> Result<(), AdapterError> {
        self.ensure_session()?;
        self.stats.submits.fetch_add(1, Ordering::Relaxed);

        let seq = self.next_order;
        self.next_order += 1;
        let handle = OrderHandle {
            order_id: format!("SIM{:06}", seq),
            ticket_id: format!("T{}-{}", seq, request.symbol),
        };

        let (delay, outcome) = match &self.behavior.submit {
            AckBehavior::Ack { after } => {
                self.open_orders.insert(handle.order_id.clone());
                (*after, Ok(handle))
            }
            AckBehavior::Reject { after, message } => (*after, Err(message.clone())),
            AckBehavior::Silent => {
                self.held_submits.retain(|held| !held.is_closed());
                self.held_submits.push(ack);
                return Ok(());
            }
        };
        let delay = delay + self.next_jitter();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            ack.send(outcome);
        });
        Ok(())
    }

    fn cancel_order(
        &mut self,
        handle: &OrderHandle,
        _request: &OrderRequest,
        ack: CancelAck,
    ) -> Result<(), AdapterError> {
        self.ensure_session()?;
        self.stats.cancels.fetch_add(1, Ordering::Relaxed);

        let (delay, outcome) = match &self.behavior.cancel {
            AckBehavior::Ack { after } => {
                if self.open_orders.remove(&handle.order_id) {
                    (*after, Ok(()))
                } else {
                    (*after, Err(format!("order {} not found", handle.order_id)))
                }
            }
            AckBehavior::Reject { after, message } => (*after, Err(message.clone())),
            AckBehavior::Silent => {
                self.held_cancels.retain(|held| !held.is_closed());
                self.held_cancels.push(ack);
                return Ok(());
            }
        };
        let delay = delay + self.next_jitter();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            ack.send(outcome);
        });
        Ok(())
    }

    async fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        self.logged_in = false;
        self.stats.disconnects.fetch_add(1, Ordering::Relaxed);
        debug!(adapter = %self.name, "disconnected");
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;
    use rust_decimal::Decimal;

    fn request() -> OrderRequest {
        OrderRequest::limit("2330", Side::Buy, 1, Decimal::from(500))
    }

    async fn session(behavior: SimBehavior) -> SimulatedAdapter {
        let mut sim = SimulatedAdapter::new(behavior);
        sim.connect().await.unwrap();
        sim.login(&Credentials::default()).await.unwrap();
        sim
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let mut sim = session(SimBehavior::default()).await;
        let stats = sim.stats();

        sim.disconnect().await;
        sim.disconnect().await;

        assert!(!sim.is_connected());
        assert_eq!(stats.disconnects(), 1);
    }

    #[tokio::test]
    async fn disconnect_before_connect_is_harmless() {
        let mut sim = SimulatedAdapter::new(SimBehavior::default());
        sim.disconnect().await;
        assert_eq!(sim.stats().disconnects(), 0);
    }

    #[tokio::test]
    async fn connect_twice_opens_one_session() {
        let mut sim = SimulatedAdapter::new(SimBehavior::default());
        sim.connect().await.unwrap();
        sim.connect().await.unwrap();
        assert_eq!(sim.stats().connects(), 1);
    }

    #[tokio::test]
    async fn submit_requires_login() {
        let mut sim = SimulatedAdapter::new(SimBehavior::default());
        sim.connect().await.unwrap();
        let (ack, _rx) = SubmitAck::channel();
        assert_eq!(sim.submit_order(&request(), ack), Err(AdapterError::NotConnected));
        assert_eq!(sim.stats().submits(), 0);
    }

    #[tokio::test]
    async fn login_failure_is_auth_error() {
        let mut sim = SimulatedAdapter::new(SimBehavior {
            login_fails: true,
            ..SimBehavior::default()
        });
        sim.connect().await.unwrap();
        let creds = Credentials {
            user_id: "A123".into(),
            ..Credentials::default()
        };
        assert!(matches!(sim.login(&creds).await, Err(AdapterError::Auth(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn acked_order_can_be_cancelled_once() {
        let mut sim = session(SimBehavior::default()).await;

        let (ack, rx) = SubmitAck::channel();
        sim.submit_order(&request(), ack).unwrap();
        let handle = rx.await.unwrap().value.unwrap();
        assert_eq!(handle.order_id, "SIM000001");
        assert_eq!(sim.open_orders(), 1);

        let (ack, rx) = CancelAck::channel();
        sim.cancel_order(&handle, &request(), ack).unwrap();
        assert_eq!(rx.await.unwrap().value, Ok(()));

        let (ack, rx) = CancelAck::channel();
        sim.cancel_order(&handle, &request(), ack).unwrap();
        assert!(rx.await.unwrap().value.is_err());
        assert_eq!(sim.open_orders(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_submit_keeps_channel_open() {
        let mut sim = session(SimBehavior {
            submit: AckBehavior::Silent,
            ..SimBehavior::default()
        })
        .await;

        let (ack, mut rx) = SubmitAck::channel();
        sim.submit_order(&request(), ack).unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::oneshot::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn silent_broker_drops_acks_nobody_waits_for() {
        let mut sim = session(SimBehavior {
            submit: AckBehavior::Silent,
            cancel: AckBehavior::Silent,
            ..SimBehavior::default()
        })
        .await;

        for _ in 0..100 {
            let (ack, rx) = SubmitAck::channel();
            sim.submit_order(&request(), ack).unwrap();
            drop(rx);
        }
        assert_eq!(sim.held_submits.len(), 1);

        let (ack, _rx) = SubmitAck::channel();
        sim.submit_order(&request(), ack).unwrap();
        let (ack, _still_waiting) = SubmitAck::channel();
        sim.submit_order(&request(), ack).unwrap();
        assert_eq!(sim.held_submits.len(), 2);

        let handle = OrderHandle {
            order_id: "SIM000001".into(),
            ticket_id: "T1-2330".into(),
        };
        for _ in 0..100 {
            let (ack, rx) = CancelAck::channel();
            sim.cancel_order(&handle, &request(), ack).unwrap();
            drop(rx);
        }
        assert_eq!(sim.held_cancels.len(), 1);
    }

    #[test]
    fn jitter_stays_within_bound() {
        let mut sim = SimulatedAdapter::new(SimBehavior {
            jitter: Duration::from_millis(2),
            seed: 42,
            ..SimBehavior::default()
        });
        for _ in 0..1_000 {
            assert!(sim.next_jitter() <= Duration::from_millis(2));
        }
    }
}
