//! Capability set every broker wrapper exposes to the driver.
//!
//! Broker SDKs report order results through callbacks. Here the callback is
//! an [`Ack`]: a single-shot sender the adapter consumes when the broker
//! answers. The driver keeps the receiving end and waits on it with a timeout.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::types::{Credentials, OrderHandle, OrderRequest};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("login failed: {0}")]
    Auth(String),
    #[error("not connected")]
    NotConnected,
    /// The SDK refused the call synchronously; nothing reached the broker.
    #[error("request refused: {0}")]
    Request(String),
}

/// What the broker answered for a submission: the handle, or its rejection text.
pub type SubmitResult = Result<OrderHandle, String>;
/// What the broker answered for a cancel.
pub type CancelResult = Result<(), String>;

pub type SubmitAck = Ack<SubmitResult>;
pub type CancelAck = Ack<CancelResult>;

/// A delivered result, stamped when the adapter handed it over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acked<T> {
    pub value: T,
    pub at: Instant,
}

pub type AckReceiver<T> = oneshot::Receiver<Acked<T>>;

/// One-shot result slot handed to the adapter with each request.
#[derive(Debug)]
pub struct Ack<T> {
    tx: oneshot::Sender<Acked<T>>,
}

impl<T> Ack<T> {
    pub fn channel() -> (Self, AckReceiver<T>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Delivers the result, timestamped now. Returns false when the driver is
    /// no longer waiting (it timed out or was interrupted).
    pub fn send(self, value: T) -> bool {
        let at = Instant::now();
        self.tx.send(Acked { value, at }).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Broker-dependent features the driver must not assume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Several cycles may share one connection at the same time.
    pub concurrent_orders: bool,
}

#[async_trait]
pub trait BrokerAdapter: Send {
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Establishes the session. Calling it while connected is a no-op.
    async fn connect(&mut self) -> Result<(), AdapterError>;

    async fn login(&mut self, credentials: &Credentials) -> Result<(), AdapterError>;

    /// Sends the order. The outcome arrives later, exactly once, through `ack`.
    fn submit_order(&mut self, request: &OrderRequest, ack: SubmitAck) -> Result<(), AdapterError>;

    /// Requests cancellation of a placed order. The outcome arrives through `ack`.
    fn cancel_order(
        &mut self,
        handle: &OrderHandle,
        request: &OrderRequest,
        ack: CancelAck,
    ) -> Result<(), AdapterError>;

    /// Tears the session down. Safe to call repeatedly or before `connect`.
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;
}

#[async_trait]
impl<A: BrokerAdapter + ?Sized> BrokerAdapter for Box<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }

    async fn connect(&mut self) -> Result<(), AdapterError> {
        (**self).connect().await
    }

    async fn login(&mut self, credentials: &Credentials) -> Result<(), AdapterError> {
        (**self).login(credentials).await
    }

    fn submit_order(&mut self, request: &OrderRequest, ack: SubmitAck) -> Result<(), AdapterError> {
        (**self).submit_order(request, ack)
    }

    fn cancel_order(
        &mut self,
        handle: &OrderHandle,
        request: &OrderRequest,
        ack: CancelAck,
    ) -> Result<(), AdapterError> {
        (**self).cancel_order(handle, request, ack)
    }

    async fn disconnect(&mut self) {
        (**self).disconnect().await
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ack_delivers_once() {
        let (ack, rx) = CancelAck::channel();
        assert!(!ack.is_closed());
        assert!(ack.send(Ok(())));
        assert_eq!(rx.await.unwrap().value, Ok(()));
    }

    #[tokio::test]
    async fn ack_reports_abandoned_receiver() {
        let (ack, rx) = SubmitAck::channel();
        drop(rx);
        assert!(ack.is_closed());
        assert!(!ack.send(Err("late".into())));
    }
}
