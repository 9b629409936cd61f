//! Best-effort delivery of cycle reports to a collection endpoint.

use harness::config::ApiSection;
use harness::LatencyReport;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("endpoint answered {0}")]
    Status(StatusCode),
}

pub struct Forwarder {
    client: reqwest::Client,
    url: String,
    broker: String,
}

impl Forwarder {
    pub fn new(
        url: impl Into<String>,
        broker: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ForwardError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            broker: broker.into(),
        })
    }

    pub fn from_config(api: &ApiSection) -> Result<Self, ForwardError> {
        Self::new(&api.url, &api.broker_name, Duration::from_millis(api.timeout_ms))
    }

    /// Broker label the endpoint files reports under.
    pub fn broker(&self) -> &str {
        &self.broker
    }

    pub async fn send(&self, report: &LatencyReport) -> Result<(), ForwardError> {
        let response = self.client.post(&self.url).json(report).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ForwardError::Status(status));
        }
        debug!(url = %self.url, %status, "report delivered");
        Ok(())
    }

    /// Sends once. Failures are logged and otherwise ignored.
    pub async fn forward(&self, report: &LatencyReport) -> bool {
        match self.send(report).await {
            Ok(()) => true,
            Err(e) => {
                warn!(url = %self.url, error = %e, "could not forward latency report");
                false
            }
        }
    }
}
