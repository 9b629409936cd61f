//! TOML configuration, loaded once at process start.
//!
//! Order enums stay as raw strings until [`HarnessConfig::order_request`]
//! parses them strictly; `load` runs that parse up front so a bad token stops
//! the process before any connection is made.

use chrono::NaiveTime;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::driver::CyclePolicy;
use crate::sim::{AckBehavior, SimBehavior};
use crate::types::{parse_daytrade_flag, Credentials, OrderRequest, OrderType, ParseEnumError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    InvalidEnum(#[from] ParseEnumError),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HarnessConfig {
    pub user: Credentials,
    pub order: OrderSection,
    #[serde(default)]
    pub timing: TimingSection,
    pub api: Option<ApiSection>,
    pub schedule: Option<ScheduleSection>,
    #[serde(default)]
    pub sim: SimSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderSection {
    pub symbol: String,
    pub price: Decimal,
    pub quantity: u32,
    pub market: String,
    pub order_board: String,
    pub funding_type: String,
    pub side: String,
    pub order_type: String,
    pub time_in_force: String,
    pub daytrade_shortsell: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingSection {
    pub submit_timeout_ms: u64,
    pub cancel_timeout_ms: u64,
    pub settle_delay_ms: u64,
    pub connect_delay_ms: u64,
    pub login_delay_ms: u64,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            submit_timeout_ms: 10_000,
            cancel_timeout_ms: 10_000,
            settle_delay_ms: 1_000,
            connect_delay_ms: 1_000,
            login_delay_ms: 1_000,
        }
    }
}

/// Where finished cycles are reported.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSection {
    pub url: String,
    pub broker_name: String,
    #[serde(default = "default_api_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_api_timeout_ms() -> u64 {
    5_000
}

/// Trading window for repeated measurement, in Taiwan time (UTC+8).
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleSection {
    pub start_time: String,
    pub end_time: String,
    pub interval_seconds: u64,
    #[serde(default = "default_true")]
    pub weekdays_only: bool,
}

fn default_true() -> bool {
    true
}

impl ScheduleSection {
    pub fn times(&self) -> Result<(NaiveTime, NaiveTime), ConfigError> {
        let start = NaiveTime::parse_from_str(&self.start_time, "%H:%M")
            .map_err(|e| invalid("schedule.start_time", e.to_string()))?;
        let end = NaiveTime::parse_from_str(&self.end_time, "%H:%M")
            .map_err(|e| invalid("schedule.end_time", e.to_string()))?;
        if end < start {
            return Err(invalid("schedule.end_time", "ends before start_time"));
        }
        Ok((start, end))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

/// Behaviour of the built-in simulated broker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimSection {
    pub submit_ack_ms: u64,
    pub cancel_ack_ms: u64,
    pub jitter_ms: u64,
    pub reject_submit: Option<String>,
    pub reject_cancel: Option<String>,
    pub seed: u64,
}

impl Default for SimSection {
    fn default() -> Self {
        Self {
            submit_ack_ms: 6,
            cancel_ack_ms: 0,
            jitter_ms: 0,
            reject_submit: None,
            reject_cancel: None,
            seed: SimBehavior::default().seed,
        }
    }
}

impl SimSection {
    pub fn behavior(&self) -> SimBehavior {
        let answer = |ack_ms: u64, reject: &Option<String>| match reject {
            Some(message) => AckBehavior::Reject {
                after: Duration::from_millis(ack_ms),
                message: message.clone(),
            },
            None => AckBehavior::ack_after_ms(ack_ms),
        };
        SimBehavior {
            submit: answer(self.submit_ack_ms, &self.reject_submit),
            cancel: answer(self.cancel_ack_ms, &self.reject_cancel),
            jitter: Duration::from_millis(self.jitter_ms),
            seed: self.seed,
            ..SimBehavior::default()
        }
    }
}

impl HarnessConfig {
    /// Reads and validates `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: HarnessConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.order_request()?;
        if self.timing.submit_timeout_ms == 0 {
            return Err(invalid("timing.submit_timeout_ms", "must be positive"));
        }
        if self.timing.cancel_timeout_ms == 0 {
            return Err(invalid("timing.cancel_timeout_ms", "must be positive"));
        }
        if let Some(schedule) = &self.schedule {
            schedule.times()?;
            if schedule.interval_seconds == 0 {
                return Err(invalid("schedule.interval_seconds", "must be positive"));
            }
        }
        Ok(())
    }

    /// Strictly parses the `[order]` section.
    pub fn order_request(&self) -> Result<OrderRequest, ConfigError> {
        let o = &self.order;
        if o.symbol.trim().is_empty() {
            return Err(invalid("order.symbol", "must not be empty"));
        }
        if o.quantity == 0 {
            return Err(invalid("order.quantity", "must be positive"));
        }
        let order_type: OrderType = o.order_type.parse()?;
        if order_type == OrderType::Limit && o.price <= Decimal::ZERO {
            return Err(invalid("order.price", "limit orders need a positive price"));
        }
        if o.price < Decimal::ZERO {
            return Err(invalid("order.price", "must not be negative"));
        }

        Ok(OrderRequest {
            market: o.market.parse()?,
            order_board: o.order_board.parse()?,
            funding_type: o.funding_type.parse()?,
            symbol: o.symbol.clone(),
            side: o.side.parse()?,
            order_type,
            time_in_force: o.time_in_force.parse()?,
            quantity: o.quantity,
            price: o.price,
            daytrade_short_sell: parse_daytrade_flag(&o.daytrade_shortsell)?,
        })
    }

    pub fn policy(&self) -> CyclePolicy {
        CyclePolicy {
            submit_timeout: Duration::from_millis(self.timing.submit_timeout_ms),
            cancel_timeout: Duration::from_millis(self.timing.cancel_timeout_ms),
            settle_delay: Duration::from_millis(self.timing.settle_delay_ms),
        }
    }

    pub fn connect_delay(&self) -> Duration {
        Duration::from_millis(self.timing.connect_delay_ms)
    }

    pub fn login_delay(&self) -> Duration {
        Duration::from_millis(self.timing.login_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Market, OrderBoard, Side, TimeInForce};
    use std::io::Write;

    const BASE: &str = r#"
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

    #[test]
    fn minimal_config_uses_observed_defaults() {
        let config = HarnessConfig::from_toml_str(BASE).unwrap();
        let request = config.order_request().unwrap();

        assert_eq!(request.market, Market::TSE);
        assert_eq!(request.order_board, OrderBoard::RoundLot);
        assert_eq!(request.side, Side::Buy);
        assert_eq!(request.time_in_force, TimeInForce::ROD);
        assert_eq!(request.price, Decimal::from(500));
        assert!(!request.daytrade_short_sell);
        assert_eq!(config.policy(), CyclePolicy::default());
        assert_eq!(config.connect_delay(), Duration::from_secs(1));
        assert!(config.api.is_none());
    }

    #[test]
    fn invalid_enum_is_fatal() {
        let text = BASE.replace("time_in_force = \"ROD\"", "time_in_force = \"GTC\"");
        match HarnessConfig::from_toml_str(&text) {
            Err(ConfigError::InvalidEnum(e)) => {
                assert_eq!(e.kind, "time_in_force");
                assert_eq!(e.value, "GTC");
            }
            other => panic!("expected enum error, got {:?}", other),
        }
    }

    #[test]
    fn numeric_price_and_overrides() {
        let text = BASE.replace("price = \"500\"", "price = 512.5")
            + r#"
[timing]
settle_delay_ms = 250

[api]
url = "http://127.0.0.1:8090/reports"
broker_name = "concords"

[sim]
submit_ack_ms = 3
reject_cancel = "order already filled"
"#;
        let config = HarnessConfig::from_toml_str(&text).unwrap();

        assert_eq!(config.order.price, Decimal::new(5125, 1));
        assert_eq!(config.policy().settle_delay, Duration::from_millis(250));
        assert_eq!(config.policy().submit_timeout, Duration::from_secs(10));
        assert_eq!(config.api.as_ref().unwrap().timeout_ms, 5_000);

        let sim = config.sim.behavior();
        assert_eq!(sim.submit, AckBehavior::ack_after_ms(3));
        assert!(matches!(
            sim.cancel,
            AckBehavior::Reject { ref message, .. } if message == "order already filled"
        ));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let text = BASE.replace("quantity = 1", "quantity = 0");
        assert!(matches!(
            HarnessConfig::from_toml_str(&text),
            Err(ConfigError::Invalid { field: "order.quantity", .. })
        ));
    }

    #[test]
    fn limit_order_needs_price() {
        let text = BASE.replace("price = \"500\"", "price = \"0\"");
        assert!(matches!(
            HarnessConfig::from_toml_str(&text),
            Err(ConfigError::Invalid { field: "order.price", .. })
        ));
    }

    #[test]
    fn schedule_is_validated() {
        let bad_interval = format!(
            "{}\n[schedule]\nstart_time = \"09:00\"\nend_time = \"13:30\"\ninterval_seconds = 0\n",
            BASE
        );
        assert!(HarnessConfig::from_toml_str(&bad_interval).is_err());

        let bad_time = format!(
            "{}\n[schedule]\nstart_time = \"9am\"\nend_time = \"13:30\"\ninterval_seconds = 60\n",
            BASE
        );
        assert!(matches!(
            HarnessConfig::from_toml_str(&bad_time),
            Err(ConfigError::Invalid { field: "schedule.start_time", .. })
        ));

        let good = format!(
            "{}\n[schedule]\nstart_time = \"09:00\"\nend_time = \"13:30\"\ninterval_seconds = 60\n",
            BASE
        );
        let config = HarnessConfig::from_toml_str(&good).unwrap();
        let schedule = config.schedule.unwrap();
        assert!(schedule.weekdays_only);
        assert_eq!(schedule.interval(), Duration::from_secs(60));
    }

    #[test]
    fn missing_section_is_a_parse_error() {
        let text = BASE.replace("[order]", "[orders]");
        assert!(matches!(
            HarnessConfig::from_toml_str(&text),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(BASE.as_bytes()).unwrap();

        let config = HarnessConfig::load(file.path()).unwrap();
        assert_eq!(config.user.user_id, "A123456789");

        let missing = HarnessConfig::load("/nonexistent/order_config.toml");
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
