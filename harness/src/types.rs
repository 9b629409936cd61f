//! Order parameters, broker handles, and login credentials.
//!
//! Every enum parses from the exact token the broker configs use and displays
//! back to that token. Unknown tokens are an error, never a default.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Raised when a config token does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind}: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Market {
    TSE,
    OTC,
}

impl FromStr for Market {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TSE" => Ok(Market::TSE),
            "OTC" => Ok(Market::OTC),
            _ => Err(ParseEnumError::new("market", s)),
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Market::TSE => "TSE",
            Market::OTC => "OTC",
        })
    }
}

/// Trading session / lot board the order is routed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderBoard {
    RoundLot,
    OddLot,
    PostMarketFixed,
    PostMarketOddLot,
}

impl FromStr for OrderBoard {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RoundLot" => Ok(OrderBoard::RoundLot),
            "OddLot" => Ok(OrderBoard::OddLot),
            "PostMarket_Fixed" => Ok(OrderBoard::PostMarketFixed),
            "PostMarket_OddLot" => Ok(OrderBoard::PostMarketOddLot),
            _ => Err(ParseEnumError::new("order_board", s)),
        }
    }
}

impl fmt::Display for OrderBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrderBoard::RoundLot => "RoundLot",
            OrderBoard::OddLot => "OddLot",
            OrderBoard::PostMarketFixed => "PostMarket_Fixed",
            OrderBoard::PostMarketOddLot => "PostMarket_OddLot",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FundingType {
    Cash,
    MarginBuy,
    MarginShortSell,
}

impl FromStr for FundingType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Cash" => Ok(FundingType::Cash),
            "MarginBuy" => Ok(FundingType::MarginBuy),
            "MarginShortSell" => Ok(FundingType::MarginShortSell),
            _ => Err(ParseEnumError::new("funding_type", s)),
        }
    }
}

impl fmt::Display for FundingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FundingType::Cash => "Cash",
            FundingType::MarginBuy => "MarginBuy",
            FundingType::MarginShortSell => "MarginShortSell",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Single-letter code used in latency reports.
    pub fn code(&self) -> &'static str {
        match self {
            Side::Buy => "B",
            Side::Sell => "S",
        }
    }
}

impl FromStr for Side {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Buy" | "B" => Ok(Side::Buy),
            "Sell" | "S" => Ok(Side::Sell),
            _ => Err(ParseEnumError::new("side", s)),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
}

impl FromStr for OrderType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Limit" => Ok(OrderType::Limit),
            "Market" => Ok(OrderType::Market),
            _ => Err(ParseEnumError::new("order_type", s)),
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrderType::Limit => "Limit",
            OrderType::Market => "Market",
        })
    }
}

/// ROD = rest of day, IOC = immediate or cancel, FOK = fill or kill.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeInForce {
    ROD,
    IOC,
    FOK,
}

impl FromStr for TimeInForce {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ROD" => Ok(TimeInForce::ROD),
            "IOC" => Ok(TimeInForce::IOC),
            "FOK" => Ok(TimeInForce::FOK),
            _ => Err(ParseEnumError::new("time_in_force", s)),
        }
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TimeInForce::ROD => "ROD",
            TimeInForce::IOC => "IOC",
            TimeInForce::FOK => "FOK",
        })
    }
}

/// Parses the day-trade short-sell flag (`True`/`Y`, `False`/`N`).
pub fn parse_daytrade_flag(s: &str) -> Result<bool, ParseEnumError> {
    match s {
        "True" | "Y" => Ok(true),
        "False" | "N" => Ok(false),
        _ => Err(ParseEnumError::new("daytrade_shortsell", s)),
    }
}

/// One order, built once per measurement cycle and never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub market: Market,
    pub order_board: OrderBoard,
    pub funding_type: FundingType,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub quantity: u32,
    pub price: Decimal,
    pub daytrade_short_sell: bool,
}

impl OrderRequest {
    /// Round-lot cash limit order on TSE, rest of day.
    pub fn limit(symbol: impl Into<String>, side: Side, quantity: u32, price: Decimal) -> Self {
        Self {
            market: Market::TSE,
            order_board: OrderBoard::RoundLot,
            funding_type: FundingType::Cash,
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::ROD,
            quantity,
            price,
            daytrade_short_sell: false,
        }
    }
}

impl fmt::Display for OrderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} x{} @ {} {}/{} ({}/{}, daytrade={})",
            self.market,
            self.symbol,
            self.side,
            self.quantity,
            self.price,
            self.order_type,
            self.time_in_force,
            self.order_board,
            self.funding_type,
            if self.daytrade_short_sell { "Y" } else { "N" },
        )
    }
}

/// Broker-assigned identifiers of a placed order. Both are needed to cancel.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderHandle {
    pub order_id: String,
    pub ticket_id: String,
}

impl fmt::Display for OrderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.order_id, self.ticket_id)
    }
}

#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub user_id: String,
    pub password: String,
    pub account: String,
    pub cert_path: String,
    pub cert_password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("password", &"***")
            .field("account", &self.account)
            .field("cert_path", &self.cert_path)
            .field("cert_password", &"***")
            .finish()
    }
}
