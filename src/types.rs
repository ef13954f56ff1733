// =============================================================================
// Shared types used across the Meridian trading assistant
// =============================================================================

use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Order side sent to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderAction {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for OrderAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => Err(format!("action must be BUY or SELL, got '{other}'")),
        }
    }
}

/// Broker product segment for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Product {
    Mis,
    Nrml,
    Cnc,
}

impl std::fmt::Display for Product {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mis => write!(f, "MIS"),
            Self::Nrml => write!(f, "NRML"),
            Self::Cnc => write!(f, "CNC"),
        }
    }
}

impl FromStr for Product {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MIS" => Ok(Self::Mis),
            "NRML" => Ok(Self::Nrml),
            "CNC" => Ok(Self::Cnc),
            other => Err(format!("product must be MIS, NRML or CNC, got '{other}'")),
        }
    }
}

/// Price type for a broker order. Conditional auto-orders always fire MARKET.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PriceType {
    Market,
    Limit,
}

impl std::fmt::Display for PriceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Market => write!(f, "MARKET"),
            Self::Limit => write!(f, "LIMIT"),
        }
    }
}

/// Candle interval a monitor evaluates on. The broker accepts the string form
/// verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
}

impl Interval {
    /// Wire / display form, e.g. `"5m"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::H1 => "1h",
        }
    }

    /// Nominal candle duration. The worker clamps this to its tick floor.
    pub fn period(&self) -> Duration {
        match self {
            Self::M5 => Duration::from_secs(5 * 60),
            Self::M15 => Duration::from_secs(15 * 60),
            Self::H1 => Duration::from_secs(60 * 60),
        }
    }

    /// How many calendar days of history to request so that the longest
    /// supported indicator look-back still has enough closed candles.
    pub fn lookback_days(&self) -> i64 {
        match self {
            Self::M5 => 5,
            Self::M15 => 10,
            Self::H1 => 30,
        }
    }

    /// Inclusive `YYYY-MM-DD` window ending at `today` for a history request.
    pub fn history_window(&self, today: NaiveDate) -> (String, String) {
        let start = today - chrono::Duration::days(self.lookback_days());
        (
            start.format("%Y-%m-%d").to_string(),
            today.format("%Y-%m-%d").to_string(),
        )
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "5m" => Ok(Self::M5),
            "15m" => Ok(Self::M15),
            "1h" => Ok(Self::H1),
            other => Err(format!("interval must be one of 5m, 15m, 1h — got '{other}'")),
        }
    }
}

/// Lifecycle state of a conditional auto-order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Running,
    Executed,
    Cancelled,
    Expired,
    Failed,
}

impl MonitorStatus {
    /// Terminal statuses are sticky; a monitor never leaves one.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Executed => write!(f, "executed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Expired => write!(f, "expired"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
