// =============================================================================
// Broker wire types
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::types::{OrderAction, PriceType, Product};

/// One OHLC bar from the history endpoint. `timestamp` is epoch seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default, rename = "oi")]
    pub open_interest: f64,
}

/// Snapshot quote for one symbol. Lifetime = one request.
#[derive(Debug, Clone, Deserialize)]
pub struct Quote {
    pub ltp: f64,
    #[serde(default)]
    pub open: f64,
    #[serde(default)]
    pub high: f64,
    #[serde(default)]
    pub low: f64,
    #[serde(default)]
    pub prev_close: f64,
    #[serde(default, rename = "chng")]
    pub change: f64,
    #[serde(default, rename = "chng_perc")]
    pub change_percent: f64,
}

/// Broker-neutral smart order. Serialises straight into the request body;
/// the gateway adds the API key.
#[derive(Debug, Clone, Serialize)]
pub struct SmartOrderRequest {
    pub strategy: String,
    pub symbol: String,
    pub exchange: String,
    pub action: OrderAction,
    pub pricetype: PriceType,
    pub product: Product,
    pub quantity: u32,
    pub position_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

/// Acknowledgement for an accepted smart order.
#[derive(Debug, Clone)]
pub struct SmartOrderAck {
    /// Broker-assigned order id.
    pub order_id: String,
    /// Envelope status as reported on acceptance.
    pub status: String,
}

/// Broker-side order snapshot from the status endpoint.
#[derive(Debug, Clone)]
pub struct OrderStatus {
    pub order_id: String,
    /// Raw status string as the broker sent it.
    pub order_status: String,
    pub average_price: f64,
    pub quantity: f64,
    pub timestamp: String,
}

impl OrderStatus {
    /// Lowercased, trimmed status for comparisons. The broker's vocabulary is
    /// not pinned; unknown values are non-terminal for polling.
    pub fn normalized(&self) -> String {
        self.order_status.trim().to_lowercase()
    }
}

/// Response envelope shared by every broker endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Envelope {
    /// The remote's own words, preferring the explicit error field.
    pub fn remote_message(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| format!("broker reported status '{}'", self.status))
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candle_deserializes_oi_field() {
        let json = r#"{"timestamp": 1700000000, "open": 1.0, "high": 2.0,
                       "low": 0.5, "close": 1.5, "volume": 10.0, "oi": 42.0}"#;
        let c: Candle = serde_json::from_str(json).unwrap();
        assert_eq!(c.open_interest, 42.0);
        assert_eq!(c.close, 1.5);
    }

    #[test]
    fn candle_tolerates_missing_volume_and_oi() {
        let json = r#"{"timestamp": 1, "open": 1.0, "high": 1.0, "low": 1.0, "close": 1.0}"#;
        let c: Candle = serde_json::from_str(json).unwrap();
        assert_eq!(c.volume, 0.0);
        assert_eq!(c.open_interest, 0.0);
    }

    #[test]
    fn smart_order_request_omits_absent_price() {
        let req = SmartOrderRequest {
            strategy: "meridian".into(),
            symbol: "TCS".into(),
            exchange: "NSE".into(),
            action: crate::types::OrderAction::Buy,
            pricetype: crate::types::PriceType::Market,
            product: crate::types::Product::Nrml,
            quantity: 10,
            position_size: 10,
            price: None,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert!(v.get("price").is_none());
        assert_eq!(v["action"], "BUY");
        assert_eq!(v["pricetype"], "MARKET");
        assert_eq!(v["product"], "NRML");
    }

    #[test]
    fn envelope_prefers_error_field() {
        let env: Envelope = serde_json::from_str(
            r#"{"status": "error", "message": "generic", "error": "specific"}"#,
        )
        .unwrap();
        assert_eq!(env.remote_message(), "specific");
    }

    #[test]
    fn envelope_falls_back_to_status() {
        let env: Envelope = serde_json::from_str(r#"{"status": "error"}"#).unwrap();
        assert!(env.remote_message().contains("error"));
    }

    #[test]
    fn order_status_normalizes_case_and_whitespace() {
        let st = OrderStatus {
            order_id: "1".into(),
            order_status: "  Trigger Pending ".into(),
            average_price: 0.0,
            quantity: 0.0,
            timestamp: String::new(),
        };
        assert_eq!(st.normalized(), "trigger pending");
    }
}
