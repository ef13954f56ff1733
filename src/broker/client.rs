// =============================================================================
// Broker REST API Client — typed request/response over the broker HTTP API
// =============================================================================
//
// SECURITY: the API key is injected here and only here; callers never see or
// supply it. All four endpoints are JSON POST with a shared response envelope
// `{status, data, message?/error?}`. A `status` other than "success" is an
// error even at HTTP 200. No retries at this layer — the caller decides.
// =============================================================================

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::broker::error::{BrokerError, Result};
use crate::broker::types::{Candle, Envelope, OrderStatus, Quote, SmartOrderAck, SmartOrderRequest};

/// Broker HTTP client. Cheap to clone; safe for concurrent use.
#[derive(Clone)]
pub struct BrokerClient {
    api_key: String,
    strategy: String,
    base_url: String,
    client: reqwest::Client,
}

impl BrokerClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Create a new `BrokerClient`.
    ///
    /// # Arguments
    /// * `base_url` — broker API root, e.g. `http://127.0.0.1:5000`.
    /// * `api_key`  — injected into every request body, never logged.
    /// * `strategy` — strategy tag stamped on orders and status polls.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        strategy: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        Self {
            api_key: api_key.into(),
            strategy: strategy.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Strategy tag this client stamps on orders.
    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    // -------------------------------------------------------------------------
    // Quotes
    // -------------------------------------------------------------------------

    /// POST /api/v1/quotes — snapshot quote for one symbol.
    #[instrument(skip(self), name = "broker::fetch_quote")]
    pub async fn fetch_quote(&self, symbol: &str, exchange: &str) -> Result<Quote> {
        let body = json!({
            "apikey": self.api_key,
            "symbol": symbol,
            "exchange": exchange,
        });
        let envelope = self.post_envelope("/api/v1/quotes", &body).await?;

        let data = envelope.data.unwrap_or(Value::Null);
        let quote: Quote = serde_json::from_value(data)
            .map_err(|e| BrokerError::Decode(format!("quote payload: {e}")))?;

        debug!(symbol, exchange, ltp = quote.ltp, "quote fetched");
        Ok(quote)
    }

    // -------------------------------------------------------------------------
    // History
    // -------------------------------------------------------------------------

    /// POST /api/v1/history — OHLC bars for an inclusive `YYYY-MM-DD` window.
    ///
    /// An empty array is a success, not an error; the caller length-checks.
    #[instrument(skip(self), name = "broker::fetch_history")]
    pub async fn fetch_history(
        &self,
        symbol: &str,
        exchange: &str,
        interval: &str,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<Candle>> {
        let body = json!({
            "apikey": self.api_key,
            "symbol": symbol,
            "exchange": exchange,
            "interval": interval,
            "start_date": start_date,
            "end_date": end_date,
        });
        let envelope = self.post_envelope("/api/v1/history", &body).await?;

        let candles = match envelope.data {
            None | Some(Value::Null) => Vec::new(),
            Some(data) => serde_json::from_value(data)
                .map_err(|e| BrokerError::Decode(format!("history payload: {e}")))?,
        };

        debug!(symbol, interval, count = candles.len(), "history fetched");
        Ok(candles)
    }

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    /// POST /api/v1/placesmartorder — submit a smart order.
    ///
    /// An envelope `status` other than "success" surfaces as
    /// [`BrokerError::RejectedByBroker`] with the remote's message verbatim.
    #[instrument(skip(self, req), name = "broker::place_smart_order",
                 fields(symbol = %req.symbol, action = %req.action, quantity = req.quantity))]
    pub async fn place_smart_order(&self, req: &SmartOrderRequest) -> Result<SmartOrderAck> {
        let mut body = serde_json::to_value(req)
            .map_err(|e| BrokerError::Decode(format!("order request: {e}")))?;
        if let Value::Object(map) = &mut body {
            map.insert("apikey".to_string(), Value::String(self.api_key.clone()));
        }

        let envelope = self.post_envelope("/api/v1/placesmartorder", &body).await?;

        let order_id = envelope
            .data
            .as_ref()
            .and_then(|d| value_to_string(&d["orderid"]))
            .ok_or_else(|| BrokerError::Decode("order response missing 'orderid'".to_string()))?;

        debug!(order_id = %order_id, "smart order accepted");
        Ok(SmartOrderAck {
            order_id,
            status: envelope.status,
        })
    }

    /// POST /api/v1/orderstatus — broker-side snapshot of a placed order.
    #[instrument(skip(self), name = "broker::fetch_order_status")]
    pub async fn fetch_order_status(&self, order_id: &str) -> Result<OrderStatus> {
        let body = json!({
            "apikey": self.api_key,
            "strategy": self.strategy,
            "orderid": order_id,
        });
        let envelope = self.post_envelope("/api/v1/orderstatus", &body).await?;
        let data = envelope.data.unwrap_or(Value::Null);

        // The broker is loose about numeric types here; be tolerant.
        let status = OrderStatus {
            order_id: value_to_string(&data["orderid"]).unwrap_or_else(|| order_id.to_string()),
            order_status: data["order_status"].as_str().unwrap_or_default().to_string(),
            average_price: value_to_f64(&data["average_price"]).unwrap_or(0.0),
            quantity: value_to_f64(&data["quantity"]).unwrap_or(0.0),
            timestamp: data["timestamp"].as_str().unwrap_or_default().to_string(),
        };

        debug!(order_id, status = %status.order_status, "order status fetched");
        Ok(status)
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    /// POST `body` to `path` and unwrap the shared response envelope.
    async fn post_envelope<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Envelope> {
        let url = format!("{}{}", self.base_url, path);

        let resp = self.client.post(&url).json(body).send().await?;
        let status = resp.status();

        // HTML means the request hit a web route, not the API.
        let is_html = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("text/html"))
            .unwrap_or(false);
        if is_html {
            return Err(BrokerError::EndpointNotFound(url));
        }

        let bytes = resp.bytes().await?;

        if status == reqwest::StatusCode::BAD_REQUEST {
            return Err(BrokerError::BadRequest(extract_remote_message(&bytes)));
        }
        if !status.is_success() {
            return Err(BrokerError::ApiFailure {
                code: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let envelope: Envelope = serde_json::from_slice(&bytes)
            .map_err(|e| BrokerError::Decode(format!("response envelope: {e}")))?;

        if envelope.status != "success" {
            return Err(BrokerError::RejectedByBroker(envelope.remote_message()));
        }

        Ok(envelope)
    }
}

/// Pull the broker's own wording out of an error body, falling back to the
/// raw text when it is not the usual envelope.
fn extract_remote_message(bytes: &[u8]) -> String {
    if let Ok(envelope) = serde_json::from_slice::<Envelope>(bytes) {
        if envelope.error.is_some() || envelope.message.is_some() {
            return envelope.remote_message();
        }
    }
    String::from_utf8_lossy(bytes).into_owned()
}

/// Accept an id that arrives as either a JSON string or a number.
fn value_to_string(val: &Value) -> Option<String> {
    match val {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Accept a numeric field that arrives as either a number or a string.
fn value_to_f64(val: &Value) -> Option<f64> {
    match val {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

impl std::fmt::Debug for BrokerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerClient")
            .field("api_key", &"<redacted>")
            .field("strategy", &self.strategy)
            .field("base_url", &self.base_url)
            .finish()
    }
}
