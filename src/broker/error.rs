// =============================================================================
// Broker error taxonomy
// =============================================================================
//
// Callers decide retry policy; nothing here retries. The variants distinguish
// what the worker must treat as transient (Transport, ApiFailure) from what
// must reach the user verbatim (BadRequest, RejectedByBroker).
// =============================================================================

use thiserror::Error;

/// All failures the broker gateway can produce.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Connection, TLS, timeout or body-read failure.
    #[error("broker transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The broker answered, but the payload did not match the expected shape.
    #[error("broker response decode error: {0}")]
    Decode(String),

    /// The broker served an HTML page instead of JSON — the request hit a
    /// web route rather than the API (wrong base URL or path).
    #[error("broker endpoint not found: {0} answered with HTML")]
    EndpointNotFound(String),

    /// HTTP 400 — the broker's own message, verbatim.
    #[error("{0}")]
    BadRequest(String),

    /// Any other non-2xx response.
    #[error("broker API failure (HTTP {code}): {body}")]
    ApiFailure { code: u16, body: String },

    /// HTTP 200 with an envelope `status` other than `"success"` — the
    /// remote's message, verbatim.
    #[error("{0}")]
    RejectedByBroker(String),
}

pub type Result<T> = std::result::Result<T, BrokerError>;
