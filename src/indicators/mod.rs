// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free indicator math over close-price series. Every public
// `latest_*` helper returns `Option<f64>` so callers are forced to handle
// insufficient data; the predicate evaluator turns `None` into a typed error.

pub mod ema;
pub mod linreg;
pub mod macd;
pub mod roc;
pub mod rsi;
pub mod sma;
