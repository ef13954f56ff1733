// =============================================================================
// Predicate error taxonomy
// =============================================================================
//
// Every variant is a fatal configuration error for a monitor: the predicate
// text itself is wrong or cannot be satisfied by the data on hand, so
// retrying the same tick cannot help. The worker stops and tells the user.
// =============================================================================

use thiserror::Error;

/// Failures from parsing or evaluating a predicate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredicateError {
    /// The close series is too short for an indicator's look-back.
    #[error(
        "insufficient data for {indicator}({period}): need at least {needed} closes, got {got}",
        needed = .period + 1
    )]
    InsufficientData {
        indicator: String,
        period: usize,
        got: usize,
    },

    /// A known indicator name was used without a period.
    #[error(
        "indicator '{name}' is missing a period — write e.g. '{name}14' or '{lower}(close, 14)'",
        name = .0,
        lower = .0.to_lowercase()
    )]
    MissingPeriod(String),

    /// The predicate text could not be understood.
    #[error("could not parse predicate '{text}': {detail}")]
    Syntax { text: String, detail: String },

    /// The predicate evaluated, but not to true/false — or a comparison
    /// would have involved a non-finite indicator value.
    #[error("predicate did not produce a true/false result: {0}")]
    NonBoolean(String),
}

impl PredicateError {
    /// Shorthand for a syntax failure carrying the original text.
    pub fn syntax(text: &str, detail: impl Into<String>) -> Self {
        Self::Syntax {
            text: text.to_string(),
            detail: detail.into(),
        }
    }
}
