// =============================================================================
// Rate of Change (ROC) — Momentum Indicator
// =============================================================================
//
//   ROC = ((close - close_n) / close_n) * 100
//
// Positive values indicate upward momentum.

/// Compute the ROC series for `closes` with look-back `period`.
///
/// One value per close starting at index `period`. A zero reference close
/// yields 0.0 rather than a division blow-up.
pub fn calculate_roc(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() <= period {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(closes.len() - period);
    for i in period..closes.len() {
        let reference = closes[i - period];
        if reference == 0.0 {
            result.push(0.0);
        } else {
            result.push(((closes[i] - reference) / reference) * 100.0);
        }
    }
    result
}

/// Most recent ROC value, if the series is long enough.
pub fn latest_roc(closes: &[f64], period: usize) -> Option<f64> {
    calculate_roc(closes, period).last().copied()
}
