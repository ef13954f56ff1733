// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
// Fixed 12/26/9 parameterisation. The line is EMA12 - EMA26; the signal
// period (9) names the conventional parameter set, only the line is exposed.
// =============================================================================

use crate::indicators::ema::calculate_ema;

/// Fast EMA period of the fixed parameter set.
pub const FAST_PERIOD: usize = 12;
/// Slow EMA period — also the data precondition for the indicator.
pub const SLOW_PERIOD: usize = 26;
/// Signal EMA period of the conventional 12/26/9 set.
pub const SIGNAL_PERIOD: usize = 9;

/// Compute the MACD line series (EMA12 - EMA26), one value per close
/// starting at index `SLOW_PERIOD - 1`.
pub fn calculate_macd_line(closes: &[f64]) -> Vec<f64> {
    let fast = calculate_ema(closes, FAST_PERIOD);
    let slow = calculate_ema(closes, SLOW_PERIOD);
    if slow.is_empty() {
        return Vec::new();
    }

    // fast[i] sits at close index FAST_PERIOD - 1 + i; align on the slow series.
    let offset = SLOW_PERIOD - FAST_PERIOD;
    slow.iter()
        .enumerate()
        .filter_map(|(i, s)| fast.get(i + offset).map(|f| f - s))
        .collect()
}

/// Most recent MACD line value, if the series is long enough.
pub fn latest_macd_line(closes: &[f64]) -> Option<f64> {
    calculate_macd_line(closes).last().copied()
}
