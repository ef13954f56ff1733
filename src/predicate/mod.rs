// =============================================================================
// Predicate Evaluator — Pine-Script-style boolean expressions over closes
// =============================================================================
//
// Two passes keep indicator math out of expression parsing:
//
//   1. Scan the text for indicator references (refs.rs) and compute the
//      latest value of each unique (indicator, period) over the close series.
//   2. Rewrite call forms to numeric literals, float bare integer literals,
//      bind period-suffix identifiers and the close alias in an evalexpr
//      context, then evaluate to a boolean.
//
// Given the same closes and predicate, `met` and `values` are bit-identical.
// =============================================================================

pub mod error;
pub mod refs;

use std::collections::{BTreeMap, HashMap};

use evalexpr::{eval_with_context, ContextWithMutableVariables, HashMapContext, Value};

pub use error::PredicateError;
use refs::{IndicatorKind, IndicatorRef, RefForm};

use crate::indicators;

/// Outcome of evaluating a predicate against a close series.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Whether the predicate held.
    pub met: bool,
    /// Latest value of every referenced indicator (and the close alias),
    /// keyed by canonical name — ordered for deterministic reporting.
    pub values: BTreeMap<String, f64>,
}

/// Evaluate `predicate` against `closes` (ascending by time, latest last).
pub fn evaluate(predicate: &str, closes: &[f64]) -> Result<Evaluation, PredicateError> {
    let text = predicate.trim();
    if text.is_empty() {
        return Err(PredicateError::syntax(predicate, "empty predicate"));
    }

    let scanned = refs::scan(text)?;

    // ── Pass 1: latest value per unique (indicator, period) ─────────────
    let mut computed: HashMap<(IndicatorKind, usize), f64> = HashMap::new();
    for r in &scanned.refs {
        if computed.contains_key(&(r.kind, r.period)) {
            continue;
        }
        let value = latest_value(r, closes).ok_or_else(|| PredicateError::InsufficientData {
            indicator: r.kind.label().to_string(),
            period: r.period,
            got: closes.len(),
        })?;
        computed.insert((r.kind, r.period), value);
    }

    let last_close = match (scanned.close_idents.is_empty(), closes.last()) {
        (true, _) => None,
        (false, Some(&last)) => Some(last),
        (false, None) => {
            return Err(PredicateError::InsufficientData {
                indicator: "CLOSE".to_string(),
                period: 0,
                got: 0,
            })
        }
    };

    // Non-finite values are reported, never compared silently.
    for r in &scanned.refs {
        let value = computed[&(r.kind, r.period)];
        if !value.is_finite() {
            return Err(PredicateError::NonBoolean(format!(
                "{} = {value} is not a finite number",
                r.display_name()
            )));
        }
    }

    // ── Pass 2: rewrite, bind, evaluate ─────────────────────────────────
    let rewritten = rewrite(text, &scanned, &computed);

    let mut context = HashMapContext::new();
    let bind = |context: &mut HashMapContext, ident: String, value: f64| {
        context
            .set_value(ident, Value::Float(value))
            .map_err(|e| PredicateError::syntax(text, e.to_string()))
    };
    for r in &scanned.refs {
        if let RefForm::PeriodSuffix { ident } | RefForm::Bare { ident } = &r.form {
            bind(&mut context, ident.clone(), computed[&(r.kind, r.period)])?;
        }
    }
    if let Some(close) = last_close {
        for ident in &scanned.close_idents {
            bind(&mut context, ident.clone(), close)?;
        }
    }

    let mut values = BTreeMap::new();
    for r in &scanned.refs {
        values.insert(r.display_name(), computed[&(r.kind, r.period)]);
    }
    if let Some(close) = last_close {
        values.insert("CLOSE".to_string(), close);
    }

    match eval_with_context(&rewritten, &context) {
        Ok(Value::Boolean(met)) => Ok(Evaluation { met, values }),
        Ok(other) => Err(PredicateError::NonBoolean(format!(
            "evaluation produced {other:?}"
        ))),
        Err(e) => Err(PredicateError::syntax(text, e.to_string())),
    }
}

/// Latest value of one indicator reference over `closes`, `None` when the
/// series is shorter than `period + 1`.
fn latest_value(r: &IndicatorRef, closes: &[f64]) -> Option<f64> {
    if closes.len() < r.period + 1 {
        return None;
    }
    match r.kind {
        IndicatorKind::Rsi => indicators::rsi::latest_rsi(closes, r.period),
        IndicatorKind::Ema => indicators::ema::latest_ema(closes, r.period),
        IndicatorKind::Sma => indicators::sma::latest_sma(closes, r.period),
        IndicatorKind::Macd => indicators::macd::latest_macd_line(closes),
        IndicatorKind::Roc => indicators::roc::latest_roc(closes, r.period),
        IndicatorKind::LinRegSlope => indicators::linreg::latest_slope(closes, r.period),
    }
}

/// Apply the textual edits from pass 1: call forms become parenthesised
/// literals, bare integer literals gain a `.0` suffix.
fn rewrite(
    text: &str,
    scanned: &refs::ScanResult,
    computed: &HashMap<(IndicatorKind, usize), f64>,
) -> String {
    let mut edits: Vec<(usize, usize, String)> = Vec::new();

    for r in &scanned.refs {
        if let RefForm::Call { start, end } = r.form {
            let value = computed[&(r.kind, r.period)];
            edits.push((start, end, format!("({value})")));
        }
    }
    for &(start, end) in &scanned.int_literals {
        edits.push((start, end, format!("{}.0", &text[start..end])));
    }

    // Apply back-to-front so earlier spans stay valid.
    edits.sort_by(|a, b| b.0.cmp(&a.0));
    let mut out = text.to_string();
    for (start, end, replacement) in edits {
        out.replace_range(start..end, &replacement);
    }
    out
}
