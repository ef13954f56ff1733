// =============================================================================
// Predicate reference scanner
// =============================================================================
//
// First pass of the evaluator: walk the predicate text and collect every
// indicator reference together with where and how it was written, so that the
// rewrite/bind pass can work without re-parsing. Three reference forms:
//
//   RSI14            period-suffix — stays an identifier, bound in context
//   sma(close, 20)   function call — rewritten in place to a numeric literal
//   MACD             bare name — fixed 12/26/9 parameterisation
//
// Bare integer literals are also recorded so the rewrite pass can float them
// (`30` → `30.0`); the expression engine compares floats to floats.
// =============================================================================

use crate::indicators::macd::SLOW_PERIOD as MACD_SLOW_PERIOD;
use crate::predicate::error::PredicateError;

/// The indicators a predicate may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorKind {
    Rsi,
    Ema,
    Sma,
    Macd,
    Roc,
    LinRegSlope,
}

impl IndicatorKind {
    /// Resolve a name as written in the predicate (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "RSI" => Some(Self::Rsi),
            "EMA" => Some(Self::Ema),
            "SMA" => Some(Self::Sma),
            "MACD" => Some(Self::Macd),
            "ROC" => Some(Self::Roc),
            "LINREGSLOPE" => Some(Self::LinRegSlope),
            _ => None,
        }
    }

    /// Canonical uppercase label used in reported indicator values.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Rsi => "RSI",
            Self::Ema => "EMA",
            Self::Sma => "SMA",
            Self::Macd => "MACD",
            Self::Roc => "ROC",
            Self::LinRegSlope => "LINREGSLOPE",
        }
    }

    /// Which indicators accept the `name(close, N)` call form.
    fn supports_call_form(&self) -> bool {
        matches!(self, Self::Rsi | Self::Ema | Self::Sma)
    }
}

/// How a reference appeared in the text.
#[derive(Debug, Clone, PartialEq)]
pub enum RefForm {
    /// `RSI14` — the identifier is bound in the evaluation context.
    PeriodSuffix { ident: String },
    /// `sma(close, 20)` — the byte span is replaced by a numeric literal.
    Call { start: usize, end: usize },
    /// Bare `MACD`.
    Bare { ident: String },
}

/// One indicator reference found in the predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRef {
    pub kind: IndicatorKind,
    /// Look-back period; for MACD this is its slow period, which doubles as
    /// the data precondition.
    pub period: usize,
    pub form: RefForm,
}

impl IndicatorRef {
    /// Canonical name used as the key in reported indicator values.
    pub fn display_name(&self) -> String {
        match self.kind {
            IndicatorKind::Macd => "MACD".to_string(),
            _ => format!("{}{}", self.kind.label(), self.period),
        }
    }
}

/// Everything the rewrite/bind pass needs from the text.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub refs: Vec<IndicatorRef>,
    /// Spellings of the close alias as written (`CLOSE`, `close`, ...).
    pub close_idents: Vec<String>,
    /// Byte spans of bare integer literals, to be floated during rewrite.
    pub int_literals: Vec<(usize, usize)>,
}

/// Scan `text` for indicator references, close aliases and integer literals.
pub fn scan(text: &str) -> Result<ScanResult, PredicateError> {
    let bytes = text.as_bytes();
    let mut result = ScanResult::default();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];

        if c.is_ascii_alphabetic() || c == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let ident = &text[start..i];

            // Peek past whitespace for a call form.
            let mut j = i;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            let is_call = j < bytes.len() && bytes[j] == b'(';

            if is_call {
                let kind = IndicatorKind::from_name(ident)
                    .ok_or_else(|| PredicateError::syntax(text, format!("unknown function '{ident}'")))?;
                if !kind.supports_call_form() {
                    return Err(PredicateError::syntax(
                        text,
                        format!("'{ident}' does not take arguments"),
                    ));
                }
                let (period, end) = parse_call_args(text, j)?;
                result.refs.push(IndicatorRef {
                    kind,
                    period,
                    form: RefForm::Call { start, end },
                });
                i = end;
                continue;
            }

            if ident.eq_ignore_ascii_case("close") {
                result.close_idents.push(ident.to_string());
                continue;
            }
            if ident.eq_ignore_ascii_case("true") || ident.eq_ignore_ascii_case("false") {
                continue;
            }

            result.refs.push(classify_identifier(text, ident)?);
            continue;
        }

        if c.is_ascii_digit() || c == b'.' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.') {
                i += 1;
            }
            if text[start..i].bytes().all(|b| b.is_ascii_digit()) {
                result.int_literals.push((start, i));
            }
            continue;
        }

        i += 1;
    }

    Ok(result)
}

/// Classify a non-call identifier: period-suffix, bare MACD, bare known
/// indicator (missing period) or unknown.
fn classify_identifier(text: &str, ident: &str) -> Result<IndicatorRef, PredicateError> {
    match ident.find(|ch: char| ch.is_ascii_digit()) {
        Some(pos) if ident[pos..].bytes().all(|b| b.is_ascii_digit()) => {
            let (name, digits) = ident.split_at(pos);
            let kind = IndicatorKind::from_name(name).ok_or_else(|| {
                PredicateError::syntax(text, format!("unrecognised identifier '{ident}'"))
            })?;
            if kind == IndicatorKind::Macd {
                return Err(PredicateError::syntax(
                    text,
                    "MACD uses the fixed 12/26/9 parameters and takes no period".to_string(),
                ));
            }
            let period: usize = digits
                .parse()
                .map_err(|_| PredicateError::syntax(text, format!("bad period in '{ident}'")))?;
            if period == 0 {
                return Err(PredicateError::syntax(
                    text,
                    format!("period in '{ident}' must be positive"),
                ));
            }
            Ok(IndicatorRef {
                kind,
                period,
                form: RefForm::PeriodSuffix {
                    ident: ident.to_string(),
                },
            })
        }
        Some(_) => Err(PredicateError::syntax(
            text,
            format!("unrecognised identifier '{ident}'"),
        )),
        None => match IndicatorKind::from_name(ident) {
            Some(IndicatorKind::Macd) => Ok(IndicatorRef {
                kind: IndicatorKind::Macd,
                period: MACD_SLOW_PERIOD,
                form: RefForm::Bare {
                    ident: ident.to_string(),
                },
            }),
            Some(kind) => Err(PredicateError::MissingPeriod(kind.label().to_string())),
            None => Err(PredicateError::syntax(
                text,
                format!("unrecognised identifier '{ident}'"),
            )),
        },
    }
}

/// Parse `(close, N)` starting at the opening parenthesis. Returns the period
/// and the byte index one past the closing parenthesis.
fn parse_call_args(text: &str, open: usize) -> Result<(usize, usize), PredicateError> {
    let bytes = text.as_bytes();
    let mut i = open + 1;

    let skip_ws = |mut k: usize| {
        while k < bytes.len() && bytes[k].is_ascii_whitespace() {
            k += 1;
        }
        k
    };

    i = skip_ws(i);
    let arg_start = i;
    while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
        i += 1;
    }
    if !text[arg_start..i].eq_ignore_ascii_case("close") {
        return Err(PredicateError::syntax(
            text,
            "function argument must be 'close'".to_string(),
        ));
    }

    i = skip_ws(i);
    if i >= bytes.len() || bytes[i] != b',' {
        return Err(PredicateError::syntax(text, "expected ',' after 'close'".to_string()));
    }
    i = skip_ws(i + 1);

    let digits_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let period: usize = text[digits_start..i]
        .parse()
        .map_err(|_| PredicateError::syntax(text, "expected an integer period".to_string()))?;
    if period == 0 {
        return Err(PredicateError::syntax(text, "period must be positive".to_string()));
    }

    i = skip_ws(i);
    if i >= bytes.len() || bytes[i] != b')' {
        return Err(PredicateError::syntax(text, "expected ')' to close the call".to_string()));
    }

    Ok((period, i + 1))
}
