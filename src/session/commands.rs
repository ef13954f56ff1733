// =============================================================================
// Slash-command grammar
// =============================================================================
//
// Pure parsing and argument validation — no I/O. Every rejection is a
// user-readable string the dispatcher turns into an error frame. Predicates
// are double-quoted so they can contain spaces; the tokenizer keeps a quoted
// run as one token.
// =============================================================================

use chrono::{DateTime, TimeZone, Utc};

use crate::types::{Interval, OrderAction, Product};

/// Hard cap on a monitor's validity.
pub const MAX_VALIDITY_SECS: u64 = 30 * 24 * 60 * 60;

/// A parsed slash-command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `/signal <SYMBOL> <INTERVAL> "<PREDICATE>" [EXCHANGE]`
    Signal {
        symbol: String,
        interval: Interval,
        predicate: String,
        exchange: String,
    },
    /// `/buy_smart_auto` and `/sell_smart_auto`:
    /// `<SYMBOL> <QTY> <EXCHANGE> <PRODUCT> <INTERVAL> <VALIDITY> "<PREDICATE>"`
    SmartAuto {
        action: OrderAction,
        symbol: String,
        quantity: u32,
        exchange: String,
        product: Product,
        interval: Interval,
        expires_at: DateTime<Utc>,
        predicate: String,
    },
    /// `/status_orders`
    StatusOrders,
    /// `/cancel_order <ID>`
    CancelOrder { id: String },
    /// `/cancel_all_orders`
    CancelAllOrders,
    /// `/price <SYMBOL> [EXCHANGE]`
    Price { symbol: String, exchange: String },
    /// `/buy_smart` and `/sell_smart`: `<SYMBOL> <QTY> [EXCHANGE] [PRODUCT]`
    Smart {
        action: OrderAction,
        symbol: String,
        quantity: u32,
        exchange: String,
        product: Product,
    },
    /// `/help`
    Help,
}

/// Help text listed by `/help` and on unknown commands.
pub const HELP_TEXT: &str = "Commands:\n\
    /price <SYMBOL> [EXCHANGE]\n\
    /signal <SYMBOL> <INTERVAL> \"<PREDICATE>\" [EXCHANGE]\n\
    /buy_smart <SYMBOL> <QTY> [EXCHANGE] [PRODUCT]\n\
    /sell_smart <SYMBOL> <QTY> [EXCHANGE] [PRODUCT]\n\
    /buy_smart_auto <SYMBOL> <QTY> <EXCHANGE> <PRODUCT> <INTERVAL> <VALIDITY> \"<PREDICATE>\"\n\
    /sell_smart_auto <SYMBOL> <QTY> <EXCHANGE> <PRODUCT> <INTERVAL> <VALIDITY> \"<PREDICATE>\"\n\
    /status_orders\n\
    /cancel_order <ID>\n\
    /cancel_all_orders\n\
    \n\
    Intervals: 5m, 15m, 1h. Validity: e.g. 30s, 45m, 2h, 7d (max 30d) or 'forever'.\n\
    Predicates: RSI14 < 30, sma(close, 20) > 100, MACD > 0, CLOSE > 1500 ...";

/// Does this message address the command parser at all?
pub fn is_slash(line: &str) -> bool {
    line.trim_start().starts_with('/')
}

/// Parse one slash-command line.
pub fn parse(line: &str, now: DateTime<Utc>, default_exchange: &str) -> Result<Command, String> {
    let tokens = tokenize(line)?;
    let Some((command, args)) = tokens.split_first() else {
        return Err("empty command".to_string());
    };

    match command.to_ascii_lowercase().as_str() {
        "/signal" => parse_signal(args, default_exchange),
        "/buy_smart_auto" => parse_smart_auto(OrderAction::Buy, args, now),
        "/sell_smart_auto" => parse_smart_auto(OrderAction::Sell, args, now),
        "/status_orders" => expect_no_args(args, Command::StatusOrders),
        "/cancel_order" => match args {
            [id] => Ok(Command::CancelOrder { id: id.clone() }),
            _ => Err("usage: /cancel_order <ID>".to_string()),
        },
        "/cancel_all_orders" => expect_no_args(args, Command::CancelAllOrders),
        "/price" => parse_price(args, default_exchange),
        "/buy_smart" => parse_smart(OrderAction::Buy, args, default_exchange),
        "/sell_smart" => parse_smart(OrderAction::Sell, args, default_exchange),
        "/help" => Ok(Command::Help),
        other => Err(format!("unknown command '{other}' — try /help")),
    }
}

fn expect_no_args(args: &[String], command: Command) -> Result<Command, String> {
    if args.is_empty() {
        Ok(command)
    } else {
        Err("this command takes no arguments".to_string())
    }
}

fn parse_signal(args: &[String], default_exchange: &str) -> Result<Command, String> {
    match args {
        [symbol, interval, predicate] | [symbol, interval, predicate, _] => {
            let exchange = match args.get(3) {
                Some(e) => e.to_uppercase(),
                None => default_exchange.to_string(),
            };
            Ok(Command::Signal {
                symbol: symbol.to_uppercase(),
                interval: interval.parse()?,
                predicate: predicate.clone(),
                exchange,
            })
        }
        _ => Err("usage: /signal <SYMBOL> <INTERVAL> \"<PREDICATE>\" [EXCHANGE]".to_string()),
    }
}

fn parse_smart_auto(
    action: OrderAction,
    args: &[String],
    now: DateTime<Utc>,
) -> Result<Command, String> {
    let [symbol, quantity, exchange, product, interval, validity, predicate] = args else {
        return Err(format!(
            "usage: /{}_smart_auto <SYMBOL> <QTY> <EXCHANGE> <PRODUCT> <INTERVAL> <VALIDITY> \"<PREDICATE>\"",
            action.to_string().to_lowercase()
        ));
    };

    Ok(Command::SmartAuto {
        action,
        symbol: symbol.to_uppercase(),
        quantity: parse_quantity(quantity)?,
        exchange: exchange.to_uppercase(),
        product: product.parse()?,
        interval: interval.parse()?,
        expires_at: parse_validity(validity, now)?,
        predicate: predicate.clone(),
    })
}

fn parse_price(args: &[String], default_exchange: &str) -> Result<Command, String> {
    match args {
        [symbol] | [symbol, _] => {
            let exchange = match args.get(1) {
                Some(e) => e.to_uppercase(),
                None => default_exchange.to_string(),
            };
            Ok(Command::Price {
                symbol: symbol.to_uppercase(),
                exchange,
            })
        }
        _ => Err("usage: /price <SYMBOL> [EXCHANGE]".to_string()),
    }
}

fn parse_smart(
    action: OrderAction,
    args: &[String],
    default_exchange: &str,
) -> Result<Command, String> {
    if !(2..=4).contains(&args.len()) {
        return Err(format!(
            "usage: /{}_smart <SYMBOL> <QTY> [EXCHANGE] [PRODUCT]",
            action.to_string().to_lowercase()
        ));
    }

    let exchange = match args.get(2) {
        Some(e) => e.to_uppercase(),
        None => default_exchange.to_string(),
    };
    let product = match args.get(3) {
        Some(p) => p.parse()?,
        None => Product::Mis,
    };

    Ok(Command::Smart {
        action,
        symbol: args[0].to_uppercase(),
        quantity: parse_quantity(&args[1])?,
        exchange,
        product,
    })
}

fn parse_quantity(raw: &str) -> Result<u32, String> {
    let quantity: u32 = raw
        .parse()
        .map_err(|_| format!("quantity must be a positive integer, got '{raw}'"))?;
    if quantity == 0 {
        return Err("quantity must be greater than zero".to_string());
    }
    Ok(quantity)
}

/// Parse a validity token: literal `forever` (year 9999) or `<n>{s|m|h|d}`
/// capped at 30 days.
pub fn parse_validity(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    if raw.eq_ignore_ascii_case("forever") {
        return Utc
            .with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
            .single()
            .ok_or_else(|| "internal error building the far-future deadline".to_string());
    }

    let (digits, unit) = raw.split_at(raw.len().saturating_sub(1));
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("validity must be like 30s, 45m, 2h, 7d or 'forever' — got '{raw}'"))?;
    if value == 0 {
        return Err("validity must be greater than zero".to_string());
    }

    let seconds = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 60 * 60,
        "d" => value * 24 * 60 * 60,
        _ => {
            return Err(format!(
                "validity must end in s, m, h or d — got '{raw}'"
            ))
        }
    };

    if seconds > MAX_VALIDITY_SECS {
        return Err("validity cannot exceed 30d".to_string());
    }

    Ok(now + chrono::Duration::seconds(seconds as i64))
}

/// Split a command line into whitespace-separated tokens, keeping a
/// double-quoted run as one token (quotes stripped).
fn tokenize(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.trim().chars() {
        match c {
            '"' => {
                if in_quotes {
                    tokens.push(std::mem::take(&mut current));
                } else if !current.is_empty() {
                    return Err("unexpected '\"' inside a token".to_string());
                }
                in_quotes = !in_quotes;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if in_quotes {
        return Err("unterminated quote in command".to_string());
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    Ok(tokens)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 15, 10, 0, 0).single().unwrap()
    }

    #[test]
    fn tokenize_keeps_quoted_predicate_whole() {
        let tokens = tokenize(r#"/signal RELIANCE 5m "RSI14 < 30" NSE"#).unwrap();
        assert_eq!(tokens, vec!["/signal", "RELIANCE", "5m", "RSI14 < 30", "NSE"]);
    }

    #[test]
    fn tokenize_rejects_unterminated_quote() {
        assert!(tokenize(r#"/signal X 5m "RSI14 < 30"#).is_err());
    }

    #[test]
    fn tokenize_empty_quotes_yield_empty_token() {
        let tokens = tokenize(r#"/signal X 5m """#).unwrap();
        assert_eq!(tokens, vec!["/signal", "X", "5m", ""]);
    }

    #[test]
    fn signal_with_default_exchange() {
        let cmd = parse(r#"/signal reliance 5m "RSI14 < 30""#, now(), "NSE").unwrap();
        assert_eq!(
            cmd,
            Command::Signal {
                symbol: "RELIANCE".into(),
                interval: Interval::M5,
                predicate: "RSI14 < 30".into(),
                exchange: "NSE".into(),
            }
        );
    }

    #[test]
    fn signal_with_explicit_exchange_uppercased() {
        let cmd = parse(r#"/signal RELIANCE 5m "RSI14 < 30" bse"#, now(), "NSE").unwrap();
        match cmd {
            Command::Signal { exchange, .. } => assert_eq!(exchange, "BSE"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn smart_auto_full_form() {
        let cmd = parse(
            r#"/buy_smart_auto TCS 10 NSE NRML 5m 2h "RSI14 < 30""#,
            now(),
            "NSE",
        )
        .unwrap();
        match cmd {
            Command::SmartAuto {
                action,
                symbol,
                quantity,
                exchange,
                product,
                interval,
                expires_at,
                predicate,
            } => {
                assert_eq!(action, OrderAction::Buy);
                assert_eq!(symbol, "TCS");
                assert_eq!(quantity, 10);
                assert_eq!(exchange, "NSE");
                assert_eq!(product, Product::Nrml);
                assert_eq!(interval, Interval::M5);
                assert_eq!(expires_at, now() + chrono::Duration::hours(2));
                assert_eq!(predicate, "RSI14 < 30");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn sell_smart_auto_parses() {
        let cmd = parse(
            r#"/sell_smart_auto INFY 1 NSE MIS 15m 30s "CLOSE > 9999999""#,
            now(),
            "NSE",
        )
        .unwrap();
        match cmd {
            Command::SmartAuto { action, interval, .. } => {
                assert_eq!(action, OrderAction::Sell);
                assert_eq!(interval, Interval::M15);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn smart_auto_rejects_bad_interval() {
        let err = parse(
            r#"/buy_smart_auto TCS 10 NSE NRML 2m 2h "RSI14 < 30""#,
            now(),
            "NSE",
        )
        .unwrap_err();
        assert!(err.contains("interval"), "got: {err}");
    }

    #[test]
    fn smart_auto_rejects_zero_quantity() {
        let err = parse(
            r#"/buy_smart_auto TCS 0 NSE NRML 5m 2h "RSI14 < 30""#,
            now(),
            "NSE",
        )
        .unwrap_err();
        assert!(err.contains("quantity"), "got: {err}");
    }

    #[test]
    fn smart_auto_rejects_bad_product() {
        let err = parse(
            r#"/buy_smart_auto TCS 10 NSE BO 5m 2h "RSI14 < 30""#,
            now(),
            "NSE",
        )
        .unwrap_err();
        assert!(err.contains("product"), "got: {err}");
    }

    #[test]
    fn smart_auto_missing_args() {
        assert!(parse("/buy_smart_auto TCS 10", now(), "NSE").is_err());
    }

    #[test]
    fn validity_units() {
        let base = now();
        assert_eq!(parse_validity("30s", base).unwrap(), base + chrono::Duration::seconds(30));
        assert_eq!(parse_validity("45m", base).unwrap(), base + chrono::Duration::minutes(45));
        assert_eq!(parse_validity("2h", base).unwrap(), base + chrono::Duration::hours(2));
        assert_eq!(parse_validity("30d", base).unwrap(), base + chrono::Duration::days(30));
    }

    #[test]
    fn validity_forever_is_year_9999() {
        let deadline = parse_validity("forever", now()).unwrap();
        assert_eq!(deadline.format("%Y").to_string(), "9999");
    }

    #[test]
    fn validity_rejects_over_30_days() {
        assert!(parse_validity("31d", now()).is_err());
        assert!(parse_validity("721h", now()).is_err());
    }

    #[test]
    fn validity_rejects_garbage() {
        assert!(parse_validity("soon", now()).is_err());
        assert!(parse_validity("10x", now()).is_err());
        assert!(parse_validity("0s", now()).is_err());
        assert!(parse_validity("", now()).is_err());
    }

    #[test]
    fn price_defaults_exchange() {
        let cmd = parse("/price reliance", now(), "NSE").unwrap();
        assert_eq!(
            cmd,
            Command::Price {
                symbol: "RELIANCE".into(),
                exchange: "NSE".into(),
            }
        );
    }

    #[test]
    fn smart_defaults_product_to_mis() {
        let cmd = parse("/buy_smart TCS 5", now(), "NSE").unwrap();
        match cmd {
            Command::Smart { product, exchange, .. } => {
                assert_eq!(product, Product::Mis);
                assert_eq!(exchange, "NSE");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cancel_order_requires_id() {
        assert!(parse("/cancel_order", now(), "NSE").is_err());
        let cmd = parse("/cancel_order abc-123", now(), "NSE").unwrap();
        assert_eq!(cmd, Command::CancelOrder { id: "abc-123".into() });
    }

    #[test]
    fn bare_commands() {
        assert_eq!(parse("/status_orders", now(), "NSE").unwrap(), Command::StatusOrders);
        assert_eq!(parse("/cancel_all_orders", now(), "NSE").unwrap(), Command::CancelAllOrders);
        assert_eq!(parse("/help", now(), "NSE").unwrap(), Command::Help);
    }

    #[test]
    fn unknown_command_mentions_help() {
        let err = parse("/teleport", now(), "NSE").unwrap_err();
        assert!(err.contains("/help"));
    }

    #[test]
    fn is_slash_detection() {
        assert!(is_slash("/price TCS"));
        assert!(is_slash("  /help"));
        assert!(!is_slash("what is the price of TCS?"));
    }

    #[test]
    fn command_names_are_case_insensitive() {
        assert_eq!(parse("/HELP", now(), "NSE").unwrap(), Command::Help);
    }
}
