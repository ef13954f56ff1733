// =============================================================================
// Session Token Resolution
// =============================================================================
//
// Sessions authenticate with a `?token=` query parameter at WebSocket
// upgrade. Tokens map to user ids via configuration; comparison is constant
// time so the token bytes cannot be probed through response timing.
// =============================================================================

use crate::config::EngineConfig;

/// Compare two byte slices in constant time. Every byte of both slices is
/// examined even after a mismatch. A length difference short-circuits, which
/// is acceptable: the attacker does not control the expected token length.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Resolve a presented session token to its user id, or `None` when the
/// token is unknown or empty.
pub fn resolve_user<'a>(config: &'a EngineConfig, token: &str) -> Option<&'a str> {
    if token.is_empty() {
        return None;
    }

    config
        .session_tokens
        .iter()
        .find(|(expected, _)| constant_time_eq(token.as_bytes(), expected.as_bytes()))
        .map(|(_, user)| user.as_str())
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(tokens: &str) -> EngineConfig {
        EngineConfig {
            bind_addr: "127.0.0.1:0".into(),
            broker_base_url: "http://127.0.0.1:5000".into(),
            broker_api_key: String::new(),
            strategy_tag: "meridian".into(),
            alert_recipient: String::new(),
            mail_webhook_url: None,
            chat_proxy_url: None,
            session_tokens: EngineConfig::parse_session_tokens(tokens),
            default_exchange: "NSE".into(),
        }
    }

    #[test]
    fn constant_time_eq_identical() {
        assert!(constant_time_eq(b"hello", b"hello"));
    }

    #[test]
    fn constant_time_eq_different() {
        assert!(!constant_time_eq(b"hello", b"world"));
    }

    #[test]
    fn constant_time_eq_different_lengths() {
        assert!(!constant_time_eq(b"short", b"longer_string"));
    }

    #[test]
    fn resolves_known_token() {
        let config = config_with("tok-a:user-1,tok-b:user-2");
        assert_eq!(resolve_user(&config, "tok-b"), Some("user-2"));
    }

    #[test]
    fn rejects_unknown_and_empty_tokens() {
        let config = config_with("tok-a:user-1");
        assert_eq!(resolve_user(&config, "tok-x"), None);
        assert_eq!(resolve_user(&config, ""), None);
    }

    #[test]
    fn rejects_everything_when_no_tokens_configured() {
        let config = config_with("");
        assert_eq!(resolve_user(&config, "anything"), None);
    }
}
