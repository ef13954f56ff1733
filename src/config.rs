// =============================================================================
// Engine Configuration — loaded once from the environment at startup
// =============================================================================
//
// Meridian is configured entirely through environment variables (a `.env`
// file is honoured via dotenv in main). Secrets never appear in logs; the
// broker API key is injected by the gateway layer only.
// =============================================================================

use std::collections::HashMap;

use tracing::info;

/// Default bind address for the session server.
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";

/// Default broker API base URL (a locally running gateway).
const DEFAULT_BROKER_URL: &str = "http://127.0.0.1:5000";

/// Runtime configuration for the Meridian engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Address the session server listens on (`MERIDIAN_BIND_ADDR`).
    pub bind_addr: String,
    /// Base URL of the broker HTTP API (`MERIDIAN_BROKER_URL`).
    pub broker_base_url: String,
    /// Broker API key, injected into every request body (`MERIDIAN_BROKER_API_KEY`).
    pub broker_api_key: String,
    /// Strategy tag stamped on every order this engine places (`MERIDIAN_STRATEGY`).
    pub strategy_tag: String,
    /// Recipient for alert e-mails (`MERIDIAN_ALERT_EMAIL`).
    pub alert_recipient: String,
    /// Webhook the notifier posts alerts to; unset disables delivery
    /// (`MERIDIAN_MAIL_WEBHOOK`).
    pub mail_webhook_url: Option<String>,
    /// LLM chat proxy endpoint for non-command messages; unset yields the
    /// canned apology (`MERIDIAN_CHAT_PROXY`).
    pub chat_proxy_url: Option<String>,
    /// Session token → user id map (`MERIDIAN_SESSION_TOKENS`, format
    /// `token:user,token:user`).
    pub session_tokens: HashMap<String, String>,
    /// Exchange assumed when a command omits one (`MERIDIAN_DEFAULT_EXCHANGE`).
    pub default_exchange: String,
}

impl EngineConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Self {
        let session_tokens = std::env::var("MERIDIAN_SESSION_TOKENS")
            .map(|raw| Self::parse_session_tokens(&raw))
            .unwrap_or_default();

        let config = Self {
            bind_addr: env_or("MERIDIAN_BIND_ADDR", DEFAULT_BIND_ADDR),
            broker_base_url: env_or("MERIDIAN_BROKER_URL", DEFAULT_BROKER_URL),
            broker_api_key: std::env::var("MERIDIAN_BROKER_API_KEY").unwrap_or_default(),
            strategy_tag: env_or("MERIDIAN_STRATEGY", "meridian"),
            alert_recipient: std::env::var("MERIDIAN_ALERT_EMAIL").unwrap_or_default(),
            mail_webhook_url: env_opt("MERIDIAN_MAIL_WEBHOOK"),
            chat_proxy_url: env_opt("MERIDIAN_CHAT_PROXY"),
            session_tokens,
            default_exchange: env_or("MERIDIAN_DEFAULT_EXCHANGE", "NSE").to_uppercase(),
        };

        info!(
            bind_addr = %config.bind_addr,
            broker = %config.broker_base_url,
            sessions = config.session_tokens.len(),
            default_exchange = %config.default_exchange,
            "engine config loaded"
        );

        config
    }

    /// Parse the `token:user,token:user` session token map. Malformed entries
    /// are skipped rather than failing startup.
    pub fn parse_session_tokens(raw: &str) -> HashMap<String, String> {
        raw.split(',')
            .filter_map(|pair| {
                let (token, user) = pair.trim().split_once(':')?;
                if token.is_empty() || user.is_empty() {
                    return None;
                }
                Some((token.to_string(), user.to_string()))
            })
            .collect()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
