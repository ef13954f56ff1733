// =============================================================================
// Chat Backend — LLM proxy for non-command messages
// =============================================================================
//
// The language model lives behind an external HTTP proxy. Meridian sends the
// user's message plus recent history and expects `{"reply": "..."}` back.
// Any failure bubbles up to the dispatcher, which answers with the canned
// apology — a chat outage never touches the engine.
// =============================================================================

use anyhow::Context;
use serde_json::json;

use crate::store::StoredMessage;

/// Reply used when the chat collaborator is unavailable or misbehaves.
pub const CANNED_APOLOGY: &str =
    "Sorry, I couldn't process that right now. Please try again in a moment.";

pub struct ChatBackend {
    http: reqwest::Client,
    proxy_url: Option<String>,
}

impl ChatBackend {
    pub fn new(proxy_url: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("failed to build reqwest client");

        Self { http, proxy_url }
    }

    /// Ask the proxy for a reply to `message` given recent `history`.
    pub async fn reply(&self, message: &str, history: &[StoredMessage]) -> anyhow::Result<String> {
        let url = self
            .proxy_url
            .as_ref()
            .context("chat proxy not configured")?;

        let payload = json!({
            "message": message,
            "history": history,
        });

        let resp = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await
            .context("chat proxy request failed")?;

        anyhow::ensure!(
            resp.status().is_success(),
            "chat proxy returned {}",
            resp.status()
        );

        let body: serde_json::Value = resp
            .json()
            .await
            .context("chat proxy response was not JSON")?;

        body["reply"]
            .as_str()
            .map(str::to_owned)
            .context("chat proxy response missing 'reply'")
    }
}

impl std::fmt::Debug for ChatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatBackend")
            .field("proxy_url", &self.proxy_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_backend_errors() {
        let backend = ChatBackend::new(None);
        assert!(backend.reply("hello", &[]).await.is_err());
    }
}
