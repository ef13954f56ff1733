// =============================================================================
// Alert Notifier — e-mail hand-off to an external delivery service
// =============================================================================
//
// Mail delivery itself is an external collaborator; Meridian hands alerts to
// an HTTP webhook and moves on. A delivery failure is logged and never
// propagates — losing an alert must not take a monitor down with it.
// Without a configured webhook the notifier degrades to a log line.
// =============================================================================

use serde_json::json;
use tracing::{debug, warn};

pub struct Notifier {
    http: reqwest::Client,
    webhook_url: Option<String>,
    recipient: String,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>, recipient: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        Self {
            http,
            webhook_url,
            recipient: recipient.into(),
        }
    }

    /// Dispatch one alert to the configured recipient. Never fails the
    /// caller; outcomes are logged.
    pub async fn send(&self, subject: &str, body_html: &str) {
        let Some(url) = &self.webhook_url else {
            debug!(subject, "mail webhook not configured — alert logged only");
            return;
        };

        let payload = json!({
            "to": self.recipient,
            "subject": subject,
            "html": body_html,
        });

        match self.http.post(url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(subject, to = %self.recipient, "alert dispatched");
            }
            Ok(resp) => {
                warn!(subject, status = %resp.status(), "alert webhook returned non-success");
            }
            Err(e) => {
                warn!(subject, error = %e, "alert webhook failed");
            }
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("webhook_url", &self.webhook_url)
            .field("recipient", &self.recipient)
            .finish()
    }
}
