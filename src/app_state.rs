// =============================================================================
// Central Application State — Meridian Trading Assistant
// =============================================================================
//
// The process-wide dependency bundle shared by every session: configuration,
// the broker gateway, the alert notifier, the chat collaborator and the
// message store. Per-session state (registry, outbound queue) lives with the
// session, not here — one session crashing never touches another.
// =============================================================================

use std::sync::Arc;

use crate::broker::client::BrokerClient;
use crate::chat::ChatBackend;
use crate::config::EngineConfig;
use crate::notify::Notifier;
use crate::store::MessageStore;

pub struct AppState {
    pub config: EngineConfig,
    pub broker: Arc<BrokerClient>,
    pub notifier: Arc<Notifier>,
    pub chat: Arc<ChatBackend>,
    pub store: Arc<MessageStore>,
}

impl AppState {
    /// Wire up every shared collaborator from the configuration.
    pub fn new(config: EngineConfig) -> Self {
        let broker = Arc::new(BrokerClient::new(
            config.broker_base_url.clone(),
            config.broker_api_key.clone(),
            config.strategy_tag.clone(),
        ));
        let notifier = Arc::new(Notifier::new(
            config.mail_webhook_url.clone(),
            config.alert_recipient.clone(),
        ));
        let chat = Arc::new(ChatBackend::new(config.chat_proxy_url.clone()));
        let store = Arc::new(MessageStore::new());

        Self {
            config,
            broker,
            notifier,
            chat,
            store,
        }
    }
}
