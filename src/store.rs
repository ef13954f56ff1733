// =============================================================================
// Message Store — append-only chat log keyed by user
// =============================================================================
//
// In-memory, bounded per user. There is no transactional coupling to the
// engine: monitors run whether or not a message was recorded.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::session::frames::Role;

/// Messages retained per user before the oldest are evicted.
const MAX_MESSAGES_PER_USER: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct MessageStore {
    messages: Mutex<HashMap<String, Vec<StoredMessage>>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one message to a user's log.
    pub fn append(&self, user_id: &str, role: Role, content: impl Into<String>) {
        let mut map = self.messages.lock();
        let log = map.entry(user_id.to_string()).or_default();
        log.push(StoredMessage {
            role,
            content: content.into(),
            created_at: Utc::now(),
        });
        while log.len() > MAX_MESSAGES_PER_USER {
            log.remove(0);
        }
    }

    /// The most recent `count` messages for a user, oldest first.
    pub fn recent(&self, user_id: &str, count: usize) -> Vec<StoredMessage> {
        let map = self.messages.lock();
        match map.get(user_id) {
            Some(log) => {
                let start = log.len().saturating_sub(count);
                log[start..].to_vec()
            }
            None => Vec::new(),
        }
    }
}
