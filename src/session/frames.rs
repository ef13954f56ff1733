// =============================================================================
// Session wire frames — framed JSON, both directions
// =============================================================================

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound on a single inbound frame (bytes).
pub const MAX_INBOUND_FRAME: usize = 512 * 1024;

/// Who a chat frame is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Frames the client sends.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundFrame {
    Chat {
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        file_id: Option<String>,
        #[serde(default)]
        data: Option<serde_json::Value>,
    },
    Typing,
    Ping,
}

/// Structured payload attached to a `/signal` reply.
#[derive(Debug, Clone, Serialize)]
pub struct SignalReport {
    pub signal_met: bool,
    pub indicator_values: BTreeMap<String, f64>,
}

/// Metadata attached to chat and error frames.
#[derive(Debug, Clone, Serialize)]
pub struct ChatData {
    pub role: Role,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<SignalReport>,
}

impl ChatData {
    pub fn now(role: Role) -> Self {
        Self {
            role,
            created_at: Utc::now(),
            signal: None,
        }
    }
}

/// Typing-indicator payload.
#[derive(Debug, Clone, Serialize)]
pub struct TypingData {
    pub active: bool,
}

/// Frames the server sends.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame {
    Chat { content: String, data: ChatData },
    Typing { data: TypingData },
    Pong,
    Error { content: String, data: ChatData },
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_chat_parses() {
        let frame: InboundFrame =
            serde_json::from_str(r#"{"type": "chat", "content": "/help"}"#).unwrap();
        match frame {
            InboundFrame::Chat { content, file_id, .. } => {
                assert_eq!(content.as_deref(), Some("/help"));
                assert!(file_id.is_none());
            }
            other => panic!("expected chat frame, got {other:?}"),
        }
    }

    #[test]
    fn inbound_ping_parses() {
        let frame: InboundFrame = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert!(matches!(frame, InboundFrame::Ping));
    }

    #[test]
    fn inbound_unknown_type_is_rejected() {
        assert!(serde_json::from_str::<InboundFrame>(r#"{"type": "upload"}"#).is_err());
    }

    #[test]
    fn outbound_chat_shape() {
        let frame = OutboundFrame::Chat {
            content: "hello".into(),
            data: ChatData::now(Role::Assistant),
        };
        let v = serde_json::to_value(&frame).unwrap();
        assert_eq!(v["type"], "chat");
        assert_eq!(v["content"], "hello");
        assert_eq!(v["data"]["role"], "assistant");
        assert!(v["data"]["created_at"].is_string());
        assert!(v["data"].get("signal").is_none());
    }

    #[test]
    fn outbound_signal_report_shape() {
        let mut values = BTreeMap::new();
        values.insert("RSI14".to_string(), 25.5);
        let mut data = ChatData::now(Role::Assistant);
        data.signal = Some(SignalReport {
            signal_met: true,
            indicator_values: values,
        });
        let v = serde_json::to_value(&OutboundFrame::Chat {
            content: "Signal Met".into(),
            data,
        })
        .unwrap();
        assert_eq!(v["data"]["signal"]["signal_met"], true);
        assert_eq!(v["data"]["signal"]["indicator_values"]["RSI14"], 25.5);
    }

    #[test]
    fn outbound_pong_shape() {
        let v = serde_json::to_value(&OutboundFrame::Pong).unwrap();
        assert_eq!(v["type"], "pong");
    }

    #[test]
    fn outbound_typing_shape() {
        let v = serde_json::to_value(&OutboundFrame::Typing {
            data: TypingData { active: true },
        })
        .unwrap();
        assert_eq!(v["type"], "typing");
        assert_eq!(v["data"]["active"], true);
    }
}
