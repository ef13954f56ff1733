// =============================================================================
// Outbound write path — one writer task per session
// =============================================================================
//
// Every frame a session emits — echo, typing indicator, system notice, error
// — is enqueued here and drained by a single task that owns the WebSocket
// sink. Workers never touch the transport; they clone the sender and frames
// from one producer are delivered in the order they were produced. The writer
// also sends a protocol-level Ping every (9/10) of the pong timeout.
// =============================================================================

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::session::frames::{ChatData, OutboundFrame, Role, SignalReport, TypingData};

/// How long the read side waits for any inbound traffic before closing.
pub const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Keep-alive cadence: (9/10) of [`PONG_TIMEOUT`].
pub const KEEPALIVE_PERIOD: Duration = Duration::from_secs(54);

/// Frames queued per session before senders are backpressured.
const OUTBOUND_QUEUE: usize = 64;

/// Cloneable handle for emitting frames to one session.
#[derive(Clone)]
pub struct OutboundSender {
    tx: mpsc::Sender<OutboundFrame>,
}

impl OutboundSender {
    /// Create the session's outbound queue. The receiver goes to
    /// [`run_writer`]; the sender is cloned into the dispatcher and workers.
    pub fn channel() -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        (Self { tx }, rx)
    }

    /// Enqueue a frame. A closed session drops the frame silently — by then
    /// there is nobody to tell.
    pub async fn emit(&self, frame: OutboundFrame) {
        if self.tx.send(frame).await.is_err() {
            debug!("outbound frame dropped — session closed");
        }
    }

    pub async fn emit_chat(&self, role: Role, content: impl Into<String>) {
        self.emit(OutboundFrame::Chat {
            content: content.into(),
            data: ChatData::now(role),
        })
        .await;
    }

    /// Echo of a received user message.
    pub async fn emit_user_echo(&self, content: impl Into<String>) {
        self.emit_chat(Role::User, content).await;
    }

    pub async fn emit_assistant(&self, content: impl Into<String>) {
        self.emit_chat(Role::Assistant, content).await;
    }

    /// Engine-originated notice (monitor fired, cancelled, expired, ...).
    pub async fn emit_system(&self, content: impl Into<String>) {
        self.emit_chat(Role::System, content).await;
    }

    /// Assistant reply carrying a structured signal verdict.
    pub async fn emit_signal_report(&self, content: impl Into<String>, report: SignalReport) {
        let mut data = ChatData::now(Role::Assistant);
        data.signal = Some(report);
        self.emit(OutboundFrame::Chat {
            content: content.into(),
            data,
        })
        .await;
    }

    pub async fn emit_typing(&self, active: bool) {
        self.emit(OutboundFrame::Typing {
            data: TypingData { active },
        })
        .await;
    }

    pub async fn emit_error(&self, content: impl Into<String>) {
        self.emit(OutboundFrame::Error {
            content: content.into(),
            data: ChatData::now(Role::System),
        })
        .await;
    }

    pub async fn emit_pong(&self) {
        self.emit(OutboundFrame::Pong).await;
    }
}

/// Drain the outbound queue into the WebSocket sink. Exits when the queue
/// closes (all senders dropped) or the transport fails.
pub async fn run_writer(mut sink: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<OutboundFrame>) {
    let mut keepalive = tokio::time::interval_at(
        tokio::time::Instant::now() + KEEPALIVE_PERIOD,
        KEEPALIVE_PERIOD,
    );
    keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(frame) => match serde_json::to_string(&frame) {
                    Ok(json) => {
                        if sink.send(Message::Text(json)).await.is_err() {
                            debug!("outbound write failed — stopping writer");
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to serialise outbound frame"),
                },
                None => break,
            },
            _ = keepalive.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    debug!("keep-alive ping failed — stopping writer");
                    break;
                }
            }
        }
    }

    let _ = sink.close().await;
}
