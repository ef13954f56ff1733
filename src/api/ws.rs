// =============================================================================
// Session WebSocket — one full-duplex command pipe per user
// =============================================================================
//
// Clients connect to `/api/v1/ws?token=<token>`. The token resolves to a
// user id before the upgrade. Each session runs:
//
//   - this read loop, which parses inbound frames and enforces the idle
//     deadline (extended by any inbound traffic, pongs included),
//   - one writer task owning the sink (outbound.rs), which also sends the
//     protocol-level keep-alive pings,
//   - one worker task per armed monitor, plus its poll chains.
//
// Disconnecting tears the session down: every monitor is signalled and
// removed, so no worker outlives its session.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::auth;
use crate::app_state::AppState;
use crate::engine::registry::AutoOrderRegistry;
use crate::session::dispatcher::Dispatcher;
use crate::session::frames::{InboundFrame, MAX_INBOUND_FRAME};
use crate::session::outbound::{self, OutboundSender, PONG_TIMEOUT};

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// Axum handler for the WebSocket upgrade request.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let token = query.token.unwrap_or_default();
    let Some(user_id) = auth::resolve_user(&state.config, &token) else {
        warn!("session rejected: invalid or missing token");
        return (
            axum::http::StatusCode::FORBIDDEN,
            "Invalid or missing token",
        )
            .into_response();
    };

    let user_id = user_id.to_string();
    info!(user_id = %user_id, "session accepted — upgrading");
    ws.on_upgrade(move |socket| run_session(socket, user_id, state))
        .into_response()
}

/// Run one session to completion.
async fn run_session(socket: WebSocket, user_id: String, state: Arc<AppState>) {
    let (sink, mut stream) = socket.split();

    let (sender, outbound_rx) = OutboundSender::channel();
    let writer = tokio::spawn(outbound::run_writer(sink, outbound_rx));

    let registry = Arc::new(AutoOrderRegistry::new());
    let dispatcher = Dispatcher::new(
        user_id.clone(),
        state.clone(),
        registry.clone(),
        sender.clone(),
    );

    let mut deadline = Instant::now() + PONG_TIMEOUT;

    loop {
        tokio::select! {
            message = stream.next() => match message {
                Some(Ok(message)) => {
                    // Any inbound traffic proves the peer is alive.
                    deadline = Instant::now() + PONG_TIMEOUT;

                    match message {
                        Message::Text(text) => {
                            if text.len() > MAX_INBOUND_FRAME {
                                warn!(user_id = %user_id, bytes = text.len(), "inbound frame too large");
                                sender.emit_error("message too large").await;
                                continue;
                            }
                            match serde_json::from_str::<InboundFrame>(&text) {
                                Ok(frame) => dispatcher.handle_frame(frame).await,
                                Err(e) => {
                                    debug!(user_id = %user_id, error = %e, "unparseable inbound frame");
                                    sender.emit_error(format!("unrecognised frame: {e}")).await;
                                }
                            }
                        }
                        // Protocol pings are answered by the transport layer.
                        Message::Ping(_) => {}
                        Message::Pong(_) => debug!(user_id = %user_id, "keep-alive pong"),
                        Message::Close(_) => {
                            info!(user_id = %user_id, "close frame received");
                            break;
                        }
                        Message::Binary(_) => debug!(user_id = %user_id, "binary frame ignored"),
                    }
                }
                Some(Err(e)) => {
                    warn!(user_id = %user_id, error = %e, "session read error");
                    break;
                }
                None => break,
            },

            _ = tokio::time::sleep_until(deadline) => {
                warn!(user_id = %user_id, "no traffic within the pong deadline — closing session");
                break;
            }
        }
    }

    // Teardown: cancel signals fire for every monitor of this session; the
    // workers observe them at their next suspension point and clean up.
    registry.shutdown();

    // The transport is gone; nothing left for the writer to deliver.
    writer.abort();

    info!(user_id = %user_id, "session closed");
}
