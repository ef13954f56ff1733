// =============================================================================
// Order Status Poller — bounded reconciliation of a placed order
// =============================================================================
//
// One ephemeral task per placement: sleep, poll the broker, up to five
// attempts fifteen seconds apart (a 75 s budget). `complete` ends the chain
// silently; `rejected`/`cancelled` tell the user and e-mail; anything else —
// the broker's status vocabulary is not pinned — is non-terminal. Exhausting
// the budget asks the user to verify manually. The chain stops early when
// the parent monitor has left the registry.
// =============================================================================

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::monitor::AutoOrder;
use crate::engine::worker::WorkerContext;

/// Gap between status polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Polls before the order is declared unresolved.
pub const MAX_ATTEMPTS: u32 = 5;

/// Spawn the reconciliation chain for a freshly placed order.
pub fn spawn_status_poller(ctx: WorkerContext, monitor: AutoOrder, order_id: String) {
    tokio::spawn(async move {
        run_status_poll(&ctx, &monitor, &order_id, POLL_INTERVAL, MAX_ATTEMPTS).await;
    });
}

/// The poll loop. Cadence and attempt budget are parameters so the
/// reconciliation orderings are testable without wall-clock waits.
pub(crate) async fn run_status_poll(
    ctx: &WorkerContext,
    monitor: &AutoOrder,
    order_id: &str,
    poll_interval: Duration,
    max_attempts: u32,
) {
    for attempt in 1..=max_attempts {
        tokio::time::sleep(poll_interval).await;

        if !ctx.registry.contains(&monitor.id) {
            debug!(order_id, monitor_id = %monitor.id, "parent monitor gone — stopping status poll");
            return;
        }

        match ctx.broker.fetch_order_status(order_id).await {
            Ok(snapshot) => {
                let status = snapshot.normalized();
                debug!(order_id, attempt, status = %status, "order status polled");

                match status.as_str() {
                    "complete" => {
                        info!(order_id, monitor_id = %monitor.id, "order complete");
                        return;
                    }
                    "rejected" | "cancelled" => {
                        warn!(order_id, status = %status, "order failed at the broker");
                        ctx.outbound
                            .emit_error(format!(
                                "❌ Order {order_id} for {} ({}) was {status} by the broker.",
                                monitor.symbol, monitor.id
                            ))
                            .await;
                        ctx.notifier
                            .send(
                                &format!("Order {status}"),
                                &format!(
                                    "<p>Order <b>{order_id}</b> for {} (monitor {}) was {status}.</p>",
                                    monitor.symbol, monitor.id
                                ),
                            )
                            .await;
                        return;
                    }
                    _ => {} // open / pending / trigger pending / unknown — keep polling
                }
            }
            Err(e) => {
                warn!(order_id, attempt, error = %e, "order status poll failed");
            }
        }
    }

    warn!(order_id, monitor_id = %monitor.id, "order status unresolved after {max_attempts} polls");
    ctx.outbound
        .emit_system(format!(
            "⚠️ Order {order_id} for {} ({}) is still unresolved after {max_attempts} checks — please verify manually.",
            monitor.symbol, monitor.id
        ))
        .await;
    ctx.notifier
        .send(
            "Order status unresolved",
            &format!(
                "<p>Order <b>{order_id}</b> for {} (monitor {}) did not reach a terminal status within the polling budget.</p>",
                monitor.symbol, monitor.id
            ),
        )
        .await;
}

// =============================================================================
// Tests — against an in-process broker stub
// =============================================================================
#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use axum::extract::State;
    use axum::routing::post;
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    use super::*;
    use crate::broker::client::BrokerClient;
    use crate::engine::monitor::MonitorDraft;
    use crate::engine::registry::AutoOrderRegistry;
    use crate::notify::Notifier;
    use crate::session::frames::OutboundFrame;
    use crate::session::outbound::OutboundSender;
    use crate::types::{Interval, OrderAction, Product};

    type StatusQueue = Arc<Mutex<VecDeque<&'static str>>>;

    async fn order_status(State(queue): State<StatusQueue>, Json(_): Json<Value>) -> Json<Value> {
        let status = queue.lock().pop_front().unwrap_or("open");
        Json(json!({
            "status": "success",
            "data": { "orderid": "X-1", "order_status": status },
        }))
    }

    /// Start a broker stub that serves the queued statuses in order.
    async fn start_stub(statuses: &[&'static str]) -> String {
        let queue: StatusQueue = Arc::new(Mutex::new(statuses.iter().copied().collect()));
        let app = Router::new()
            .route("/api/v1/orderstatus", post(order_status))
            .with_state(queue);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn context(base_url: &str) -> (WorkerContext, AutoOrder, mpsc::Receiver<OutboundFrame>) {
        let registry = Arc::new(AutoOrderRegistry::new());
        let (record, _cancel_rx) = registry.register(MonitorDraft {
            user_id: "u1".into(),
            symbol: "TCS".into(),
            exchange: "NSE".into(),
            product: Product::Nrml,
            action: OrderAction::Buy,
            quantity: 10,
            interval: Interval::M5,
            predicate: "RSI14 < 30".into(),
            expires_at: chrono::Utc::now() + chrono::Duration::hours(2),
        });
        let (outbound, rx) = OutboundSender::channel();
        let ctx = WorkerContext {
            broker: Arc::new(BrokerClient::new(base_url, "test-key", "meridian")),
            registry,
            outbound,
            notifier: Arc::new(Notifier::new(None, "ops@example.com")),
        };
        (ctx, record, rx)
    }

    fn fast() -> Duration {
        Duration::from_millis(10)
    }

    #[tokio::test]
    async fn complete_on_first_attempt_is_silent() {
        let base = start_stub(&["complete"]).await;
        let (ctx, record, mut rx) = context(&base);

        run_status_poll(&ctx, &record, "X-1", fast(), 5).await;

        // Terminal success produces no user-facing frame.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn rejected_emits_an_error_frame() {
        let base = start_stub(&["pending", "rejected"]).await;
        let (ctx, record, mut rx) = context(&base);

        run_status_poll(&ctx, &record, "X-1", fast(), 5).await;

        match rx.try_recv().unwrap() {
            OutboundFrame::Error { content, .. } => {
                assert!(content.contains("rejected"), "got: {content}");
            }
            other => panic!("expected error frame, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_statuses_exhaust_the_budget() {
        let base = start_stub(&["open", "trigger pending", "queued"]).await;
        let (ctx, record, mut rx) = context(&base);

        run_status_poll(&ctx, &record, "X-1", fast(), 3).await;

        match rx.try_recv().unwrap() {
            OutboundFrame::Chat { content, .. } => {
                assert!(content.contains("unresolved"), "got: {content}");
            }
            other => panic!("expected system frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn removed_monitor_stops_the_chain() {
        let base = start_stub(&["complete"]).await;
        let (ctx, record, mut rx) = context(&base);
        ctx.registry.remove(&record.id);

        run_status_poll(&ctx, &record, "X-1", fast(), 5).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn transient_poll_failures_count_as_attempts() {
        // Nothing listens on this port: every poll fails at transport level.
        let (ctx, record, mut rx) = context("http://127.0.0.1:9");

        run_status_poll(&ctx, &record, "X-1", fast(), 2).await;

        match rx.try_recv().unwrap() {
            OutboundFrame::Chat { content, .. } => assert!(content.contains("unresolved")),
            other => panic!("expected system frame, got {other:?}"),
        }
    }
}
