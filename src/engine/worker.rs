// =============================================================================
// Monitor Worker — one long-lived task per conditional auto-order
// =============================================================================
//
// Loop: tick → fetch history → evaluate predicate → on match, place a smart
// order and spawn the status poller → keep monitoring. Cancellation and
// expiry converge on the registry's exactly-once removal.
//
// Select priority is deterministic (`biased`): cancellation first, expiry
// second, tick last. A tick runs to completion before the next select — the
// worker is single-threaded within itself, so at most one placement can be
// in flight and a cancel observed after a placement started cannot retract
// the order, only stop further ticks.
//
// The supervisor wraps the loop in a panic boundary: one bad tick emits an
// error, notifies e-mail and restarts the loop with the same record — unless
// the record has expired, in which case cleanup runs and the worker is done.
//
// Post-match policy: the worker keeps monitoring after a successful
// placement; the predicate may legitimately hold again on a later tick.
// =============================================================================

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::broker::client::BrokerClient;
use crate::broker::error::BrokerError;
use crate::broker::types::SmartOrderRequest;
use crate::engine::monitor::AutoOrder;
use crate::engine::poller;
use crate::engine::registry::AutoOrderRegistry;
use crate::notify::Notifier;
use crate::predicate::{self, PredicateError};
use crate::session::outbound::OutboundSender;
use crate::types::{MonitorStatus, PriceType};

/// Floor on the evaluation cadence regardless of the candle interval.
pub const TICK_FLOOR: Duration = Duration::from_secs(5);

/// Longest stretch the expiry timer is armed for in one go; a later deadline
/// is re-armed when the timer fires without the record having expired.
const EXPIRY_ARM_CAP: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Shared handles a worker needs. Cheap to clone into pollers and restarts.
#[derive(Clone)]
pub struct WorkerContext {
    pub broker: Arc<BrokerClient>,
    pub registry: Arc<AutoOrderRegistry>,
    pub outbound: OutboundSender,
    pub notifier: Arc<Notifier>,
}

/// Why the monitor loop ended.
#[derive(Debug, Clone, PartialEq)]
enum MonitorExit {
    Cancelled,
    Expired,
    InvalidPredicate(PredicateError),
}

/// Spawn the supervised worker task for `record`. The receiver is the
/// registry-owned cancellation signal.
pub fn spawn_worker(
    ctx: WorkerContext,
    record: AutoOrder,
    cancel_rx: mpsc::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(supervise(ctx, record, cancel_rx))
}

/// Run the monitor loop under a panic boundary, restarting it for the same
/// record until it exits normally or the record expires.
async fn supervise(ctx: WorkerContext, mut record: AutoOrder, mut cancel_rx: mpsc::Receiver<()>) {
    info!(
        monitor_id = %record.id,
        symbol = %record.symbol,
        interval = %record.interval,
        expires_at = %record.expires_at,
        "monitor worker started"
    );

    let exit = loop {
        let outcome = AssertUnwindSafe(run_loop(&ctx, &record, &mut cancel_rx))
            .catch_unwind()
            .await;

        match outcome {
            Ok(exit) => break exit,
            Err(payload) => {
                let detail = panic_message(payload.as_ref());
                error!(monitor_id = %record.id, detail = %detail, "monitor worker panicked");
                ctx.outbound
                    .emit_error(format!(
                        "⚠️ Auto-order {} ({}) hit an internal error: {detail}",
                        record.id, record.symbol
                    ))
                    .await;
                ctx.notifier
                    .send(
                        "Auto-order worker crashed",
                        &format!(
                            "<p>Monitor <b>{}</b> on {} crashed: {}</p>",
                            record.id, record.symbol, detail
                        ),
                    )
                    .await;

                if record.is_expired(Utc::now()) {
                    break MonitorExit::Expired;
                }
                warn!(monitor_id = %record.id, "restarting monitor worker after panic");
            }
        }
    };

    finish(&ctx, &mut record, exit).await;
}

/// Terminal handling shared by every exit path. Registry cleanup runs first
/// so the monitor is unobservable before the user is told.
async fn finish(ctx: &WorkerContext, record: &mut AutoOrder, exit: MonitorExit) {
    ctx.registry.remove(&record.id);
    record.status = exit_status(&exit);

    match &exit {
        MonitorExit::Cancelled => {
            ctx.outbound
                .emit_system(format!(
                    "🛑 Auto-order {} ({} {} x {}) cancelled.",
                    record.id, record.action, record.quantity, record.symbol
                ))
                .await;
        }
        MonitorExit::Expired => {
            ctx.outbound
                .emit_system(format!(
                    "⌛ Auto-order {} ({} {} x {}) expired.",
                    record.id, record.action, record.quantity, record.symbol
                ))
                .await;
        }
        MonitorExit::InvalidPredicate(e) => {
            ctx.outbound
                .emit_error(format!("❌ Auto-order {} stopped: {e}", record.id))
                .await;
        }
    }

    info!(
        monitor_id = %record.id,
        status = %record.status,
        "monitor worker finished"
    );
}

/// Terminal status for an exit reason. Terminal statuses are sticky; the
/// record is out of the registry before this is applied.
fn exit_status(exit: &MonitorExit) -> MonitorStatus {
    match exit {
        MonitorExit::Cancelled => MonitorStatus::Cancelled,
        MonitorExit::Expired => MonitorStatus::Expired,
        MonitorExit::InvalidPredicate(_) => MonitorStatus::Failed,
    }
}

/// The monitor loop proper. Runs until cancelled, expired or the predicate
/// turns out to be invalid.
async fn run_loop(
    ctx: &WorkerContext,
    record: &AutoOrder,
    cancel_rx: &mut mpsc::Receiver<()>,
) -> MonitorExit {
    let period = record.interval.period().max(TICK_FLOOR);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            // Cancellation wins any same-cycle race. A closed channel means
            // the registry entry is gone — equally a cancel.
            _ = cancel_rx.recv() => {
                debug!(monitor_id = %record.id, "cancellation observed");
                return MonitorExit::Cancelled;
            }

            _ = tokio::time::sleep(arm_duration(record)) => {
                if record.is_expired(Utc::now()) {
                    return MonitorExit::Expired;
                }
                // Deadline beyond the arm cap — loop re-arms.
            }

            _ = ticker.tick() => {
                if let Some(exit) = run_tick(ctx, record).await {
                    return exit;
                }
            }
        }
    }
}

/// Time until expiry, capped so far-future deadlines re-arm periodically.
fn arm_duration(record: &AutoOrder) -> Duration {
    (record.expires_at - Utc::now())
        .to_std()
        .unwrap_or(Duration::ZERO)
        .min(EXPIRY_ARM_CAP)
}

/// One evaluation pass. `Some(exit)` ends the monitor loop; `None` keeps
/// monitoring — transient broker trouble is logged and retried next tick.
async fn run_tick(ctx: &WorkerContext, record: &AutoOrder) -> Option<MonitorExit> {
    let (start_date, end_date) = record.interval.history_window(Utc::now().date_naive());

    let candles = match ctx
        .broker
        .fetch_history(
            &record.symbol,
            &record.exchange,
            record.interval.as_str(),
            &start_date,
            &end_date,
        )
        .await
    {
        Ok(candles) => candles,
        Err(e) => {
            warn!(monitor_id = %record.id, error = %e, "history fetch failed — retrying next tick");
            return None;
        }
    };

    if candles.is_empty() {
        debug!(monitor_id = %record.id, "empty history — nothing to evaluate");
        return None;
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    let evaluation = match predicate::evaluate(&record.predicate, &closes) {
        Ok(evaluation) => evaluation,
        // Predicate errors are configuration errors; retrying cannot help.
        Err(e) => return Some(MonitorExit::InvalidPredicate(e)),
    };

    debug!(
        monitor_id = %record.id,
        met = evaluation.met,
        values = ?evaluation.values,
        "predicate evaluated"
    );

    if evaluation.met {
        place_order(ctx, record).await;
    }
    None
}

/// Place the smart order for a matched predicate. Rejection is surfaced and
/// monitoring continues; transport trouble is retried on the next tick.
async fn place_order(ctx: &WorkerContext, record: &AutoOrder) {
    let request = SmartOrderRequest {
        strategy: ctx.broker.strategy().to_string(),
        symbol: record.symbol.clone(),
        exchange: record.exchange.clone(),
        action: record.action,
        pricetype: PriceType::Market,
        product: record.product,
        quantity: record.quantity,
        position_size: record.quantity,
        price: None,
    };

    match ctx.broker.place_smart_order(&request).await {
        Ok(ack) => {
            info!(
                monitor_id = %record.id,
                order_id = %ack.order_id,
                status = %ack.status,
                "auto-order placed"
            );
            ctx.outbound
                .emit_system(format!(
                    "✅ EXECUTED: {} {} x {} ({}) — broker order {}. Monitoring continues.",
                    record.action, record.quantity, record.symbol, record.id, ack.order_id
                ))
                .await;
            ctx.notifier
                .send(
                    "Auto-order executed",
                    &format!(
                        "<p>Monitor <b>{}</b> fired: {} {} x {} — broker order {}.</p>",
                        record.id, record.action, record.quantity, record.symbol, ack.order_id
                    ),
                )
                .await;
            poller::spawn_status_poller(ctx.clone(), record.clone(), ack.order_id);
        }
        Err(BrokerError::RejectedByBroker(message)) | Err(BrokerError::BadRequest(message)) => {
            warn!(monitor_id = %record.id, reason = %message, "order rejected by broker");
            ctx.outbound
                .emit_error(format!(
                    "❌ Auto-order {} ({}): order rejected — {message}",
                    record.id, record.symbol
                ))
                .await;
            ctx.notifier
                .send(
                    "Auto-order rejected",
                    &format!(
                        "<p>Monitor <b>{}</b> on {}: broker rejected the order: {}</p>",
                        record.id, record.symbol, message
                    ),
                )
                .await;
        }
        Err(e) => {
            warn!(monitor_id = %record.id, error = %e, "order placement failed — retrying next tick");
        }
    }
}

/// Human-readable panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::monitor::MonitorDraft;
    use crate::types::{Interval, OrderAction, Product};

    fn record_expiring_in(hours: i64) -> AutoOrder {
        let draft = MonitorDraft {
            user_id: "u1".into(),
            symbol: "TCS".into(),
            exchange: "NSE".into(),
            product: Product::Nrml,
            action: OrderAction::Buy,
            quantity: 10,
            interval: Interval::M5,
            predicate: "RSI14 < 30".into(),
            expires_at: Utc::now() + chrono::Duration::hours(hours),
        };
        let registry = AutoOrderRegistry::new();
        let (record, _rx) = registry.register(draft);
        record
    }

    #[tokio::test]
    async fn panic_boundary_captures_the_payload() {
        let result = AssertUnwindSafe(async { panic!("boom") }).catch_unwind().await;
        let payload = result.unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom");
    }

    #[tokio::test]
    async fn panic_boundary_passes_values_through() {
        let result = AssertUnwindSafe(async { 42_u32 }).catch_unwind().await;
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn panic_message_handles_string_payloads() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(7_i32);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[test]
    fn arm_duration_caps_far_future_deadlines() {
        let record = record_expiring_in(24 * 365 * 100);
        assert_eq!(arm_duration(&record), EXPIRY_ARM_CAP);
    }

    #[test]
    fn arm_duration_zero_once_expired() {
        let record = record_expiring_in(-1);
        assert_eq!(arm_duration(&record), Duration::ZERO);
    }

    #[test]
    fn exit_reasons_map_to_terminal_statuses() {
        assert_eq!(exit_status(&MonitorExit::Cancelled), MonitorStatus::Cancelled);
        assert_eq!(exit_status(&MonitorExit::Expired), MonitorStatus::Expired);
        let e = MonitorExit::InvalidPredicate(PredicateError::MissingPeriod("RSI".into()));
        assert_eq!(exit_status(&e), MonitorStatus::Failed);
        assert!(exit_status(&e).is_terminal());
    }

    #[test]
    fn tick_floor_clamps_short_intervals() {
        assert!(Interval::M5.period().max(TICK_FLOOR) >= TICK_FLOOR);
        assert_eq!(Duration::from_secs(1).max(TICK_FLOOR), TICK_FLOOR);
    }
}
