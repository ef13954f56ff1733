// =============================================================================
// Session Command Dispatcher — routes one user's frames to the engine
// =============================================================================
//
// Owns the routing from inbound frames to engine operations. Every reply
// goes through the session's OutboundSender; the dispatcher never touches
// the transport. Emission order per chat message: user echo, typing on,
// response frame(s), typing off. Non-command messages go to the chat
// collaborator and the append-only store.
// =============================================================================

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::broker::error::BrokerError;
use crate::broker::types::SmartOrderRequest;
use crate::chat::CANNED_APOLOGY;
use crate::engine::monitor::MonitorDraft;
use crate::engine::registry::AutoOrderRegistry;
use crate::engine::worker::{spawn_worker, WorkerContext};
use crate::predicate;
use crate::session::commands::{self, Command, HELP_TEXT};
use crate::session::frames::{InboundFrame, Role, SignalReport};
use crate::session::outbound::OutboundSender;
use crate::types::{Interval, OrderAction, PriceType, Product};

pub struct Dispatcher {
    user_id: String,
    state: Arc<AppState>,
    registry: Arc<AutoOrderRegistry>,
    outbound: OutboundSender,
}

impl Dispatcher {
    pub fn new(
        user_id: String,
        state: Arc<AppState>,
        registry: Arc<AutoOrderRegistry>,
        outbound: OutboundSender,
    ) -> Self {
        Self {
            user_id,
            state,
            registry,
            outbound,
        }
    }

    /// Entry point for every parsed inbound frame.
    pub async fn handle_frame(&self, frame: InboundFrame) {
        match frame {
            InboundFrame::Ping => self.outbound.emit_pong().await,
            InboundFrame::Typing => {} // informational only
            InboundFrame::Chat { content: None, .. } => {
                self.outbound.emit_error("empty message").await;
            }
            InboundFrame::Chat {
                content: Some(text),
                ..
            } => self.handle_chat(text.trim()).await,
        }
    }

    async fn handle_chat(&self, text: &str) {
        if text.is_empty() {
            self.outbound.emit_error("empty message").await;
            return;
        }

        // Echo before the typing indicator, indicator before any response.
        self.outbound.emit_user_echo(text).await;
        self.outbound.emit_typing(true).await;

        if commands::is_slash(text) {
            self.handle_command(text).await;
        } else {
            self.handle_freeform(text).await;
        }

        self.outbound.emit_typing(false).await;
    }

    // -------------------------------------------------------------------------
    // Slash commands
    // -------------------------------------------------------------------------

    async fn handle_command(&self, line: &str) {
        let command = match commands::parse(line, Utc::now(), &self.state.config.default_exchange)
        {
            Ok(command) => command,
            Err(reason) => {
                self.outbound.emit_error(reason).await;
                return;
            }
        };

        match command {
            Command::Signal {
                symbol,
                interval,
                predicate,
                exchange,
            } => self.cmd_signal(&symbol, interval, &predicate, &exchange).await,
            Command::SmartAuto {
                action,
                symbol,
                quantity,
                exchange,
                product,
                interval,
                expires_at,
                predicate,
            } => {
                self.cmd_smart_auto(
                    action,
                    symbol,
                    quantity,
                    exchange,
                    product,
                    interval,
                    expires_at,
                    predicate,
                )
                .await
            }
            Command::StatusOrders => self.cmd_status_orders().await,
            Command::CancelOrder { id } => self.cmd_cancel_order(&id).await,
            Command::CancelAllOrders => self.cmd_cancel_all().await,
            Command::Price { symbol, exchange } => self.cmd_price(&symbol, &exchange).await,
            Command::Smart {
                action,
                symbol,
                quantity,
                exchange,
                product,
            } => {
                self.cmd_smart(action, &symbol, quantity, &exchange, product)
                    .await
            }
            Command::Help => self.outbound.emit_assistant(HELP_TEXT).await,
        }
    }

    /// `/signal` — one-shot predicate test, no monitor state.
    async fn cmd_signal(&self, symbol: &str, interval: Interval, predicate: &str, exchange: &str) {
        let closes = match self.fetch_closes(symbol, exchange, interval).await {
            Ok(closes) => closes,
            Err(message) => {
                self.outbound.emit_error(message).await;
                return;
            }
        };

        match predicate::evaluate(predicate, &closes) {
            Ok(evaluation) => {
                let verdict = if evaluation.met {
                    "🔔 Signal Met"
                } else {
                    "🔕 Signal Not Met"
                };
                let mut content = format!("{verdict}: {symbol} {interval} — {predicate}");
                for (name, value) in &evaluation.values {
                    content.push_str(&format!("\n{name} = {value:.4}"));
                }
                self.outbound
                    .emit_signal_report(
                        content,
                        SignalReport {
                            signal_met: evaluation.met,
                            indicator_values: evaluation.values,
                        },
                    )
                    .await;
            }
            Err(e) => self.outbound.emit_error(format!("Invalid predicate: {e}")).await,
        }
    }

    /// `/buy_smart_auto` / `/sell_smart_auto` — arm a monitor.
    async fn cmd_smart_auto(
        &self,
        action: OrderAction,
        symbol: String,
        quantity: u32,
        exchange: String,
        product: Product,
        interval: Interval,
        expires_at: chrono::DateTime<Utc>,
        predicate: String,
    ) {
        // Probe the predicate once up front so a configuration error never
        // arms a monitor. Transient broker trouble must not block arming.
        let readout = match self.fetch_closes(&symbol, &exchange, interval).await {
            Ok(closes) => match predicate::evaluate(&predicate, &closes) {
                Ok(evaluation) => {
                    let mut lines = String::new();
                    for (name, value) in &evaluation.values {
                        lines.push_str(&format!("\n{name} = {value:.4}"));
                    }
                    lines
                }
                Err(e) => {
                    self.outbound
                        .emit_error(format!("Invalid predicate: {e}"))
                        .await;
                    return;
                }
            },
            Err(message) => {
                warn!(symbol = %symbol, reason = %message, "initial readout unavailable");
                "\n(initial indicator readout unavailable — will evaluate on the first tick)"
                    .to_string()
            }
        };

        let (record, cancel_rx) = self.registry.register(MonitorDraft {
            user_id: self.user_id.clone(),
            symbol,
            exchange,
            product,
            action,
            quantity,
            interval,
            predicate,
            expires_at,
        });

        info!(
            monitor_id = %record.id,
            user_id = %self.user_id,
            symbol = %record.symbol,
            "auto-order armed"
        );

        self.outbound
            .emit_assistant(format!(
                "🟢 Auto-order armed: {} {} x {} ({}) every {} until {}.\nMonitor id: {}\nPredicate: {}{}",
                record.action,
                record.quantity,
                record.symbol,
                record.exchange,
                record.interval,
                record.expires_at.format("%Y-%m-%d %H:%M:%S UTC"),
                record.id,
                record.predicate,
                readout,
            ))
            .await;

        spawn_worker(self.worker_context(), record, cancel_rx);
    }

    /// `/status_orders`
    async fn cmd_status_orders(&self) {
        let monitors = self.registry.list(&self.user_id);
        if monitors.is_empty() {
            self.outbound.emit_assistant("No active auto-orders.").await;
            return;
        }

        let mut content = format!("Active auto-orders ({}):", monitors.len());
        for monitor in &monitors {
            content.push_str(&format!("\n{}", monitor.summary()));
        }
        self.outbound.emit_assistant(content).await;
    }

    /// `/cancel_order` — ownership-checked; the worker emits the definitive
    /// cancellation notice.
    async fn cmd_cancel_order(&self, id: &str) {
        let owned = self
            .registry
            .get(id)
            .map(|record| record.user_id == self.user_id)
            .unwrap_or(false);

        // A foreign monitor reads exactly like a missing one.
        if !owned {
            self.outbound
                .emit_error(format!("No auto-order found with id {id}."))
                .await;
            return;
        }

        self.registry.signal_cancel(id);
        self.registry.remove(id);
    }

    /// `/cancel_all_orders`
    async fn cmd_cancel_all(&self) {
        let cancelled = self.registry.cancel_all(&self.user_id);
        if cancelled.is_empty() {
            self.outbound
                .emit_assistant("No active auto-orders to cancel.")
                .await;
        } else {
            self.outbound
                .emit_assistant(format!("Cancelling {} auto-order(s).", cancelled.len()))
                .await;
        }
    }

    /// `/price`
    async fn cmd_price(&self, symbol: &str, exchange: &str) {
        match self.state.broker.fetch_quote(symbol, exchange).await {
            Ok(quote) => {
                self.outbound
                    .emit_assistant(format!(
                        "💹 {symbol} ({exchange}): LTP {:.2}\nO {:.2} | H {:.2} | L {:.2} | prev close {:.2}\nΔ {:+.2} ({:+.2}%)",
                        quote.ltp,
                        quote.open,
                        quote.high,
                        quote.low,
                        quote.prev_close,
                        quote.change,
                        quote.change_percent,
                    ))
                    .await;
            }
            Err(e) => {
                self.outbound
                    .emit_error(format!("Quote for {symbol} failed: {e}"))
                    .await;
            }
        }
    }

    /// `/buy_smart` / `/sell_smart` — immediate pass-through order.
    async fn cmd_smart(
        &self,
        action: OrderAction,
        symbol: &str,
        quantity: u32,
        exchange: &str,
        product: Product,
    ) {
        let request = SmartOrderRequest {
            strategy: self.state.broker.strategy().to_string(),
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            action,
            pricetype: PriceType::Market,
            product,
            quantity,
            position_size: quantity,
            price: None,
        };

        match self.state.broker.place_smart_order(&request).await {
            Ok(ack) => {
                self.outbound
                    .emit_assistant(format!(
                        "✅ Order placed: {action} {quantity} x {symbol} ({exchange}) — broker order {}.",
                        ack.order_id
                    ))
                    .await;
            }
            Err(BrokerError::RejectedByBroker(message)) | Err(BrokerError::BadRequest(message)) => {
                self.outbound
                    .emit_error(format!("❌ Order rejected — {message}"))
                    .await;
            }
            Err(e) => {
                self.outbound
                    .emit_error(format!("Order placement failed: {e}"))
                    .await;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Free-form chat
    // -------------------------------------------------------------------------

    async fn handle_freeform(&self, text: &str) {
        self.state.store.append(&self.user_id, Role::User, text);
        let history = self.state.store.recent(&self.user_id, 20);

        match self.state.chat.reply(text, &history).await {
            Ok(reply) => {
                self.state
                    .store
                    .append(&self.user_id, Role::Assistant, reply.clone());
                self.outbound.emit_assistant(reply).await;
            }
            Err(e) => {
                warn!(user_id = %self.user_id, error = %e, "chat backend unavailable");
                self.outbound.emit_assistant(CANNED_APOLOGY).await;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn worker_context(&self) -> WorkerContext {
        WorkerContext {
            broker: self.state.broker.clone(),
            registry: self.registry.clone(),
            outbound: self.outbound.clone(),
            notifier: self.state.notifier.clone(),
        }
    }

    /// Fetch the close series a predicate evaluates against. Errors come
    /// back as user-readable strings.
    async fn fetch_closes(
        &self,
        symbol: &str,
        exchange: &str,
        interval: Interval,
    ) -> Result<Vec<f64>, String> {
        let (start_date, end_date) = interval.history_window(Utc::now().date_naive());

        let candles = self
            .state
            .broker
            .fetch_history(symbol, exchange, interval.as_str(), &start_date, &end_date)
            .await
            .map_err(|e| format!("History fetch for {symbol} failed: {e}"))?;

        if candles.is_empty() {
            return Err(format!("No history available for {symbol} on {exchange}."));
        }

        Ok(candles.iter().map(|c| c.close).collect())
    }
}
