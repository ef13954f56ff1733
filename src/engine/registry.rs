// =============================================================================
// Auto-Order Registry — per-session monitor ownership
// =============================================================================
//
// A mutex-guarded map from monitor id to its record and cancellation sender.
// The registry is the single owner of every cancellation signal: workers hold
// the receiving end, nothing else may close the channel. Removal takes the
// entry out of the map under the lock — that removal is the exactly-once
// latch, so a concurrent cancel and a natural worker exit can never double-
// close the signal. Critical sections are short; no await inside the lock.
// =============================================================================

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::engine::monitor::{AutoOrder, MonitorDraft};
use crate::types::MonitorStatus;

struct MonitorEntry {
    record: AutoOrder,
    cancel_tx: mpsc::Sender<()>,
}

/// Per-session registry of running monitors.
#[derive(Default)]
pub struct AutoOrderRegistry {
    monitors: Mutex<HashMap<String, MonitorEntry>>,
}

impl AutoOrderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new monitor. The registry issues the id and creation time and
    /// keeps the cancellation sender; the returned receiver belongs to the
    /// worker.
    pub fn register(&self, draft: MonitorDraft) -> (AutoOrder, mpsc::Receiver<()>) {
        let (cancel_tx, cancel_rx) = mpsc::channel(1);

        let record = AutoOrder {
            id: Uuid::new_v4().to_string(),
            user_id: draft.user_id,
            symbol: draft.symbol,
            exchange: draft.exchange,
            product: draft.product,
            action: draft.action,
            quantity: draft.quantity,
            interval: draft.interval,
            predicate: draft.predicate,
            status: MonitorStatus::Running,
            created_at: Utc::now(),
            expires_at: draft.expires_at,
        };

        self.monitors.lock().insert(
            record.id.clone(),
            MonitorEntry {
                record: record.clone(),
                cancel_tx,
            },
        );

        debug!(monitor_id = %record.id, symbol = %record.symbol, "monitor registered");
        (record, cancel_rx)
    }

    /// Snapshot of one monitor's record, if it is still live.
    pub fn get(&self, id: &str) -> Option<AutoOrder> {
        self.monitors.lock().get(id).map(|e| e.record.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.monitors.lock().contains_key(id)
    }

    /// All live monitors belonging to `user_id`, oldest first.
    pub fn list(&self, user_id: &str) -> Vec<AutoOrder> {
        let map = self.monitors.lock();
        let mut records: Vec<AutoOrder> = map
            .values()
            .filter(|e| e.record.user_id == user_id)
            .map(|e| e.record.clone())
            .collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    /// Non-blocking cancel. The channel holds one message: the first signal
    /// is buffered for the worker, later signals are absorbed. Returns
    /// whether this call's signal was accepted.
    pub fn signal_cancel(&self, id: &str) -> bool {
        self.monitors
            .lock()
            .get(id)
            .map(|e| e.cancel_tx.try_send(()).is_ok())
            .unwrap_or(false)
    }

    /// Remove a monitor. Taking the entry out of the map is the exactly-once
    /// latch: only one caller observes `true`, and dropping the entry closes
    /// the cancellation channel. Idempotent from the caller's perspective.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.monitors.lock().remove(id).is_some();
        if removed {
            debug!(monitor_id = %id, "monitor removed from registry");
        }
        removed
    }

    /// Cancel and remove every monitor of `user_id`; returns the records
    /// that were still live.
    pub fn cancel_all(&self, user_id: &str) -> Vec<AutoOrder> {
        let records = self.list(user_id);
        for record in &records {
            self.signal_cancel(&record.id);
            self.remove(&record.id);
        }
        records
    }

    /// Session teardown: signal and drop every monitor regardless of user.
    pub fn shutdown(&self) {
        let entries: Vec<MonitorEntry> = {
            let mut map = self.monitors.lock();
            map.drain().map(|(_, e)| e).collect()
        };
        for entry in &entries {
            let _ = entry.cancel_tx.try_send(());
        }
        debug!(count = entries.len(), "registry shut down");
    }

    pub fn len(&self) -> usize {
        self.monitors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.lock().is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Interval, OrderAction, Product};

    fn draft(user_id: &str) -> MonitorDraft {
        MonitorDraft {
            user_id: user_id.into(),
            symbol: "TCS".into(),
            exchange: "NSE".into(),
            product: Product::Nrml,
            action: OrderAction::Buy,
            quantity: 10,
            interval: Interval::M5,
            predicate: "RSI14 < 30".into(),
            expires_at: Utc::now() + chrono::Duration::hours(2),
        }
    }

    #[test]
    fn register_then_get() {
        let registry = AutoOrderRegistry::new();
        let (record, _rx) = registry.register(draft("u1"));
        assert_eq!(record.status, MonitorStatus::Running);
        let fetched = registry.get(&record.id).unwrap();
        assert_eq!(fetched.id, record.id);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn ids_are_unique() {
        let registry = AutoOrderRegistry::new();
        let (a, _ra) = registry.register(draft("u1"));
        let (b, _rb) = registry.register(draft("u1"));
        assert_ne!(a.id, b.id);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn add_remove_get_yields_none() {
        let registry = AutoOrderRegistry::new();
        let (record, _rx) = registry.register(draft("u1"));
        assert!(registry.remove(&record.id));
        assert!(registry.get(&record.id).is_none());
    }

    #[test]
    fn second_remove_is_a_noop() {
        let registry = AutoOrderRegistry::new();
        let (record, _rx) = registry.register(draft("u1"));
        assert!(registry.remove(&record.id));
        assert!(!registry.remove(&record.id));
    }

    #[test]
    fn list_is_scoped_to_user() {
        let registry = AutoOrderRegistry::new();
        let (_a, _ra) = registry.register(draft("u1"));
        let (_b, _rb) = registry.register(draft("u2"));
        assert_eq!(registry.list("u1").len(), 1);
        assert_eq!(registry.list("u2").len(), 1);
        assert!(registry.list("u3").is_empty());
    }

    #[tokio::test]
    async fn repeated_cancel_signals_are_absorbed() {
        let registry = AutoOrderRegistry::new();
        let (record, mut rx) = registry.register(draft("u1"));

        assert!(registry.signal_cancel(&record.id));
        // Channel capacity is one: further signals are absorbed.
        assert!(!registry.signal_cancel(&record.id));
        assert!(!registry.signal_cancel(&record.id));

        // The worker observes exactly one cancellation.
        assert_eq!(rx.recv().await, Some(()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn remove_closes_the_cancel_channel() {
        let registry = AutoOrderRegistry::new();
        let (record, mut rx) = registry.register(draft("u1"));
        assert!(registry.remove(&record.id));
        // Sender dropped with the entry: the worker sees a closed channel.
        assert_eq!(rx.recv().await, None);
        // And no further signal is possible.
        assert!(!registry.signal_cancel(&record.id));
    }

    #[tokio::test]
    async fn buffered_cancel_survives_removal() {
        let registry = AutoOrderRegistry::new();
        let (record, mut rx) = registry.register(draft("u1"));
        assert!(registry.signal_cancel(&record.id));
        assert!(registry.remove(&record.id));
        // The buffered signal is still delivered, then the channel closes.
        assert_eq!(rx.recv().await, Some(()));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn cancel_all_clears_only_that_user() {
        let registry = AutoOrderRegistry::new();
        let (_a, mut ra) = registry.register(draft("u1"));
        let (_b, mut rb) = registry.register(draft("u1"));
        let (c, _rc) = registry.register(draft("u2"));

        let cancelled = registry.cancel_all("u1");
        assert_eq!(cancelled.len(), 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&c.id));

        assert_eq!(ra.recv().await, Some(()));
        assert_eq!(rb.recv().await, Some(()));
    }

    #[tokio::test]
    async fn shutdown_signals_every_monitor() {
        let registry = AutoOrderRegistry::new();
        let (_a, mut ra) = registry.register(draft("u1"));
        let (_b, mut rb) = registry.register(draft("u2"));
        registry.shutdown();
        assert!(registry.is_empty());
        assert_eq!(ra.recv().await, Some(()));
        assert_eq!(rb.recv().await, Some(()));
    }
}
