// =============================================================================
// Monitor record — one conditional auto-order
// =============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{Interval, MonitorStatus, OrderAction, Product};

/// A conditional auto-order owned by one session's registry. The record is
/// mutated only by its worker (status) and destroyed by the registry.
#[derive(Debug, Clone, Serialize)]
pub struct AutoOrder {
    /// Opaque id, stable for the session. Issued by the registry.
    pub id: String,
    pub user_id: String,
    pub symbol: String,
    pub exchange: String,
    pub product: Product,
    pub action: OrderAction,
    pub quantity: u32,
    pub interval: Interval,
    pub predicate: String,
    pub status: MonitorStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AutoOrder {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// One-line summary for `/status_orders`.
    pub fn summary(&self) -> String {
        format!(
            "{} — {} {} x {} ({}) @ {} until {}",
            self.id,
            self.action,
            self.quantity,
            self.symbol,
            self.exchange,
            self.interval,
            self.expires_at.format("%Y-%m-%d %H:%M UTC"),
        )
    }
}

/// The fields a dispatcher supplies when arming a monitor; the registry
/// issues `id`, `status` and `created_at`.
#[derive(Debug, Clone)]
pub struct MonitorDraft {
    pub user_id: String,
    pub symbol: String,
    pub exchange: String,
    pub product: Product,
    pub action: OrderAction,
    pub quantity: u32,
    pub interval: Interval,
    pub predicate: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn expiry_check() {
        let d = draft("u1");
        let record = AutoOrder {
            id: "m-1".into(),
            user_id: d.user_id,
            symbol: d.symbol,
            exchange: d.exchange,
            product: d.product,
            action: d.action,
            quantity: d.quantity,
            interval: d.interval,
            predicate: d.predicate,
            status: MonitorStatus::Running,
            created_at: Utc::now(),
            expires_at: d.expires_at,
        };
        assert!(!record.is_expired(Utc::now()));
        assert!(record.is_expired(Utc::now() + chrono::Duration::hours(3)));
    }
}
