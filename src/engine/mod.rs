// =============================================================================
// Conditional Auto-Order Engine
// =============================================================================
//
// The core of Meridian: per-session monitor records (monitor.rs), the
// registry that owns them and their cancellation signals (registry.rs), the
// long-lived worker loop per monitor (worker.rs), and the broker status
// reconciliation task spawned after each placement (poller.rs).

pub mod monitor;
pub mod poller;
pub mod registry;
pub mod worker;
