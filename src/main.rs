// =============================================================================
// Meridian Trading Assistant — Main Entry Point
// =============================================================================
//
// Per-user sessions connect over WebSocket and drive the conditional
// auto-order engine with slash-commands. Monitors are in-memory and live
// only as long as their session.
// =============================================================================

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use meridian_bot::api;
use meridian_bot::app_state::AppState;
use meridian_bot::config::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & logging ─────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Meridian Trading Assistant — Starting Up          ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config = EngineConfig::from_env();

    if config.broker_api_key.is_empty() {
        warn!("MERIDIAN_BROKER_API_KEY is not set — broker calls will be rejected upstream");
    }
    if config.session_tokens.is_empty() {
        warn!("MERIDIAN_SESSION_TOKENS is empty — every session will be rejected");
    }
    if config.mail_webhook_url.is_none() {
        warn!("MERIDIAN_MAIL_WEBHOOK is not set — alerts will be logged only");
    }

    // ── 2. Shared state ──────────────────────────────────────────────────
    let state = Arc::new(AppState::new(config));

    // ── 3. Session server ────────────────────────────────────────────────
    let bind_addr = state.config.bind_addr.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "session server listening");

    let app = api::rest::router(state);
    tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("session server failed");
    });

    // ── 4. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received — stopping");
    info!("Meridian shut down complete.");
    Ok(())
}
