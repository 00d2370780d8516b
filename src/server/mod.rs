mod handlers;
mod router;

pub use handlers::AppState;
pub use router::create_router;

use crate::core::sessions::SessionRegistry;
use crate::core::settings::Settings;
use crate::cost::Aggregator;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;

pub async fn run(settings: &Settings) -> Result<()> {
    let state = Arc::new(AppState {
        aggregator: Aggregator::new(settings.aggregator_config()),
        registry: SessionRegistry::in_dir(&settings.sessions_dir),
        daily_budget: settings.daily_budget,
        max_concurrent: settings.sessions.max_concurrent,
    });

    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind usage server on {}", bind_addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(
        addr = %local_addr,
        sessions_dir = ?settings.sessions_dir,
        "Usage server listening"
    );

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Usage server failed")?;

    tracing::info!("Usage server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
