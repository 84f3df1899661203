//! HTTP API for natural-language ticket queries.
//!
//! Exposes `/query`, `/query/raw` and `/health`. One [`QueryService`] is built
//! at startup and shared by every request.

mod handlers;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::orchestrator::QueryService;

/// Shared application state for HTTP handlers
pub struct AppState {
    pub service: QueryService,
}

/// Build the axum router over an already constructed service.
pub fn router(service: QueryService) -> axum::Router {
    handlers::router(Arc::new(AppState { service }))
}

/// Run the HTTP server on the configured host and port
pub async fn run_server(config: Config) -> Result<()> {
    let service = QueryService::from_config(&config)?;
    let app = router(service);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Ticket query HTTP server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .await
        .context("HTTP server error")?;

    Ok(())
}
