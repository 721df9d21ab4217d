//! HTTP and WebSocket transport over the orchestrator.
//!
//! Runs are started in the background and observed through `/ws/logs`,
//! where every connection is a broadcast hub subscriber for its lifetime.

pub mod api;
pub mod ws;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{http::HeaderValue, routing::get, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info};

use crate::config::ServerSettings;
use crate::core::Orchestrator;

pub use api::{ApiError, AppState, SharedState};
pub use ws::WsSubscriber;

/// Build the application router with API and WebSocket routes
pub fn build_router(state: SharedState) -> Router {
    api::api_router()
        .route("/ws/logs", get(ws::ws_handler))
        .with_state(state)
}

/// CORS layer allowing the configured browser origins
fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("Invalid CORS origin: {}", origin))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any))
}

/// Serve until Ctrl+C
pub async fn start_server(settings: &ServerSettings, orchestrator: Arc<Orchestrator>) -> Result<()> {
    let state = Arc::new(AppState { orchestrator });
    let app = build_router(state).layer(cors_layer(&settings.cors_origins)?);

    let listener = tokio::net::TcpListener::bind(&settings.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", settings.bind))?;

    let local_addr = listener.local_addr()?;
    info!("qaflow server listening on http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}
