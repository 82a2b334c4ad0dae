// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Local HTTP API.
//
//   GET  /health          liveness
//   GET  /printers        enumerated devices
//   POST /print           customer receipt (logical printer Main)
//   POST /print/kitchen   kitchen ticket (logical printer Kitchen)

pub mod handlers;
pub mod middleware;
pub mod models;

use std::net::{Ipv4Addr, SocketAddr};

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware as axum_middleware;
use axum::routing::{get, post};
use tracing::info;

use bondruck_print::PrintOrchestrator;

use crate::error::AgentError;
use crate::services::config_store::ConfigStore;

/// Largest accepted request body.
pub const BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Shared state of all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: PrintOrchestrator,
    pub config: ConfigStore,
}

pub fn build_router(state: AppState) -> Router {
    let cors_state = state.clone();

    Router::new()
        .route("/health", get(handlers::health))
        .route("/printers", get(handlers::printers))
        .route("/print", post(handlers::print_main))
        .route("/print/kitchen", post(handlers::print_kitchen))
        .with_state(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn_with_state(
            cors_state,
            middleware::cors,
        ))
}

/// Serve the API on loopback until Ctrl-C.
pub async fn serve(state: AppState, port: u16) -> Result<(), AgentError> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| AgentError::Bind { port, source })?;
    info!(%addr, "print agent listening");

    axum::serve(listener, build_router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AgentError::Serve)?;

    info!("print agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "cannot listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
