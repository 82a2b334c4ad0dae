// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use tracing::warn;

use bondruck_core::ErrorKind;
use bondruck_core::types::{LogicalPrinter, PrintOutcome};

use super::AppState;
use super::models::{HealthResponse, PrintBody, PrintResponse, PrintersResponse};

/// HTTP status for a print outcome.
pub fn status_for(outcome: &PrintOutcome) -> StatusCode {
    match outcome.failure_kind {
        None if outcome.succeeded => StatusCode::OK,
        Some(ErrorKind::BadRequest) => StatusCode::BAD_REQUEST,
        Some(ErrorKind::PrinterNotFound) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn printers(State(state): State<AppState>) -> (StatusCode, Json<PrintersResponse>) {
    match state.orchestrator.list_printers().await {
        Ok(printers) => (
            StatusCode::OK,
            Json(PrintersResponse {
                success: true,
                printers,
                error: None,
            }),
        ),
        Err(err) => {
            warn!(%err, "printer enumeration failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(PrintersResponse {
                    success: false,
                    printers: Vec::new(),
                    error: Some(err.to_string()),
                }),
            )
        }
    }
}

pub async fn print_main(
    State(state): State<AppState>,
    body: Result<Json<PrintBody>, JsonRejection>,
) -> (StatusCode, Json<PrintResponse>) {
    print(state, LogicalPrinter::Main, body).await
}

pub async fn print_kitchen(
    State(state): State<AppState>,
    body: Result<Json<PrintBody>, JsonRejection>,
) -> (StatusCode, Json<PrintResponse>) {
    print(state, LogicalPrinter::Kitchen, body).await
}

async fn print(
    state: AppState,
    printer: LogicalPrinter,
    body: Result<Json<PrintBody>, JsonRejection>,
) -> (StatusCode, Json<PrintResponse>) {
    let request = match body {
        Ok(Json(body)) => body
            .into_request(printer)
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string())),
        Err(rejection) => {
            // Oversized bodies keep their 413; every other rejection is a 400.
            let status = match rejection.status() {
                StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
                _ => StatusCode::BAD_REQUEST,
            };
            Err((status, rejection.body_text()))
        }
    };
    let request = match request {
        Ok(request) => request,
        Err((status, reason)) => {
            warn!(%printer, %reason, "malformed print request");
            let outcome = PrintOutcome::failure(ErrorKind::BadRequest, reason, None, 0);
            return (status, Json(PrintResponse::from(&outcome)));
        }
    };

    // One snapshot per request; later edits never reach this one.
    let config = state.config.snapshot();
    let outcome = state
        .orchestrator
        .handle_print_request(request, &config)
        .await;
    (status_for(&outcome), Json(PrintResponse::from(&outcome)))
}
