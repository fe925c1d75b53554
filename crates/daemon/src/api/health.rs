// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Liveness and readiness endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::env;

use super::types::{DetailedHealthResponse, EngineHealth, HealthResponse};
use super::AppState;

/// Liveness: the process is up.
#[utoipa::path(
    get, path = "/health",
    responses((status = 200, body = HealthResponse)),
    tag = "health"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env::VERSION,
        uptime_ms: state.uptime_ms(),
    })
}

/// Readiness: 503 until boot (including reconciliation) finished.
#[utoipa::path(
    get, path = "/ready",
    responses((status = 200, body = HealthResponse), (status = 503)),
    tag = "health"
)]
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, StatusCode> {
    if !state.is_ready() {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    Ok(Json(HealthResponse {
        status: "ready",
        version: env::VERSION,
        uptime_ms: state.uptime_ms(),
    }))
}

/// Detailed health including engine binary availability.
#[utoipa::path(
    get, path = "/health/detailed",
    responses((status = 200, body = DetailedHealthResponse)),
    tag = "health"
)]
pub async fn health_detailed(State(state): State<AppState>) -> Json<DetailedHealthResponse> {
    let engine_available = state.engine.is_available();
    let uptime_ms = state.uptime_ms();

    // Best-effort: the report file may not exist on a fresh state dir
    let last_reconciliation = std::fs::read(state.ingest.config.report_path())
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok());

    Json(DetailedHealthResponse {
        status: if engine_available { "ok" } else { "degraded" },
        ready: state.is_ready(),
        version: env::VERSION,
        uptime_ms,
        uptime_human: tp_core::format_elapsed_ms(uptime_ms),
        engine: EngineHealth {
            available: engine_available,
            description: state.engine.describe(),
        },
        queue: state.queue().count_by_status().into(),
        last_reconciliation,
    })
}
