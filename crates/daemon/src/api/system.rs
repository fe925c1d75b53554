// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue statistics, maintenance, and operator-triggered reconciliation.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use crate::lifecycle::{reconcile_paused, ReconciliationReport};

use super::error::ApiError;
use super::types::{CleanFailedResponse, QueueStatsResponse};
use super::AppState;

/// Counts by state.
#[utoipa::path(
    get, path = "/api/v1/queue/stats",
    responses((status = 200, body = QueueStatsResponse)),
    tag = "queue"
)]
pub async fn queue_stats(State(state): State<AppState>) -> Json<QueueStatsResponse> {
    Json(state.queue().count_by_status().into())
}

/// Purge failed job records. Files are untouched.
#[utoipa::path(
    post, path = "/api/v1/queue/clean-failed",
    responses((status = 200, body = CleanFailedResponse)),
    tag = "queue"
)]
pub async fn clean_failed(
    State(state): State<AppState>,
) -> Result<Json<CleanFailedResponse>, ApiError> {
    let purged = state.queue().clean_failed().map_err(ApiError::from)?;
    Ok(Json(CleanFailedResponse { purged }))
}

/// Re-run reconciliation. Claims are paused while the pass runs.
#[utoipa::path(
    post, path = "/api/v1/system/reconcile",
    responses(
        (status = 200, body = ReconciliationReport),
        (status = 503, body = super::types::ErrorBody),
    ),
    tag = "system"
)]
pub async fn trigger_reconcile(
    State(state): State<AppState>,
) -> Result<Json<ReconciliationReport>, ApiError> {
    info!("operator-triggered reconciliation");
    // Blocking fs + queue work; keep it off the reactor threads.
    let ingest = std::sync::Arc::clone(&state.ingest);
    let report = tokio::task::spawn_blocking(move || reconcile_paused(&ingest))
        .await
        .map_err(|e| ApiError::Unavailable(format!("reconciliation task failed: {e}")))?
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;
    Ok(Json(report))
}

/// Prometheus text exposition.
#[utoipa::path(
    get, path = "/metrics",
    responses((status = 200, description = "Prometheus text format", body = String)),
    tag = "system"
)]
pub async fn metrics(State(state): State<AppState>) -> Result<String, StatusCode> {
    match &state.metrics {
        Some(handle) => Ok(handle.render()),
        None => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}
