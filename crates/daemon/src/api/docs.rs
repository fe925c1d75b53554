// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OpenAPI document, served at `/documentation/json`.
//!
//! The runtime validation in the handlers mirrors this schema: any request
//! the document would reject (bad enum value, limit over 100, unknown body
//! field) is rejected with a 400 at runtime too.

use axum::extract::State;
use axum::Json;
use utoipa::OpenApi;

use super::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Transcription Palantir",
        description = "Batch transcription service: durable job pipeline over a filesystem inbox",
    ),
    paths(
        super::jobs::create_job,
        super::jobs::list_jobs,
        super::jobs::get_job,
        super::jobs::update_job,
        super::jobs::delete_job,
        super::jobs::retry_job,
        super::jobs::revive_job,
        super::system::queue_stats,
        super::system::clean_failed,
        super::system::trigger_reconcile,
        super::system::metrics,
        super::health::health,
        super::health::ready,
        super::health::health_detailed,
    ),
    components(schemas(
        super::types::JobDto,
        super::types::JobMetadataDto,
        super::types::CreateJobRequest,
        super::types::UpdateJobRequest,
        super::types::JobListResponse,
        super::types::QueueStatsResponse,
        super::types::CleanFailedResponse,
        super::types::HealthResponse,
        super::types::EngineHealth,
        super::types::DetailedHealthResponse,
        super::types::ErrorBody,
        crate::lifecycle::ReconciliationReport,
    ))
)]
pub struct ApiDoc;

/// Serve the document as JSON.
pub async fn openapi_json(State(_state): State<AppState>) -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
