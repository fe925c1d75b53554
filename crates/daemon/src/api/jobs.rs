// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job CRUD and transition endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use tp_core::{JobStatus, Priority};
use tp_engine::{audio_dest, move_atomic, transcript_dest};
use tp_queue::{ListFilter, Page, MAX_PAGE_LIMIT};

use crate::ingest::IngestOutcome;

use super::error::ApiError;
use super::types::{
    CreateJobRequest, JobDto, JobListResponse, ListJobsQuery, UpdateJobRequest,
};
use super::AppState;

fn parse_priority(s: &str) -> Result<Priority, ApiError> {
    Priority::parse(s)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown priority: {s}")))
}

impl AppState {
    fn dto(&self, job: &tp_core::Job) -> JobDto {
        JobDto::from_job(
            job,
            self.now_ms(),
            self.ingest.config.queue.stalled_interval_ms,
        )
    }
}

/// Create a job for a file already on disk inside the watch tree.
#[utoipa::path(
    post, path = "/api/v1/jobs",
    request_body = CreateJobRequest,
    responses(
        (status = 201, body = JobDto),
        (status = 400, body = super::types::ErrorBody),
        (status = 409, body = super::types::ErrorBody),
    ),
    tag = "jobs"
)]
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<JobDto>), ApiError> {
    let path = std::path::PathBuf::from(&request.file_path);
    if !path.is_absolute() {
        return Err(ApiError::BadRequest("filePath must be absolute".into()));
    }
    if !path.starts_with(&state.ingest.config.dirs.watch) {
        return Err(ApiError::BadRequest("filePath must be inside the watch directory".into()));
    }
    if !path.is_file() {
        return Err(ApiError::BadRequest(format!(
            "file missing or inaccessible: {}",
            path.display()
        )));
    }
    let priority = request.priority.as_deref().map(parse_priority).transpose()?;

    let id = match state.ingest.ingest_file(&path).map_err(ApiError::from)? {
        IngestOutcome::Enqueued { id, .. } => id,
        IngestOutcome::SkippedDuplicate => {
            return Err(ApiError::Conflict("file was already ingested".into()))
        }
        IngestOutcome::SkippedInvalid => {
            return Err(ApiError::BadRequest("file failed validation".into()))
        }
    };

    // Apply explicit overrides on top of the pipeline defaults
    if priority.is_some() || request.metadata.is_some() {
        state
            .queue()
            .update(&id, priority, request.metadata.map(Into::into))
            .map_err(ApiError::from)?;
    }

    let job = state.queue().get(&id).ok_or(ApiError::NotFound)?;
    Ok((StatusCode::CREATED, Json(state.dto(&job))))
}

/// List jobs with status/name filtering and exact totals.
#[utoipa::path(
    get, path = "/api/v1/jobs",
    params(
        ("page" = Option<usize>, Query, description = "1-based page number"),
        ("limit" = Option<usize>, Query, description = "page size, at most 100"),
        ("status" = Option<String>, Query, description = "pending|processing|completed|failed|cancelled"),
        ("name" = Option<String>, Query, description = "file-name prefix filter"),
    ),
    responses((status = 200, body = JobListResponse), (status = 400, body = super::types::ErrorBody)),
    tag = "jobs"
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<JobListResponse>, ApiError> {
    let limit = query.limit.unwrap_or(20);
    if limit == 0 || limit > MAX_PAGE_LIMIT {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {MAX_PAGE_LIMIT}"
        )));
    }
    let status = query
        .status
        .as_deref()
        .map(|s| {
            JobStatus::parse(s)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown status: {s}")))
        })
        .transpose()?;

    let filter = ListFilter { status, name_prefix: query.name };
    let page = state
        .queue()
        .list(&filter, Page { page: query.page.unwrap_or(1), limit });

    Ok(Json(JobListResponse {
        data: page.jobs.iter().map(|j| state.dto(j)).collect(),
        total: page.total,
        page: page.page,
        limit: page.limit,
    }))
}

/// Fetch one job, with its computed health status.
#[utoipa::path(
    get, path = "/api/v1/jobs/{id}",
    params(("id" = String, Path, description = "job id")),
    responses((status = 200, body = JobDto), (status = 404, body = super::types::ErrorBody)),
    tag = "jobs"
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobDto>, ApiError> {
    let job = state.queue().get(&id).ok_or(ApiError::NotFound)?;
    Ok(Json(state.dto(&job)))
}

/// Patch priority and/or metadata. 409 for priority changes on terminal jobs.
#[utoipa::path(
    patch, path = "/api/v1/jobs/{id}",
    params(("id" = String, Path, description = "job id")),
    request_body = UpdateJobRequest,
    responses(
        (status = 200, body = JobDto),
        (status = 404, body = super::types::ErrorBody),
        (status = 409, body = super::types::ErrorBody),
    ),
    tag = "jobs"
)]
pub async fn update_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateJobRequest>,
) -> Result<Json<JobDto>, ApiError> {
    let priority = request.priority.as_deref().map(parse_priority).transpose()?;
    let job = state
        .queue()
        .update(&id, priority, request.metadata.map(Into::into))
        .map_err(ApiError::from)?;
    Ok(Json(state.dto(&job)))
}

/// Delete a non-processing job and its on-disk artifacts.
#[utoipa::path(
    delete, path = "/api/v1/jobs/{id}",
    params(("id" = String, Path, description = "job id")),
    responses(
        (status = 204),
        (status = 404, body = super::types::ErrorBody),
        (status = 409, body = super::types::ErrorBody),
    ),
    tag = "jobs"
)]
pub async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let job = state.queue().remove(&id).map_err(ApiError::from)?;

    // Artifacts: the source wherever it currently lives, the transcript,
    // and any scratch output.
    let dirs = &state.ingest.config.dirs;
    let mut artifacts = vec![
        job.file_path.clone(),
        audio_dest(&dirs.completed, &job.relative_path, &job.file_name),
        audio_dest(&dirs.failed, &job.relative_path, &job.file_name),
        transcript_dest(&dirs.completed, &job.relative_path, &job.file_name),
    ];
    if let Some(transcript) = &job.transcript_path {
        artifacts.push(transcript.clone());
    }
    for path in artifacts {
        if path.is_file() {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "artifact delete failed");
            }
        }
    }
    if let Err(e) = state.tracker().unmark(&job.file_path) {
        tracing::warn!(job_id = %job.id, error = %e, "tracker unmark failed");
    }

    info!(job_id = %job.id, "job deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Reset a failed job to pending. Idempotent; 400 for completed jobs.
#[utoipa::path(
    post, path = "/api/v1/jobs/{id}/retry",
    params(("id" = String, Path, description = "job id")),
    responses(
        (status = 200, body = JobDto),
        (status = 400, body = super::types::ErrorBody),
        (status = 404, body = super::types::ErrorBody),
    ),
    tag = "jobs"
)]
pub async fn retry_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobDto>, ApiError> {
    let job = state.queue().get(&id).ok_or(ApiError::NotFound)?;

    // A terminally failed job's source was moved out of the inbox; restore
    // it so the next attempt can find it.
    if job.status == JobStatus::Failed && !job.file_path.is_file() {
        let dirs = &state.ingest.config.dirs;
        let parked = audio_dest(&dirs.failed, &job.relative_path, &job.file_name);
        if parked.is_file() {
            move_atomic(&parked, &job.file_path).map_err(|e| {
                ApiError::Unavailable(format!("cannot restore source file: {e}"))
            })?;
        }
    }

    state.queue().retry(&id).map_err(ApiError::from)?;

    let job = state.queue().get(&id).ok_or(ApiError::NotFound)?;
    info!(job_id = %job.id, "job retried");
    Ok(Json(state.dto(&job)))
}

/// Operator-initiated reactivation: force a non-terminal or failed job back
/// into the claim pool.
#[utoipa::path(
    post, path = "/api/v1/jobs/{id}/revive",
    params(("id" = String, Path, description = "job id")),
    responses(
        (status = 200, body = JobDto),
        (status = 404, body = super::types::ErrorBody),
        (status = 409, body = super::types::ErrorBody),
    ),
    tag = "jobs"
)]
pub async fn revive_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobDto>, ApiError> {
    state.queue().revive(&id).map_err(ApiError::from)?;
    let job = state.queue().get(&id).ok_or(ApiError::NotFound)?;
    info!(job_id = %job.id, "job revived");
    Ok(Json(state.dto(&job)))
}
