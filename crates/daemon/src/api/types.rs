// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire DTOs for the HTTP API. All camelCase; timestamps are RFC3339.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use tp_core::{HealthStatus, Job, JobStatus, Priority};
use tp_storage::StatusCounts;

fn rfc3339(ms: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms as i64).single().unwrap_or_default()
}

/// One job as the API presents it.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobDto {
    pub id: String,
    pub file_path: String,
    pub file_name: String,
    pub original_file_name: String,
    pub sanitized_file_name: String,
    pub file_size_bytes: u64,
    pub mime_type: String,
    pub audio_format: String,
    #[schema(value_type = String, example = "urgent")]
    pub priority: Priority,
    #[schema(value_type = String, example = "pending")]
    pub status: JobStatus,
    pub progress: u8,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[schema(value_type = String, example = "healthy")]
    pub health_status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<String>,
    pub metadata: JobMetadataDto,
}

impl JobDto {
    pub fn from_job(job: &Job, now_ms: u64, stalled_interval_ms: u64) -> Self {
        Self {
            id: job.id.to_string(),
            file_path: job.file_path.display().to_string(),
            file_name: job.file_name.clone(),
            original_file_name: job.original_file_name.clone(),
            sanitized_file_name: job.sanitized_file_name.clone(),
            file_size_bytes: job.file_size_bytes,
            mime_type: job.mime_type.clone(),
            audio_format: job.audio_format.clone(),
            priority: job.priority,
            status: job.status,
            progress: job.progress,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            created_at: rfc3339(job.created_at_ms),
            started_at: job.started_at_ms.map(rfc3339),
            finished_at: job.finished_at_ms.map(rfc3339),
            duration_ms: job.duration_ms,
            health_status: job.health(now_ms, stalled_interval_ms),
            error_code: job.error_code.map(|c| c.as_str().to_string()),
            error_reason: job.error_reason.clone(),
            transcript_path: job.transcript_path.as_ref().map(|p| p.display().to_string()),
            metadata: JobMetadataDto {
                model: job.metadata.model.clone(),
                language: job.metadata.language.clone(),
                task: job.metadata.task.clone(),
                context: job.metadata.context.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobMetadataDto {
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default)]
    pub context: std::collections::HashMap<String, String>,
}

impl From<JobMetadataDto> for tp_core::JobMetadata {
    fn from(dto: JobMetadataDto) -> Self {
        Self { model: dto.model, language: dto.language, task: dto.task, context: dto.context }
    }
}

/// `POST /jobs`
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateJobRequest {
    /// Absolute path inside the watch tree.
    pub file_path: String,
    /// urgent | high | normal | low
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub metadata: Option<JobMetadataDto>,
}

/// `PATCH /jobs/:id`
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateJobRequest {
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub metadata: Option<JobMetadataDto>,
}

/// `GET /jobs` query.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListJobsQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub status: Option<String>,
    /// File-name prefix filter.
    pub name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobListResponse {
    pub data: Vec<JobDto>,
    /// Exact match count for the filter (never the page length).
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatsResponse {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total: usize,
}

impl From<StatusCounts> for QueueStatsResponse {
    fn from(counts: StatusCounts) -> Self {
        Self {
            pending: counts.pending,
            processing: counts.processing,
            completed: counts.completed,
            failed: counts.failed,
            cancelled: counts.cancelled,
            total: counts.total(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CleanFailedResponse {
    pub purged: usize,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_ms: u64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EngineHealth {
    pub available: bool,
    pub description: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DetailedHealthResponse {
    pub status: &'static str,
    pub ready: bool,
    pub version: &'static str,
    pub uptime_ms: u64,
    pub uptime_human: String,
    pub engine: EngineHealth,
    pub queue: QueueStatsResponse,
    /// Outcome of the most recent reconciliation pass, if one has run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reconciliation: Option<crate::lifecycle::ReconciliationReport>,
}

/// Error body for every non-2xx response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}
