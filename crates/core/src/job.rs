// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record and state machine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a transcription job.
    pub struct JobId("job-");
}

crate::define_id! {
    /// Identifier for a processing lease issued by `claim`.
    ///
    /// A worker must present the matching lease id for every heartbeat,
    /// progress report, completion, and failure. A stale lease is rejected.
    pub struct LeaseId("lse-");
}

/// Scheduling priority. Smaller rank schedules earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent,
    High,
    Normal,
    Low,
}

const MB: u64 = 1024 * 1024;

impl Priority {
    /// Classify a file by size: small files jump the queue.
    ///
    /// <10 MB urgent, 10–50 MB high, 50–100 MB normal, >100 MB low.
    pub fn for_size_bytes(bytes: u64) -> Self {
        if bytes < 10 * MB {
            Priority::Urgent
        } else if bytes <= 50 * MB {
            Priority::High
        } else if bytes <= 100 * MB {
            Priority::Normal
        } else {
            Priority::Low
        }
    }

    pub fn rank(self) -> u8 {
        match self {
            Priority::Urgent => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "urgent" => Some(Priority::Urgent),
            "high" => Some(Priority::High),
            "normal" => Some(Priority::Normal),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

crate::simple_display! {
    Priority {
        Urgent => "urgent",
        High => "high",
        Normal => "normal",
        Low => "low",
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting to be claimed
    Pending,
    /// Leased to a worker
    Processing,
    /// Transcript produced and moved into place
    Completed,
    /// Terminally failed
    Failed,
    /// Cancelled via explicit API
    Cancelled,
}

impl JobStatus {
    /// Terminal states never re-enter the claim pool on their own.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }
}

crate::simple_display! {
    JobStatus {
        Pending => "pending",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

/// Derived per-read health signal. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Stalled,
    Recovered,
    Unknown,
}

crate::simple_display! {
    HealthStatus {
        Healthy => "healthy",
        Stalled => "stalled",
        Recovered => "recovered",
        Unknown => "unknown",
    }
}

/// Engine selection and free-form context attached to a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMetadata {
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default)]
    pub context: HashMap<String, String>,
}

/// Active lease on a processing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseState {
    pub lease_id: LeaseId,
    pub expires_at_ms: u64,
}

/// A transcription job.
///
/// The durable record behind every queue operation. All timestamps are epoch
/// milliseconds; `None` means the phase has not happened yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    /// Absolute path of the source audio inside the watch tree.
    pub file_path: PathBuf,
    /// Subpath relative to the watch root, preserved across moves.
    pub relative_path: PathBuf,
    pub file_name: String,
    pub original_file_name: String,
    pub sanitized_file_name: String,
    pub file_size_bytes: u64,
    pub mime_type: String,
    pub audio_format: String,
    pub priority: Priority,
    pub status: JobStatus,
    /// 0..=100, monotonic within a single processing attempt.
    pub progress: u8,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_progress_at_ms: Option<u64>,
    /// Consecutive stall-sweep hits while processing.
    #[serde(default)]
    pub stall_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease: Option<LeaseState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<crate::error::ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<PathBuf>,
    /// sha256 over `path:size:mtime_nanos` (or path alone when stat failed).
    pub fingerprint: String,
    #[serde(default)]
    pub metadata: JobMetadata,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Pending or Processing — counts against the one-job-per-path invariant.
    pub fn is_active(&self) -> bool {
        matches!(self.status, JobStatus::Pending | JobStatus::Processing)
    }

    /// Compute the derived health signal for a read.
    ///
    /// Stalled: processing with no progress signal for longer than the stall
    /// interval. Recovered: made it past at least one failed attempt. Unknown:
    /// terminal with no recorded history. Healthy otherwise.
    pub fn health(&self, now_ms: u64, stalled_interval_ms: u64) -> HealthStatus {
        if self.status == JobStatus::Processing {
            let last = self.last_progress_at_ms.or(self.started_at_ms).unwrap_or(self.created_at_ms);
            if now_ms.saturating_sub(last) > stalled_interval_ms {
                return HealthStatus::Stalled;
            }
        }
        if self.attempts > 0
            && matches!(self.status, JobStatus::Processing | JobStatus::Completed)
        {
            return HealthStatus::Recovered;
        }
        if self.is_terminal() && self.started_at_ms.is_none() {
            return HealthStatus::Unknown;
        }
        HealthStatus::Healthy
    }

    // ── Guarded transitions ──────────────────────────────────────────────
    //
    // Called from the storage apply layer. Each is idempotent: re-applying
    // the same event must not change the outcome (events can be applied once
    // for immediate visibility and again during WAL replay).

    /// Pending → Processing under a fresh lease.
    pub fn apply_claim(&mut self, lease_id: LeaseId, expires_at_ms: u64, at_ms: u64) {
        if self.status != JobStatus::Pending {
            return;
        }
        self.status = JobStatus::Processing;
        self.started_at_ms = Some(at_ms);
        self.last_progress_at_ms = Some(at_ms);
        self.lease = Some(LeaseState { lease_id, expires_at_ms });
    }

    /// Extend the active lease; stale lease ids are ignored.
    pub fn apply_lease_renewal(&mut self, lease_id: LeaseId, expires_at_ms: u64, at_ms: u64) {
        match &mut self.lease {
            Some(lease) if lease.lease_id == lease_id && self.status == JobStatus::Processing => {
                lease.expires_at_ms = expires_at_ms;
                self.last_progress_at_ms = Some(at_ms);
            }
            _ => {}
        }
    }

    /// Monotonic progress update within the current attempt.
    pub fn apply_progress(&mut self, percent: u8, at_ms: u64) {
        if self.status != JobStatus::Processing {
            return;
        }
        self.progress = self.progress.max(percent.min(100));
        self.last_progress_at_ms = Some(at_ms);
    }

    /// Processing → Completed.
    pub fn apply_completion(&mut self, transcript_path: PathBuf, at_ms: u64) {
        if self.status != JobStatus::Processing {
            return;
        }
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.transcript_path = Some(transcript_path);
        self.finished_at_ms = Some(at_ms);
        self.duration_ms = self.started_at_ms.map(|s| at_ms.saturating_sub(s));
        self.lease = None;
        self.error_code = None;
        self.error_reason = None;
    }

    /// Back to Pending for another attempt. `attempts` carries the absolute
    /// new value so replay cannot double-increment.
    pub fn apply_requeue(&mut self, attempts: u32) {
        if self.status != JobStatus::Processing {
            return;
        }
        self.status = JobStatus::Pending;
        self.attempts = attempts;
        self.progress = 0;
        self.lease = None;
        self.started_at_ms = None;
        self.last_progress_at_ms = None;
        self.error_code = None;
        self.error_reason = None;
    }

    /// Terminal failure with taxonomy code and human reason.
    pub fn apply_failure(
        &mut self,
        code: crate::error::ErrorCode,
        reason: String,
        at_ms: u64,
    ) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Failed;
        self.error_code = Some(code);
        self.error_reason = Some(reason);
        self.finished_at_ms = Some(at_ms);
        self.duration_ms = self.started_at_ms.map(|s| at_ms.saturating_sub(s));
        self.lease = None;
    }

    /// Record a stall sweep hit. Absolute value for replay idempotency.
    pub fn apply_stall(&mut self, stall_count: u32, at_ms: u64) {
        if self.status != JobStatus::Processing {
            return;
        }
        self.stall_count = self.stall_count.max(stall_count);
        let _ = at_ms;
    }

    /// Failed (or cancelled) → Pending with a clean slate (explicit retry API).
    pub fn apply_retry(&mut self) {
        if !matches!(self.status, JobStatus::Failed | JobStatus::Cancelled) {
            return;
        }
        self.status = JobStatus::Pending;
        self.attempts = 0;
        self.stall_count = 0;
        self.progress = 0;
        self.error_code = None;
        self.error_reason = None;
        self.started_at_ms = None;
        self.finished_at_ms = None;
        self.duration_ms = None;
        self.last_progress_at_ms = None;
        self.lease = None;
    }

    /// Operator-initiated reactivation from a non-terminal or Failed state.
    pub fn apply_revive(&mut self) {
        if matches!(self.status, JobStatus::Completed | JobStatus::Cancelled) {
            return;
        }
        self.status = JobStatus::Pending;
        self.progress = 0;
        self.lease = None;
        self.error_code = None;
        self.error_reason = None;
        self.started_at_ms = None;
        self.last_progress_at_ms = None;
    }

    /// Explicit cancellation. Not valid while processing (lease must be
    /// revoked first); guarded here as a backstop.
    pub fn apply_cancel(&mut self, at_ms: u64) {
        if self.status == JobStatus::Processing || self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Cancelled;
        self.finished_at_ms = Some(at_ms);
    }

    /// Patch priority and/or metadata in place. Id never changes.
    pub fn apply_update(&mut self, priority: Option<Priority>, metadata: Option<JobMetadata>) {
        if let Some(p) = priority {
            self.priority = p;
        }
        if let Some(m) = metadata {
            self.metadata = m;
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
