// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test builders shared across crates' test suites.

use crate::job::{Job, JobId, JobMetadata, JobStatus, LeaseId, Priority};
use std::path::PathBuf;

/// Builder for [`Job`] test fixtures.
///
/// Defaults to a 5 MB pending mp3 under `/watch/a/sample.mp3`.
#[derive(Debug, Clone)]
pub struct JobBuilder {
    id: Option<JobId>,
    file_path: PathBuf,
    relative_path: PathBuf,
    file_name: String,
    file_size_bytes: u64,
    priority: Priority,
    status: JobStatus,
    attempts: u32,
    max_attempts: u32,
    created_at_ms: u64,
    fingerprint: Option<String>,
    metadata: JobMetadata,
}

impl JobBuilder {
    pub fn new() -> Self {
        Self {
            id: None,
            file_path: PathBuf::from("/watch/a/sample.mp3"),
            relative_path: PathBuf::from("a"),
            file_name: "sample.mp3".to_string(),
            file_size_bytes: 5 * 1024 * 1024,
            priority: Priority::Urgent,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: 3,
            created_at_ms: 1_000,
            fingerprint: None,
            metadata: JobMetadata::default(),
        }
    }

    pub fn id(mut self, id: impl Into<JobId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn file_path(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.relative_path = path
            .parent()
            .and_then(|p| p.file_name())
            .map(PathBuf::from)
            .unwrap_or_default();
        self.file_path = path;
        self
    }

    pub fn relative_path(mut self, rel: impl Into<PathBuf>) -> Self {
        self.relative_path = rel.into();
        self
    }

    pub fn size_bytes(mut self, bytes: u64) -> Self {
        self.file_size_bytes = bytes;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn processing(mut self) -> Self {
        self.status = JobStatus::Processing;
        self
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    pub fn created_at_ms(mut self, ms: u64) -> Self {
        self.created_at_ms = ms;
        self
    }

    pub fn fingerprint(mut self, fp: impl Into<String>) -> Self {
        self.fingerprint = Some(fp.into());
        self
    }

    pub fn metadata(mut self, metadata: JobMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn build(self) -> Job {
        let file_name = self.file_name.clone();
        let lease = if self.status == JobStatus::Processing {
            Some(crate::job::LeaseState { lease_id: LeaseId::new(), expires_at_ms: u64::MAX })
        } else {
            None
        };
        Job {
            id: self.id.unwrap_or_default(),
            file_path: self.file_path,
            relative_path: self.relative_path,
            file_name: file_name.clone(),
            original_file_name: file_name.clone(),
            sanitized_file_name: file_name.clone(),
            file_size_bytes: self.file_size_bytes,
            mime_type: "audio/mpeg".to_string(),
            audio_format: "mp3".to_string(),
            priority: self.priority,
            status: self.status,
            progress: 0,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            created_at_ms: self.created_at_ms,
            started_at_ms: (self.status == JobStatus::Processing).then_some(self.created_at_ms),
            finished_at_ms: None,
            duration_ms: None,
            last_progress_at_ms: None,
            stall_count: 0,
            lease,
            error_code: None,
            error_reason: None,
            transcript_path: None,
            fingerprint: self.fingerprint.unwrap_or_else(|| format!("fp-{file_name}")),
            metadata: self.metadata,
        }
    }
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ── Event fixtures ───────────────────────────────────────────────────────────

use crate::error::ErrorCode;
use crate::event::{Event, RequeueReason};

pub fn enqueued_event(id: &str) -> Event {
    Event::JobEnqueued { job: Box::new(JobBuilder::new().id(id).build()) }
}

pub fn enqueued_event_for(job: Job) -> Event {
    Event::JobEnqueued { job: Box::new(job) }
}

pub fn claimed_event(id: &str, lease: &str, at_ms: u64) -> Event {
    Event::JobClaimed {
        id: JobId::from_string(id),
        lease_id: LeaseId::from_string(lease),
        expires_at_ms: at_ms + 60_000,
        at_ms,
    }
}

pub fn progress_event(id: &str, percent: u8, at_ms: u64) -> Event {
    Event::ProgressReported { id: JobId::from_string(id), percent, at_ms }
}

pub fn completed_event(id: &str, transcript: &str, at_ms: u64) -> Event {
    Event::JobCompleted {
        id: JobId::from_string(id),
        transcript_path: PathBuf::from(transcript),
        at_ms,
    }
}

pub fn requeued_event(id: &str, attempts: u32, reason: RequeueReason, at_ms: u64) -> Event {
    Event::JobRequeued { id: JobId::from_string(id), attempts, reason, at_ms }
}

pub fn failed_event(id: &str, code: ErrorCode, reason: &str, at_ms: u64) -> Event {
    Event::JobFailed {
        id: JobId::from_string(id),
        error_code: code,
        error_reason: reason.to_string(),
        at_ms,
    }
}

pub fn marked_event(path: &str, fingerprint: &str, job_id: &str, at_ms: u64) -> Event {
    Event::TrackerMarked {
        path: PathBuf::from(path),
        fingerprint: fingerprint.to_string(),
        job_id: JobId::from_string(job_id),
        at_ms,
    }
}

pub fn unmarked_event(path: &str, fingerprint: &str) -> Event {
    Event::TrackerUnmarked { path: PathBuf::from(path), fingerprint: fingerprint.to_string() }
}
