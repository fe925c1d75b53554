// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events that drive every durable state transition.
//!
//! Serializes with `{"type": "job:claimed", ...fields}` format. Events carry
//! absolute values (attempts, stall counts, timestamps) rather than deltas so
//! applying an event twice produces the same state as applying it once —
//! events are applied once for immediate visibility and again on WAL replay.

use crate::error::ErrorCode;
use crate::job::{Job, JobId, JobMetadata, LeaseId, Priority};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Why a processing job went back to pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequeueReason {
    /// Worker reported a retryable failure.
    WorkerError,
    /// Lease expired without a completion or failure signal.
    Stalled,
    /// Boot reconciliation demoted a zombie.
    Reconciled,
    /// Concurrency drift correction demoted an excess processing job.
    Demoted,
}

crate::simple_display! {
    RequeueReason {
        WorkerError => "worker_error",
        Stalled => "stalled",
        Reconciled => "reconciled",
        Demoted => "demoted",
    }
}

/// Events that trigger state transitions in the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- job --
    #[serde(rename = "job:enqueued")]
    JobEnqueued { job: Box<Job> },

    #[serde(rename = "job:claimed")]
    JobClaimed {
        id: JobId,
        lease_id: LeaseId,
        expires_at_ms: u64,
        at_ms: u64,
    },

    #[serde(rename = "job:lease-renewed")]
    LeaseRenewed {
        id: JobId,
        lease_id: LeaseId,
        expires_at_ms: u64,
        at_ms: u64,
    },

    #[serde(rename = "job:progress")]
    ProgressReported { id: JobId, percent: u8, at_ms: u64 },

    #[serde(rename = "job:completed")]
    JobCompleted {
        id: JobId,
        transcript_path: PathBuf,
        at_ms: u64,
    },

    /// Processing → Pending. `attempts` is the absolute post-event value.
    #[serde(rename = "job:requeued")]
    JobRequeued {
        id: JobId,
        attempts: u32,
        reason: RequeueReason,
        at_ms: u64,
    },

    #[serde(rename = "job:failed")]
    JobFailed {
        id: JobId,
        error_code: ErrorCode,
        error_reason: String,
        at_ms: u64,
    },

    /// Stall sweep hit. `stall_count` is the absolute post-event value.
    #[serde(rename = "job:stalled")]
    JobStalled { id: JobId, stall_count: u32, at_ms: u64 },

    #[serde(rename = "job:retried")]
    JobRetried { id: JobId, at_ms: u64 },

    #[serde(rename = "job:revived")]
    JobRevived { id: JobId, at_ms: u64 },

    #[serde(rename = "job:cancelled")]
    JobCancelled { id: JobId, at_ms: u64 },

    #[serde(rename = "job:updated")]
    JobUpdated {
        id: JobId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        priority: Option<Priority>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<JobMetadata>,
        at_ms: u64,
    },

    #[serde(rename = "job:deleted")]
    JobDeleted { id: JobId },

    // -- tracker --
    #[serde(rename = "tracker:marked")]
    TrackerMarked {
        path: PathBuf,
        fingerprint: String,
        job_id: JobId,
        at_ms: u64,
    },

    #[serde(rename = "tracker:unmarked")]
    TrackerUnmarked { path: PathBuf, fingerprint: String },
}

impl Event {
    /// Job this event concerns, if any. Used for log correlation.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Event::JobEnqueued { job } => Some(job.id),
            Event::JobClaimed { id, .. }
            | Event::LeaseRenewed { id, .. }
            | Event::ProgressReported { id, .. }
            | Event::JobCompleted { id, .. }
            | Event::JobRequeued { id, .. }
            | Event::JobFailed { id, .. }
            | Event::JobStalled { id, .. }
            | Event::JobRetried { id, .. }
            | Event::JobRevived { id, .. }
            | Event::JobCancelled { id, .. }
            | Event::JobUpdated { id, .. }
            | Event::JobDeleted { id } => Some(*id),
            Event::TrackerMarked { job_id, .. } => Some(*job_id),
            Event::TrackerUnmarked { .. } => None,
        }
    }

    /// Short tag for logging, matching the serde rename.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::JobEnqueued { .. } => "job:enqueued",
            Event::JobClaimed { .. } => "job:claimed",
            Event::LeaseRenewed { .. } => "job:lease-renewed",
            Event::ProgressReported { .. } => "job:progress",
            Event::JobCompleted { .. } => "job:completed",
            Event::JobRequeued { .. } => "job:requeued",
            Event::JobFailed { .. } => "job:failed",
            Event::JobStalled { .. } => "job:stalled",
            Event::JobRetried { .. } => "job:retried",
            Event::JobRevived { .. } => "job:revived",
            Event::JobCancelled { .. } => "job:cancelled",
            Event::JobUpdated { .. } => "job:updated",
            Event::JobDeleted { .. } => "job:deleted",
            Event::TrackerMarked { .. } => "tracker:marked",
            Event::TrackerUnmarked { .. } => "tracker:unmarked",
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
