// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state from WAL replay

mod jobs;
mod tracker;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tp_core::{Event, Job, JobId, JobStatus};

/// Tracker entry keyed by absolute path. Subject to a TTL checked on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedPath {
    pub job_id: JobId,
    pub fingerprint: String,
    pub processed_at_ms: u64,
}

/// Tracker entry keyed by content fingerprint. Permanent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedFingerprint {
    pub job_id: JobId,
    pub processed_at_ms: u64,
}

/// Exact per-status job counts. Pagination totals use these, never `len()`
/// of a page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed + self.cancelled
    }

    pub fn for_status(&self, status: JobStatus) -> usize {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::Processing => self.processing,
            JobStatus::Completed => self.completed,
            JobStatus::Failed => self.failed,
            JobStatus::Cancelled => self.cancelled,
        }
    }
}

/// Materialized state built from WAL events
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    pub jobs: HashMap<JobId, Job>,
    /// Dedup index: absolute path → processed record (30-day TTL on read).
    #[serde(default)]
    pub processed_paths: HashMap<PathBuf, TrackedPath>,
    /// Dedup index: content fingerprint → processed record (no TTL).
    #[serde(default)]
    pub processed_fingerprints: HashMap<String, TrackedFingerprint>,
}

impl MaterializedState {
    /// Get a job by ID.
    pub fn get_job(&self, id: &str) -> Option<&Job> {
        self.jobs.get(id)
    }

    /// Exact counts per status.
    pub fn count_by_status(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for job in self.jobs.values() {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    pub fn processing_count(&self) -> usize {
        self.jobs.values().filter(|j| j.status == JobStatus::Processing).count()
    }

    /// The non-terminal job owning `path`, if any (invariant 2: at most one).
    pub fn active_job_for_path(&self, path: &Path) -> Option<&Job> {
        self.jobs.values().find(|j| j.is_active() && j.file_path == path)
    }

    /// The pending job that `claim` should take next: highest priority first,
    /// FIFO within a priority band, id as the final tie-break so ordering is
    /// total.
    pub fn next_claimable(&self) -> Option<&Job> {
        self.jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .min_by_key(|j| (j.priority.rank(), j.created_at_ms, j.id))
    }

    /// Apply an event to derive state changes.
    ///
    /// Events are facts about what happened; state is derived from those
    /// facts.
    ///
    /// # Idempotency Requirement
    ///
    /// **All event handlers MUST be idempotent.** Applying the same event
    /// twice must produce the same state as applying it once. Events are
    /// applied once at commit time for immediate visibility and again when
    /// the WAL is replayed after a restart. Guidelines:
    ///
    /// - Use assignment (`=`) instead of mutation (`+=`, `-=`)
    /// - Guard inserts with existence checks
    /// - Guard transitions on the current status
    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::JobEnqueued { .. }
            | Event::JobClaimed { .. }
            | Event::LeaseRenewed { .. }
            | Event::ProgressReported { .. }
            | Event::JobCompleted { .. }
            | Event::JobRequeued { .. }
            | Event::JobFailed { .. }
            | Event::JobStalled { .. }
            | Event::JobRetried { .. }
            | Event::JobRevived { .. }
            | Event::JobCancelled { .. }
            | Event::JobUpdated { .. }
            | Event::JobDeleted { .. } => jobs::apply(self, event),

            Event::TrackerMarked { .. } | Event::TrackerUnmarked { .. } => {
                tracker::apply(self, event)
            }
        }
    }
}

#[cfg(test)]
#[path = "../state_tests/mod.rs"]
mod tests;
