// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The durable job queue.
//!
//! All mutations flow through one commit path: validate under the state lock,
//! append the event(s) to the WAL, flush, apply to materialized state, then
//! broadcast. Nothing becomes visible before it is durable.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

use tp_core::{
    Clock, ErrorCode, Event, Job, JobId, JobMetadata, JobStatus, LeaseId, Priority,
    RequeueReason, SystemClock,
};
use tp_storage::{MaterializedState, StatusCounts, Wal, WalError};

use crate::events::QueueEvent;
use crate::tracker::FileTracker;

/// Hard cap on page sizes served by `list`.
pub const MAX_PAGE_LIMIT: usize = 100;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Queue errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {0} already exists")]
    DuplicateJob(JobId),

    #[error("an active job already exists for {}", .0.display())]
    DuplicatePath(PathBuf),

    #[error("lease for job {0} is expired or superseded")]
    LeaseExpired(JobId),

    #[error("job {0} is processing; revoke its lease first")]
    JobActive(JobId),

    #[error("job {0} is completed; delete it before re-running")]
    JobCompleted(JobId),

    #[error("job {0} is in a terminal state")]
    Terminal(JobId),

    #[error("cannot change priority of terminal job {0}")]
    TerminalPriority(JobId),

    #[error("store unavailable: {0}")]
    Store(#[from] WalError),
}

/// Queue tuning, all overridable from the environment at boot.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Upper bound on concurrently leased jobs.
    pub concurrency_limit: usize,
    /// Lease duration granted by `claim` and extended by `heartbeat`.
    pub lock_duration_ms: u64,
    /// Default `max_attempts` stamped onto new jobs.
    pub max_attempts: u32,
    /// Stall sweeper period; also the health-read staleness threshold.
    pub stalled_interval_ms: u64,
    /// Stall hits tolerated before the job is terminally failed.
    pub max_stalled_count: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 3,
            lock_duration_ms: 60_000,
            max_attempts: 3,
            stalled_interval_ms: 30_000,
            max_stalled_count: 2,
        }
    }
}

/// Time-bounded right to process one job.
///
/// Returned by [`JobQueue::claim`]; required by every subsequent report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    pub job_id: JobId,
    pub lease_id: LeaseId,
    pub expires_at_ms: u64,
}

/// Input for creating a job. The watcher and the API both build one of these.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub file_path: PathBuf,
    pub relative_path: PathBuf,
    pub file_name: String,
    pub original_file_name: String,
    pub file_size_bytes: u64,
    pub mime_type: String,
    pub audio_format: String,
    pub priority: Priority,
    pub fingerprint: String,
    pub metadata: JobMetadata,
}

/// List filter: by status and/or file-name prefix.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<JobStatus>,
    pub name_prefix: Option<String>,
}

impl ListFilter {
    fn matches(&self, job: &Job) -> bool {
        if let Some(status) = self.status {
            if job.status != status {
                return false;
            }
        }
        if let Some(prefix) = &self.name_prefix {
            if !job.file_name.starts_with(prefix.as_str()) {
                return false;
            }
        }
        true
    }
}

/// 1-based pagination request.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

/// One page of jobs plus the exact total for the filter.
#[derive(Debug, Clone)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    /// Exact match count for the filter — never `jobs.len()` extrapolated.
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

struct Inner<C: Clock> {
    state: Mutex<MaterializedState>,
    wal: Mutex<Wal>,
    clock: C,
    config: QueueConfig,
    events: broadcast::Sender<QueueEvent>,
    /// Set while a runtime reconciliation wants the claim pool drained.
    claims_paused: AtomicBool,
}

/// Handle to the durable queue. Cheap to clone.
pub struct JobQueue<C: Clock = SystemClock> {
    inner: Arc<Inner<C>>,
}

impl<C: Clock> Clone for JobQueue<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<C: Clock> JobQueue<C> {
    /// Build a queue over recovered state and its WAL.
    pub fn new(state: MaterializedState, wal: Wal, clock: C, config: QueueConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                wal: Mutex::new(wal),
                clock,
                config,
                events,
                claims_paused: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    pub fn clock(&self) -> &C {
        &self.inner.clock
    }

    /// Tracker view over the same store (C1).
    pub fn tracker(&self) -> FileTracker<C> {
        FileTracker::new(self.clone())
    }

    /// Subscribe to committed transition events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// Stop or resume handing out leases (used while reconciliation runs).
    pub fn pause_claims(&self, paused: bool) {
        self.inner.claims_paused.store(paused, Ordering::SeqCst);
    }

    pub fn claims_paused(&self) -> bool {
        self.inner.claims_paused.load(Ordering::SeqCst)
    }

    // ── Commit path ──────────────────────────────────────────────────────

    /// Append events to the WAL (durable), then apply and broadcast.
    ///
    /// Caller holds the state lock. On a WAL error nothing is applied — the
    /// mutation simply never happened, which is the fail-closed posture the
    /// enqueue/claim contract needs.
    fn commit(
        &self,
        state: &mut MaterializedState,
        events: Vec<Event>,
        notify: Vec<QueueEvent>,
    ) -> Result<(), QueueError> {
        {
            let mut wal = self.inner.wal.lock();
            let mut last_seq = 0;
            for event in &events {
                last_seq = wal.append(event)?;
            }
            wal.flush()?;
            wal.mark_processed(last_seq);
        }
        for event in &events {
            state.apply_event(event);
        }
        for event in notify {
            // Send errors just mean nobody is listening
            let _ = self.inner.events.send(event);
        }
        Ok(())
    }

    // ── Operations (C2 contract) ─────────────────────────────────────────

    /// Create a job. Idempotent on id; rejects a second active job for the
    /// same path (invariant 2).
    pub fn enqueue(&self, new: NewJob) -> Result<JobId, QueueError> {
        let mut state = self.inner.state.lock();

        if let Some(existing) = state.active_job_for_path(&new.file_path) {
            return Err(QueueError::DuplicatePath(existing.file_path.clone()));
        }

        let now = self.inner.clock.epoch_ms();
        let id = JobId::new();
        if state.jobs.contains_key(&id) {
            return Err(QueueError::DuplicateJob(id));
        }

        let job = Job {
            id,
            file_path: new.file_path,
            relative_path: new.relative_path,
            file_name: new.file_name.clone(),
            original_file_name: new.original_file_name,
            sanitized_file_name: new.file_name,
            file_size_bytes: new.file_size_bytes,
            mime_type: new.mime_type,
            audio_format: new.audio_format,
            priority: new.priority,
            status: JobStatus::Pending,
            progress: 0,
            attempts: 0,
            max_attempts: self.inner.config.max_attempts,
            created_at_ms: now,
            started_at_ms: None,
            finished_at_ms: None,
            duration_ms: None,
            last_progress_at_ms: None,
            stall_count: 0,
            lease: None,
            error_code: None,
            error_reason: None,
            transcript_path: None,
            fingerprint: new.fingerprint,
            metadata: new.metadata,
        };

        debug!(job_id = %id, file = %job.file_path.display(), priority = %job.priority, "enqueue");
        self.commit(&mut state, vec![Event::JobEnqueued { job: Box::new(job) }], vec![])?;
        Ok(id)
    }

    /// Atomically lease the next pending job, if capacity allows.
    ///
    /// This is the sole admission point into `processing`; the concurrency
    /// invariant is enforced here under the state lock.
    pub fn claim(&self) -> Result<Option<(Job, Lease)>, QueueError> {
        if self.claims_paused() {
            return Ok(None);
        }
        let mut state = self.inner.state.lock();

        if state.processing_count() >= self.inner.config.concurrency_limit {
            return Ok(None);
        }
        let Some(job) = state.next_claimable() else {
            return Ok(None);
        };

        let id = job.id;
        let now = self.inner.clock.epoch_ms();
        let lease = Lease {
            job_id: id,
            lease_id: LeaseId::new(),
            expires_at_ms: now + self.inner.config.lock_duration_ms,
        };

        self.commit(
            &mut state,
            vec![Event::JobClaimed {
                id,
                lease_id: lease.lease_id,
                expires_at_ms: lease.expires_at_ms,
                at_ms: now,
            }],
            vec![QueueEvent::Active { id }],
        )?;

        let job = state.jobs.get(&id).cloned().ok_or(QueueError::NotFound(id))?;
        info!(job_id = %id, file = %job.file_name, attempt = job.attempts + 1, "job claimed");
        Ok(Some((job, lease)))
    }

    /// Validate that `lease` still owns its job. Caller holds the lock.
    fn check_lease(
        &self,
        state: &MaterializedState,
        lease: &Lease,
        now: u64,
    ) -> Result<(), QueueError> {
        let job = state.jobs.get(&lease.job_id).ok_or(QueueError::NotFound(lease.job_id))?;
        let held = job
            .lease
            .as_ref()
            .filter(|l| job.status == JobStatus::Processing && l.lease_id == lease.lease_id);
        match held {
            Some(l) if l.expires_at_ms > now => Ok(()),
            _ => Err(QueueError::LeaseExpired(lease.job_id)),
        }
    }

    /// Extend the lease and refresh the liveness timestamp.
    pub fn heartbeat(&self, lease: &Lease) -> Result<Lease, QueueError> {
        let mut state = self.inner.state.lock();
        let now = self.inner.clock.epoch_ms();
        self.check_lease(&state, lease, now)?;

        let expires_at_ms = now + self.inner.config.lock_duration_ms;
        self.commit(
            &mut state,
            vec![Event::LeaseRenewed {
                id: lease.job_id,
                lease_id: lease.lease_id,
                expires_at_ms,
                at_ms: now,
            }],
            vec![],
        )?;
        Ok(Lease { expires_at_ms, ..*lease })
    }

    /// Monotonic progress update for the current attempt.
    pub fn report_progress(&self, lease: &Lease, percent: u8) -> Result<(), QueueError> {
        let mut state = self.inner.state.lock();
        let now = self.inner.clock.epoch_ms();
        self.check_lease(&state, lease, now)?;

        self.commit(
            &mut state,
            vec![Event::ProgressReported { id: lease.job_id, percent, at_ms: now }],
            vec![QueueEvent::Progress { id: lease.job_id, percent: percent.min(100) }],
        )
    }

    /// Processing → Completed. Releases the lease.
    pub fn complete(&self, lease: &Lease, transcript_path: PathBuf) -> Result<(), QueueError> {
        let mut state = self.inner.state.lock();
        let now = self.inner.clock.epoch_ms();
        self.check_lease(&state, lease, now)?;

        info!(job_id = %lease.job_id, transcript = %transcript_path.display(), "job completed");
        self.commit(
            &mut state,
            vec![Event::JobCompleted { id: lease.job_id, transcript_path, at_ms: now }],
            vec![QueueEvent::Completed { id: lease.job_id }],
        )
    }

    /// Report a failed attempt. The queue decides retry vs. terminal:
    /// another attempt while `attempts + 1 < max_attempts`, else Failed.
    pub fn fail(
        &self,
        lease: &Lease,
        code: ErrorCode,
        reason: impl Into<String>,
    ) -> Result<JobStatus, QueueError> {
        let mut state = self.inner.state.lock();
        let now = self.inner.clock.epoch_ms();
        self.check_lease(&state, lease, now)?;

        let job = state.jobs.get(&lease.job_id).ok_or(QueueError::NotFound(lease.job_id))?;
        let attempts = job.attempts + 1;
        let reason = reason.into();

        if attempts < job.max_attempts {
            info!(
                job_id = %lease.job_id,
                attempts,
                max_attempts = job.max_attempts,
                error = %reason,
                "attempt failed, requeueing"
            );
            self.commit(
                &mut state,
                vec![Event::JobRequeued {
                    id: lease.job_id,
                    attempts,
                    reason: RequeueReason::WorkerError,
                    at_ms: now,
                }],
                vec![],
            )?;
            Ok(JobStatus::Pending)
        } else {
            info!(job_id = %lease.job_id, attempts, code = %code, error = %reason, "job failed terminally");
            self.commit(
                &mut state,
                vec![Event::JobFailed {
                    id: lease.job_id,
                    error_code: code,
                    error_reason: reason,
                    at_ms: now,
                }],
                vec![QueueEvent::Failed { id: lease.job_id, code }],
            )?;
            Ok(JobStatus::Failed)
        }
    }

    // ── Reads ────────────────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> Option<Job> {
        self.inner.state.lock().get_job(id).cloned()
    }

    /// Filtered, paged listing, newest first. `total` is the exact filter
    /// match count.
    pub fn list(&self, filter: &ListFilter, page: Page) -> JobPage {
        let limit = page.limit.clamp(1, MAX_PAGE_LIMIT);
        let page_no = page.page.max(1);

        let state = self.inner.state.lock();
        let mut matched: Vec<&Job> = state.jobs.values().filter(|j| filter.matches(j)).collect();
        matched.sort_by(|a, b| {
            b.created_at_ms.cmp(&a.created_at_ms).then_with(|| a.id.cmp(&b.id))
        });

        let total = matched.len();
        let jobs = matched
            .into_iter()
            .skip((page_no - 1) * limit)
            .take(limit)
            .cloned()
            .collect();

        JobPage { jobs, total, page: page_no, limit }
    }

    /// Exact per-status counts.
    pub fn count_by_status(&self) -> StatusCounts {
        self.inner.state.lock().count_by_status()
    }

    /// The non-terminal job owning `path`, if any.
    pub fn active_job_for_path(&self, path: &std::path::Path) -> Option<Job> {
        self.inner.state.lock().active_job_for_path(path).cloned()
    }

    /// Clone of the full materialized state (reconciler inventory,
    /// checkpointing).
    pub fn snapshot_state(&self) -> MaterializedState {
        self.inner.state.lock().clone()
    }

    // ── Explicit API transitions ─────────────────────────────────────────

    /// Delete a non-processing job record.
    pub fn remove(&self, id: &str) -> Result<Job, QueueError> {
        let mut state = self.inner.state.lock();
        let job =
            state.get_job(id).cloned().ok_or_else(|| QueueError::NotFound(JobId::from_string(id)))?;
        if job.status == JobStatus::Processing {
            return Err(QueueError::JobActive(job.id));
        }

        self.commit(&mut state, vec![Event::JobDeleted { id: job.id }], vec![])?;
        Ok(job)
    }

    /// Failed → Pending with cleared error state. Idempotent: already
    /// pending/processing is success. Completed jobs must be deleted instead.
    pub fn retry(&self, id: &str) -> Result<(), QueueError> {
        let mut state = self.inner.state.lock();
        let job =
            state.get_job(id).ok_or_else(|| QueueError::NotFound(JobId::from_string(id)))?;

        match job.status {
            JobStatus::Pending | JobStatus::Processing => Ok(()),
            JobStatus::Completed => Err(QueueError::JobCompleted(job.id)),
            JobStatus::Failed | JobStatus::Cancelled => {
                let now = self.inner.clock.epoch_ms();
                let id = job.id;
                self.commit(&mut state, vec![Event::JobRetried { id, at_ms: now }], vec![])
            }
        }
    }

    /// Operator-initiated reactivation: set Pending from any non-terminal or
    /// Failed state.
    pub fn revive(&self, id: &str) -> Result<(), QueueError> {
        let mut state = self.inner.state.lock();
        let job =
            state.get_job(id).ok_or_else(|| QueueError::NotFound(JobId::from_string(id)))?;

        match job.status {
            JobStatus::Completed | JobStatus::Cancelled => Err(QueueError::Terminal(job.id)),
            JobStatus::Pending => Ok(()),
            JobStatus::Processing | JobStatus::Failed => {
                let now = self.inner.clock.epoch_ms();
                let id = job.id;
                self.commit(&mut state, vec![Event::JobRevived { id, at_ms: now }], vec![])
            }
        }
    }

    /// Cancel a pending job. Processing jobs must lose their lease first.
    pub fn cancel(&self, id: &str) -> Result<(), QueueError> {
        let mut state = self.inner.state.lock();
        let job =
            state.get_job(id).ok_or_else(|| QueueError::NotFound(JobId::from_string(id)))?;
        match job.status {
            JobStatus::Processing => Err(QueueError::JobActive(job.id)),
            s if s.is_terminal() => Ok(()),
            _ => {
                let now = self.inner.clock.epoch_ms();
                let id = job.id;
                self.commit(&mut state, vec![Event::JobCancelled { id, at_ms: now }], vec![])
            }
        }
    }

    /// Patch priority and/or metadata. Priority changes on terminal jobs are
    /// rejected; on processing jobs the stored field updates without
    /// preemption. The job id is stable across the update.
    pub fn update(
        &self,
        id: &str,
        priority: Option<Priority>,
        metadata: Option<JobMetadata>,
    ) -> Result<Job, QueueError> {
        let mut state = self.inner.state.lock();
        let job =
            state.get_job(id).ok_or_else(|| QueueError::NotFound(JobId::from_string(id)))?;
        if priority.is_some() && job.is_terminal() {
            return Err(QueueError::TerminalPriority(job.id));
        }

        let id = job.id;
        let now = self.inner.clock.epoch_ms();
        self.commit(
            &mut state,
            vec![Event::JobUpdated { id, priority, metadata, at_ms: now }],
            vec![],
        )?;
        state.jobs.get(&id).cloned().ok_or(QueueError::NotFound(id))
    }

    /// Purge all failed job records (files are untouched).
    pub fn clean_failed(&self) -> Result<usize, QueueError> {
        let mut state = self.inner.state.lock();
        let failed: Vec<JobId> = state
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Failed)
            .map(|j| j.id)
            .collect();
        if failed.is_empty() {
            return Ok(0);
        }

        let events = failed.iter().map(|id| Event::JobDeleted { id: *id }).collect();
        self.commit(&mut state, events, vec![])?;
        info!(count = failed.len(), "cleaned failed job records");
        Ok(failed.len())
    }

    // ── Reconciliation hooks ─────────────────────────────────────────────

    /// Demote a zombie processing job back to pending, attempts unchanged.
    /// Boot-time only: no worker can own the lease yet.
    pub fn requeue_zombie(&self, id: &str) -> Result<(), QueueError> {
        let mut state = self.inner.state.lock();
        let job =
            state.get_job(id).ok_or_else(|| QueueError::NotFound(JobId::from_string(id)))?;
        if job.status != JobStatus::Processing {
            return Ok(());
        }
        let now = self.inner.clock.epoch_ms();
        let (id, attempts) = (job.id, job.attempts);
        self.commit(
            &mut state,
            vec![Event::JobRequeued {
                id,
                attempts,
                reason: RequeueReason::Reconciled,
                at_ms: now,
            }],
            vec![],
        )
    }

    /// Fail a pending job whose source file vanished.
    pub fn fail_phantom(&self, id: &str) -> Result<(), QueueError> {
        let mut state = self.inner.state.lock();
        let job =
            state.get_job(id).ok_or_else(|| QueueError::NotFound(JobId::from_string(id)))?;
        if job.status != JobStatus::Pending {
            return Ok(());
        }
        let now = self.inner.clock.epoch_ms();
        let id = job.id;
        let reason = format!("Source file no longer present at {}", job.file_path.display());
        self.commit(
            &mut state,
            vec![Event::JobFailed {
                id,
                error_code: ErrorCode::FileMissing,
                error_reason: reason,
                at_ms: now,
            }],
            vec![QueueEvent::Failed { id, code: ErrorCode::FileMissing }],
        )
    }

    // ── Internals shared with the sweeper and tracker ────────────────────

    pub(crate) fn with_state<R>(
        &self,
        f: impl FnOnce(&mut MaterializedState) -> R,
    ) -> R {
        let mut state = self.inner.state.lock();
        f(&mut state)
    }

    pub(crate) fn commit_locked(
        &self,
        state: &mut MaterializedState,
        events: Vec<Event>,
        notify: Vec<QueueEvent>,
    ) -> Result<(), QueueError> {
        self.commit(state, events, notify)
    }

    /// Flush the WAL, checkpoint state, and compact the log.
    pub fn checkpoint(
        &self,
        checkpointer: &tp_storage::Checkpointer,
    ) -> Result<tp_storage::CheckpointResult, QueueError> {
        let state = self.inner.state.lock();
        let mut wal = self.inner.wal.lock();
        wal.flush()?;
        let seq = wal.processed_seq();
        let result = checkpointer
            .checkpoint_sync(seq, &state)
            .map_err(|e| WalError::Io(std::io::Error::other(e.to_string())))?;
        wal.truncate_before(seq + 1)?;
        Ok(result)
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
