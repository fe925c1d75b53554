// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stalled-job detection and concurrency-drift repair.
//!
//! Leases are the liveness signal: a processing job whose lease has expired
//! lost its worker (crash, kill, wedged subprocess). The sweeper requeues it
//! up to `max_stalled_count` times, then fails it terminally. The same pass
//! restores `|processing| ≤ limit` if drift is ever observed.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use tp_core::{Clock, ErrorCode, Event, JobStatus, RequeueReason};

use crate::events::QueueEvent;
use crate::queue::{JobQueue, QueueError};

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub requeued: usize,
    pub failed: usize,
    pub demoted: usize,
}

impl<C: Clock> JobQueue<C> {
    /// One sweep pass: recover expired leases, then repair concurrency drift.
    ///
    /// Called periodically by [`spawn_sweeper`] and directly by tests.
    pub fn sweep_stalled(&self) -> Result<SweepReport, QueueError> {
        let now = self.clock().epoch_ms();
        let max_stalled = self.config().max_stalled_count;
        let limit = self.config().concurrency_limit;
        let mut report = SweepReport::default();

        self.with_state(|state| {
            // Expired leases
            let expired: Vec<_> = state
                .jobs
                .values()
                .filter(|j| {
                    j.status == JobStatus::Processing
                        && j.lease.map(|l| l.expires_at_ms <= now).unwrap_or(true)
                })
                .map(|j| (j.id, j.attempts, j.stall_count))
                .collect();

            for (id, attempts, stall_count) in expired {
                let stall_count = stall_count + 1;
                let mut events =
                    vec![Event::JobStalled { id, stall_count, at_ms: now }];
                let mut notify = vec![QueueEvent::Stalled { id, stall_count }];

                if stall_count <= max_stalled {
                    warn!(
                        job_id = %id,
                        stall_count,
                        max_stalled,
                        "[SELF-HEAL] lease expired, requeueing stalled job"
                    );
                    events.push(Event::JobRequeued {
                        id,
                        attempts: attempts + 1,
                        reason: RequeueReason::Stalled,
                        at_ms: now,
                    });
                    report.requeued += 1;
                } else {
                    let reason = format!("Job stalled after {} attempts", stall_count);
                    warn!(job_id = %id, stall_count, "[SELF-HEAL] stall budget exhausted, failing job");
                    events.push(Event::JobFailed {
                        id,
                        error_code: ErrorCode::JobStalled,
                        error_reason: reason,
                        at_ms: now,
                    });
                    notify.push(QueueEvent::Failed { id, code: ErrorCode::JobStalled });
                    report.failed += 1;
                }

                self.commit_locked(state, events, notify)?;
            }

            // Concurrency drift: demote excess processing jobs oldest-first
            loop {
                let mut processing: Vec<_> = state
                    .jobs
                    .values()
                    .filter(|j| j.status == JobStatus::Processing)
                    .map(|j| (j.started_at_ms.unwrap_or(j.created_at_ms), j.id, j.attempts))
                    .collect();
                if processing.len() <= limit {
                    break;
                }
                processing.sort();
                let (_, id, attempts) = processing[0];
                warn!(
                    job_id = %id,
                    processing = processing.len(),
                    limit,
                    "[SELF-HEAL] concurrency drift, demoting excess processing job"
                );
                self.commit_locked(
                    state,
                    vec![Event::JobRequeued {
                        id,
                        attempts,
                        reason: RequeueReason::Demoted,
                        at_ms: now,
                    }],
                    vec![],
                )?;
                report.demoted += 1;
            }

            Ok(report)
        })
    }
}

/// Run the sweeper at the configured `stalled_interval` until cancelled.
pub fn spawn_sweeper<C: Clock>(
    queue: JobQueue<C>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let period = Duration::from_millis(queue.config().stalled_interval_ms.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = queue.sweep_stalled() {
                        warn!(error = %e, "stall sweep failed; will retry next interval");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "stall_tests.rs"]
mod tests;
