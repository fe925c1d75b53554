// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job event handlers.

use tp_core::Event;

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::JobEnqueued { job } => {
            // Idempotency: first write wins
            if !state.jobs.contains_key(&job.id) {
                state.jobs.insert(job.id, (**job).clone());
            }
        }

        Event::JobClaimed { id, lease_id, expires_at_ms, at_ms } => {
            if let Some(job) = state.jobs.get_mut(id) {
                job.apply_claim(*lease_id, *expires_at_ms, *at_ms);
            }
        }

        Event::LeaseRenewed { id, lease_id, expires_at_ms, at_ms } => {
            if let Some(job) = state.jobs.get_mut(id) {
                job.apply_lease_renewal(*lease_id, *expires_at_ms, *at_ms);
            }
        }

        Event::ProgressReported { id, percent, at_ms } => {
            if let Some(job) = state.jobs.get_mut(id) {
                job.apply_progress(*percent, *at_ms);
            }
        }

        Event::JobCompleted { id, transcript_path, at_ms } => {
            if let Some(job) = state.jobs.get_mut(id) {
                job.apply_completion(transcript_path.clone(), *at_ms);
            }
        }

        Event::JobRequeued { id, attempts, .. } => {
            if let Some(job) = state.jobs.get_mut(id) {
                job.apply_requeue(*attempts);
            }
        }

        Event::JobFailed { id, error_code, error_reason, at_ms } => {
            if let Some(job) = state.jobs.get_mut(id) {
                job.apply_failure(*error_code, error_reason.clone(), *at_ms);
            }
        }

        Event::JobStalled { id, stall_count, at_ms } => {
            if let Some(job) = state.jobs.get_mut(id) {
                job.apply_stall(*stall_count, *at_ms);
            }
        }

        Event::JobRetried { id, .. } => {
            if let Some(job) = state.jobs.get_mut(id) {
                job.apply_retry();
            }
        }

        Event::JobRevived { id, .. } => {
            if let Some(job) = state.jobs.get_mut(id) {
                job.apply_revive();
            }
        }

        Event::JobCancelled { id, at_ms } => {
            if let Some(job) = state.jobs.get_mut(id) {
                job.apply_cancel(*at_ms);
            }
        }

        Event::JobUpdated { id, priority, metadata, .. } => {
            if let Some(job) = state.jobs.get_mut(id) {
                job.apply_update(*priority, metadata.clone());
            }
        }

        Event::JobDeleted { id } => {
            state.jobs.remove(id);
        }

        _ => {}
    }
}
