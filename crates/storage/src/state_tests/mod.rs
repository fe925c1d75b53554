// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

mod idempotency;
mod jobs;
mod replay;
mod tracker;

use super::*;
pub(super) use tp_core::test_support::{
    claimed_event, completed_event, enqueued_event, enqueued_event_for, failed_event,
    marked_event, progress_event, requeued_event, unmarked_event, JobBuilder,
};
use tp_core::{ErrorCode, Event, JobStatus, Priority, RequeueReason};

// ── Queries ──────────────────────────────────────────────────────────────────

#[test]
fn count_by_status_is_exact() {
    let mut state = MaterializedState::default();
    for i in 0..5 {
        state.apply_event(&enqueued_event(&format!("job-p{i}")));
    }
    state.apply_event(&enqueued_event("job-active"));
    state.apply_event(&claimed_event("job-active", "lse-1", 1_000));
    state.apply_event(&enqueued_event("job-done"));
    state.apply_event(&claimed_event("job-done", "lse-2", 1_000));
    state.apply_event(&completed_event("job-done", "/t.txt", 2_000));

    let counts = state.count_by_status();
    assert_eq!(counts.pending, 5);
    assert_eq!(counts.processing, 1);
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.failed, 0);
    assert_eq!(counts.total(), 7);
    assert_eq!(counts.for_status(JobStatus::Pending), 5);
}

#[test]
fn next_claimable_orders_priority_then_fifo() {
    let mut state = MaterializedState::default();
    state.apply_event(&enqueued_event_for(
        JobBuilder::new().id("job-low").priority(Priority::Low).created_at_ms(100).build(),
    ));
    state.apply_event(&enqueued_event_for(
        JobBuilder::new().id("job-old").priority(Priority::High).created_at_ms(200).build(),
    ));
    state.apply_event(&enqueued_event_for(
        JobBuilder::new().id("job-new").priority(Priority::High).created_at_ms(300).build(),
    ));

    let next = state.next_claimable().unwrap();
    assert_eq!(next.id, "job-old");
}

#[test]
fn next_claimable_skips_non_pending() {
    let mut state = MaterializedState::default();
    state.apply_event(&enqueued_event("job-1"));
    state.apply_event(&claimed_event("job-1", "lse-1", 1_000));

    assert!(state.next_claimable().is_none());
}

#[test]
fn active_job_for_path_finds_pending_and_processing() {
    let mut state = MaterializedState::default();
    state.apply_event(&enqueued_event_for(
        JobBuilder::new().id("job-1").file_path("/watch/a/x.mp3").build(),
    ));

    assert!(state.active_job_for_path(std::path::Path::new("/watch/a/x.mp3")).is_some());
    assert!(state.active_job_for_path(std::path::Path::new("/watch/a/y.mp3")).is_none());

    state.apply_event(&claimed_event("job-1", "lse-1", 1_000));
    assert!(state.active_job_for_path(std::path::Path::new("/watch/a/x.mp3")).is_some());

    state.apply_event(&completed_event("job-1", "/t.txt", 2_000));
    assert!(state.active_job_for_path(std::path::Path::new("/watch/a/x.mp3")).is_none());
}
