// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Every event must be safe to apply twice (commit-time apply + WAL replay).

use super::*;

fn assert_double_apply_matches(events: &[Event]) {
    let mut once = MaterializedState::default();
    for event in events {
        once.apply_event(event);
    }

    let mut twice = MaterializedState::default();
    for event in events {
        twice.apply_event(event);
        twice.apply_event(event);
    }

    assert_eq!(once.jobs.len(), twice.jobs.len());
    for (id, job) in &once.jobs {
        assert_eq!(Some(job), twice.jobs.get(id), "divergence for {id}");
    }
    assert_eq!(once.processed_paths, twice.processed_paths);
    assert_eq!(once.processed_fingerprints, twice.processed_fingerprints);
}

#[test]
fn full_success_path_is_idempotent() {
    assert_double_apply_matches(&[
        enqueued_event("job-1"),
        claimed_event("job-1", "lse-1", 1_000),
        progress_event("job-1", 30, 2_000),
        progress_event("job-1", 60, 3_000),
        completed_event("job-1", "/completed/a/x.mp3.txt", 4_000),
        marked_event("/watch/a/x.mp3", "fp-1", "job-1", 4_000),
    ]);
}

#[test]
fn retry_path_is_idempotent() {
    assert_double_apply_matches(&[
        enqueued_event("job-1"),
        claimed_event("job-1", "lse-1", 1_000),
        requeued_event("job-1", 1, RequeueReason::WorkerError, 2_000),
        claimed_event("job-1", "lse-2", 3_000),
        requeued_event("job-1", 2, RequeueReason::Stalled, 4_000),
        claimed_event("job-1", "lse-3", 5_000),
        failed_event("job-1", ErrorCode::EngineCrash, "exit code 1", 6_000),
        Event::JobRetried { id: "job-1".into(), at_ms: 7_000 },
    ]);
}

#[test]
fn stall_and_demotion_path_is_idempotent() {
    assert_double_apply_matches(&[
        enqueued_event("job-1"),
        claimed_event("job-1", "lse-1", 1_000),
        Event::JobStalled { id: "job-1".into(), stall_count: 1, at_ms: 70_000 },
        requeued_event("job-1", 1, RequeueReason::Stalled, 70_000),
    ]);
}

#[test]
fn tracker_unmark_is_idempotent() {
    assert_double_apply_matches(&[
        marked_event("/watch/a/x.mp3", "fp-1", "job-1", 1_000),
        unmarked_event("/watch/a/x.mp3", "fp-1"),
    ]);
}

#[test]
fn attempts_do_not_double_increment_on_replay() {
    let events = vec![
        enqueued_event("job-1"),
        claimed_event("job-1", "lse-1", 1_000),
        requeued_event("job-1", 1, RequeueReason::WorkerError, 2_000),
    ];

    let mut state = MaterializedState::default();
    for event in &events {
        state.apply_event(event);
    }
    // Replay everything, as boot does over a snapshot that already saw them
    for event in &events {
        state.apply_event(event);
    }

    assert_eq!(state.jobs["job-1"].attempts, 1);
}
