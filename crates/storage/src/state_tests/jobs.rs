// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

// ── Basic job transitions ────────────────────────────────────────────────────

#[test]
fn enqueued_creates_pending_job() {
    let mut state = MaterializedState::default();
    state.apply_event(&enqueued_event("job-1"));

    let job = &state.jobs["job-1"];
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempts, 0);
    assert_eq!(job.progress, 0);
}

#[test]
fn claimed_marks_processing_with_lease() {
    let mut state = MaterializedState::default();
    state.apply_event(&enqueued_event("job-1"));
    state.apply_event(&claimed_event("job-1", "lse-1", 1_000));

    let job = &state.jobs["job-1"];
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.started_at_ms, Some(1_000));
    let lease = job.lease.unwrap();
    assert_eq!(lease.lease_id, "lse-1");
    assert_eq!(lease.expires_at_ms, 61_000);
}

#[test]
fn lease_renewal_extends_only_matching_lease() {
    let mut state = MaterializedState::default();
    state.apply_event(&enqueued_event("job-1"));
    state.apply_event(&claimed_event("job-1", "lse-1", 1_000));

    state.apply_event(&Event::LeaseRenewed {
        id: "job-1".into(),
        lease_id: "lse-other".into(),
        expires_at_ms: 500_000,
        at_ms: 2_000,
    });
    assert_eq!(state.jobs["job-1"].lease.unwrap().expires_at_ms, 61_000);

    state.apply_event(&Event::LeaseRenewed {
        id: "job-1".into(),
        lease_id: "lse-1".into(),
        expires_at_ms: 120_000,
        at_ms: 2_000,
    });
    assert_eq!(state.jobs["job-1"].lease.unwrap().expires_at_ms, 120_000);
    assert_eq!(state.jobs["job-1"].last_progress_at_ms, Some(2_000));
}

#[test]
fn completed_clears_lease_and_sets_artifact() {
    let mut state = MaterializedState::default();
    state.apply_event(&enqueued_event("job-1"));
    state.apply_event(&claimed_event("job-1", "lse-1", 1_000));
    state.apply_event(&progress_event("job-1", 80, 5_000));
    state.apply_event(&completed_event("job-1", "/completed/a/x.mp3.txt", 9_000));

    let job = &state.jobs["job-1"];
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert!(job.lease.is_none());
    assert_eq!(job.duration_ms, Some(8_000));
}

#[test]
fn requeued_returns_to_pending_with_attempts() {
    let mut state = MaterializedState::default();
    state.apply_event(&enqueued_event("job-1"));
    state.apply_event(&claimed_event("job-1", "lse-1", 1_000));
    state.apply_event(&progress_event("job-1", 50, 5_000));
    state.apply_event(&requeued_event("job-1", 1, RequeueReason::WorkerError, 6_000));

    let job = &state.jobs["job-1"];
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.progress, 0);
    assert!(job.lease.is_none());
}

#[test]
fn failed_is_terminal_with_taxonomy() {
    let mut state = MaterializedState::default();
    state.apply_event(&enqueued_event("job-1"));
    state.apply_event(&claimed_event("job-1", "lse-1", 1_000));
    state.apply_event(&failed_event("job-1", ErrorCode::EngineCrash, "exit code 1", 9_000));

    let job = &state.jobs["job-1"];
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_code, Some(ErrorCode::EngineCrash));
    assert_eq!(job.error_reason.as_deref(), Some("exit code 1"));
}

#[test]
fn deleted_removes_record() {
    let mut state = MaterializedState::default();
    state.apply_event(&enqueued_event("job-1"));
    state.apply_event(&Event::JobDeleted { id: "job-1".into() });

    assert!(!state.jobs.contains_key("job-1"));
}

#[test]
fn events_for_unknown_jobs_are_noops() {
    let mut state = MaterializedState::default();
    state.apply_event(&claimed_event("job-ghost", "lse-1", 1_000));
    state.apply_event(&completed_event("job-ghost", "/t.txt", 2_000));
    state.apply_event(&Event::JobDeleted { id: "job-ghost".into() });

    assert!(state.jobs.is_empty());
}

#[test]
fn updated_patches_priority_and_metadata() {
    let mut state = MaterializedState::default();
    state.apply_event(&enqueued_event("job-1"));

    state.apply_event(&Event::JobUpdated {
        id: "job-1".into(),
        priority: Some(Priority::Low),
        metadata: None,
        at_ms: 2_000,
    });

    let job = &state.jobs["job-1"];
    assert_eq!(job.priority, Priority::Low);
    // Id must never change on update
    assert_eq!(job.id, "job-1");
}

#[test]
fn stalled_records_absolute_count() {
    let mut state = MaterializedState::default();
    state.apply_event(&enqueued_event("job-1"));
    state.apply_event(&claimed_event("job-1", "lse-1", 1_000));
    state.apply_event(&Event::JobStalled { id: "job-1".into(), stall_count: 1, at_ms: 70_000 });

    assert_eq!(state.jobs["job-1"].stall_count, 1);
}

#[test]
fn revived_returns_processing_job_to_pending() {
    let mut state = MaterializedState::default();
    state.apply_event(&enqueued_event("job-1"));
    state.apply_event(&claimed_event("job-1", "lse-1", 1_000));
    state.apply_event(&Event::JobRevived { id: "job-1".into(), at_ms: 5_000 });

    let job = &state.jobs["job-1"];
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.lease.is_none());
}

#[test]
fn revived_never_touches_completed_jobs() {
    let mut state = MaterializedState::default();
    state.apply_event(&enqueued_event("job-1"));
    state.apply_event(&claimed_event("job-1", "lse-1", 1_000));
    state.apply_event(&completed_event("job-1", "/t.txt", 2_000));
    state.apply_event(&Event::JobRevived { id: "job-1".into(), at_ms: 5_000 });

    assert_eq!(state.jobs["job-1"].status, JobStatus::Completed);
}

#[test]
fn cancelled_applies_only_to_inactive_jobs() {
    let mut state = MaterializedState::default();
    state.apply_event(&enqueued_event("job-1"));
    state.apply_event(&Event::JobCancelled { id: "job-1".into(), at_ms: 2_000 });
    assert_eq!(state.jobs["job-1"].status, JobStatus::Cancelled);

    state.apply_event(&enqueued_event("job-2"));
    state.apply_event(&claimed_event("job-2", "lse-1", 1_000));
    state.apply_event(&Event::JobCancelled { id: "job-2".into(), at_ms: 2_000 });
    assert_eq!(state.jobs["job-2"].status, JobStatus::Processing);
}

#[test]
fn progress_caps_and_stays_monotonic_through_events() {
    let mut state = MaterializedState::default();
    state.apply_event(&enqueued_event("job-1"));
    state.apply_event(&claimed_event("job-1", "lse-1", 1_000));
    state.apply_event(&progress_event("job-1", 120, 2_000));
    assert_eq!(state.jobs["job-1"].progress, 100);

    state.apply_event(&progress_event("job-1", 10, 3_000));
    assert_eq!(state.jobs["job-1"].progress, 100);
    assert_eq!(state.jobs["job-1"].last_progress_at_ms, Some(3_000));
}

#[test]
fn retried_resets_failed_job() {
    let mut state = MaterializedState::default();
    state.apply_event(&enqueued_event("job-1"));
    state.apply_event(&claimed_event("job-1", "lse-1", 1_000));
    state.apply_event(&failed_event("job-1", ErrorCode::EngineCrash, "boom", 9_000));
    state.apply_event(&Event::JobRetried { id: "job-1".into(), at_ms: 10_000 });

    let job = &state.jobs["job-1"];
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempts, 0);
    assert!(job.error_code.is_none());
}
