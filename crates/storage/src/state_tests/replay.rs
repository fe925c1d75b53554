// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Round-trip law: state rebuilt from the durable WAL equals the state that
//! was materialized live, for arbitrary event sequences.

use super::*;
use crate::wal::Wal;
use proptest::prelude::*;
use tempfile::tempdir;
use tp_core::{ErrorCode, RequeueReason};

#[derive(Debug, Clone)]
enum Step {
    Enqueue(u8),
    Claim(u8, u8),
    Progress(u8, u8),
    Complete(u8),
    Requeue(u8, u8),
    Fail(u8),
    Retry(u8),
    Delete(u8),
    Mark(u8),
    Unmark(u8),
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0u8..8).prop_map(Step::Enqueue),
        (0u8..8, 0u8..4).prop_map(|(j, l)| Step::Claim(j, l)),
        (0u8..8, 0u8..=100).prop_map(|(j, p)| Step::Progress(j, p)),
        (0u8..8).prop_map(Step::Complete),
        (0u8..8, 1u8..4).prop_map(|(j, a)| Step::Requeue(j, a)),
        (0u8..8).prop_map(Step::Fail),
        (0u8..8).prop_map(Step::Retry),
        (0u8..8).prop_map(Step::Delete),
        (0u8..8).prop_map(Step::Mark),
        (0u8..8).prop_map(Step::Unmark),
    ]
}

fn event_for(step: &Step, at_ms: u64) -> Event {
    let job = |n: &u8| format!("job-{n}");
    match step {
        Step::Enqueue(n) => enqueued_event_for(
            JobBuilder::new()
                .id(job(n).as_str())
                .file_path(format!("/watch/p/{n}.mp3"))
                .created_at_ms(at_ms)
                .build(),
        ),
        Step::Claim(n, l) => claimed_event(&job(n), &format!("lse-{l}"), at_ms),
        Step::Progress(n, p) => progress_event(&job(n), *p, at_ms),
        Step::Complete(n) => completed_event(&job(n), "/t.txt", at_ms),
        Step::Requeue(n, a) => {
            requeued_event(&job(n), *a as u32, RequeueReason::WorkerError, at_ms)
        }
        Step::Fail(n) => failed_event(&job(n), ErrorCode::EngineCrash, "boom", at_ms),
        Step::Retry(n) => Event::JobRetried { id: job(n).as_str().into(), at_ms },
        Step::Delete(n) => Event::JobDeleted { id: job(n).as_str().into() },
        Step::Mark(n) => marked_event(&format!("/watch/p/{n}.mp3"), &format!("fp-{n}"), &job(n), at_ms),
        Step::Unmark(n) => unmarked_event(&format!("/watch/p/{n}.mp3"), &format!("fp-{n}")),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn wal_replay_matches_live_state(steps in proptest::collection::vec(step_strategy(), 1..80)) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.wal");
        let mut wal = Wal::open(&path, 0).unwrap();

        // Live side: append durable first, then apply, as the queue does
        let mut live = MaterializedState::default();
        for (i, step) in steps.iter().enumerate() {
            let event = event_for(step, 1_000 + i as u64);
            wal.append(&event).unwrap();
            live.apply_event(&event);
        }
        wal.flush().unwrap();

        // Replay side: a cold boot over the same log
        let reopened = Wal::open(&path, 0).unwrap();
        let mut replayed = MaterializedState::default();
        for entry in reopened.entries_after(0).unwrap() {
            replayed.apply_event(&entry.event);
        }

        prop_assert_eq!(live.jobs.len(), replayed.jobs.len());
        for (id, job) in &live.jobs {
            prop_assert_eq!(Some(job), replayed.jobs.get(id), "job {} diverged", id);
        }
        prop_assert_eq!(&live.processed_paths, &replayed.processed_paths);
        prop_assert_eq!(&live.processed_fingerprints, &replayed.processed_fingerprints);

        // Count invariants hold on the replayed side too
        let counts = replayed.count_by_status();
        prop_assert_eq!(counts.total(), replayed.jobs.len());
    }
}
