// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hard-crash scenarios: the WAL plus the on-disk layout must rebuild a
//! consistent world, and interrupted work must re-run to an identical result.

use super::support::{World, WELL_BEHAVED_ENGINE};
use tp_core::JobStatus;
use tp_daemon::ingest::IngestOutcome;
use tp_daemon::lifecycle::reconcile;

#[tokio::test]
async fn crash_mid_processing_recovers_and_completes_identically() {
    let world = World::new(WELL_BEHAVED_ENGINE);

    // Reference run: what the transcript should say with no crash
    let reference = {
        let path = world.drop_audio("ref", "lecture.mp3");
        let IngestOutcome::Enqueued { id, .. } = world.ingest.ingest_file(&path).unwrap()
        else {
            panic!("expected enqueue");
        };
        let (pool, shutdown) = world.start_pool(1);
        world.wait_until_terminal(&world.queue, &id).await;
        shutdown.cancel();
        pool.shutdown().await;
        std::fs::read_to_string(world.config.dirs.completed.join("ref/lecture.mp3.txt"))
            .unwrap()
    };

    // Crash run: claim the job, fake a half-written engine output, then the
    // process "dies" (we simply never complete the lease).
    let path = world.drop_audio("A", "lecture.mp3");
    let IngestOutcome::Enqueued { id, .. } = world.ingest.ingest_file(&path).unwrap() else {
        panic!("expected enqueue");
    };
    let (claimed, lease) = world.queue.claim().unwrap().unwrap();
    assert_eq!(claimed.id, id);
    world.queue.report_progress(&lease, 50).unwrap();

    let scratch = world.config.dirs.output.join("A");
    std::fs::create_dir_all(&scratch).unwrap();
    std::fs::write(scratch.join("lecture.txt"), "half a transcri").unwrap();

    // Restart: rebuild from the WAL, then reconcile before anything runs
    let (queue, ingest) = world.reopen();
    let recovered = queue.get(&id).unwrap();
    assert_eq!(recovered.status, JobStatus::Processing, "WAL preserved the crash state");
    assert_eq!(recovered.progress, 50);

    let report = reconcile(&ingest).unwrap();
    assert_eq!(report.jobs_reconciled, 1);
    assert_eq!(report.partial_files_deleted, 1);
    assert!(!scratch.join("lecture.txt").exists());

    let reset = queue.get(&id).unwrap();
    assert_eq!(reset.status, JobStatus::Pending);
    assert_eq!(reset.attempts, claimed.attempts, "reconcile must not burn an attempt");
    assert_eq!(reset.progress, 0, "progress restarts from zero");

    // Second life: a fresh pool drains it to the same transcript
    let (pool, shutdown) = world.start_pool_on(1, &queue);
    let job = world.wait_until_terminal(&queue, &id).await;
    shutdown.cancel();
    pool.shutdown().await;

    assert_eq!(job.status, JobStatus::Completed);
    let transcript =
        std::fs::read_to_string(world.config.dirs.completed.join("A/lecture.mp3.txt")).unwrap();
    assert_eq!(transcript, reference, "crash must not truncate or alter the transcript");
}

#[tokio::test]
async fn restart_enqueues_orphans_and_fails_phantoms() {
    let world = World::new(WELL_BEHAVED_ENGINE);

    // A file that arrived while the daemon was down
    world.drop_audio("B", "orphan.mp3");

    // A job whose source vanished while the daemon was down
    let phantom_path = world.drop_audio("B", "phantom.mp3");
    let IngestOutcome::Enqueued { id: phantom_id, .. } =
        world.ingest.ingest_file(&phantom_path).unwrap()
    else {
        panic!("expected enqueue");
    };
    std::fs::remove_file(&phantom_path).unwrap();

    let (queue, ingest) = world.reopen();
    let report = reconcile(&ingest).unwrap();
    assert_eq!(report.jobs_created, 1);
    assert_eq!(report.phantoms_failed, 1);

    let phantom = queue.get(&phantom_id).unwrap();
    assert_eq!(phantom.status, JobStatus::Failed);
    assert!(phantom
        .error_reason
        .as_deref()
        .unwrap_or_default()
        .contains("phantom.mp3"));

    // Exactly one non-terminal job per inbox file after reconcile
    let counts = queue.count_by_status();
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.processing, 0);
}

#[tokio::test]
async fn double_restart_is_idempotent() {
    let world = World::new(WELL_BEHAVED_ENGINE);
    world.drop_audio("C", "once.mp3");

    let (_, ingest) = world.reopen();
    let first = reconcile(&ingest).unwrap();
    assert_eq!(first.jobs_created, 1);

    let (queue, ingest) = world.reopen();
    let second = reconcile(&ingest).unwrap();
    assert_eq!(second.jobs_created, 0, "reconcile must not double-enqueue");
    assert_eq!(queue.count_by_status().pending, 1);
}

#[tokio::test]
async fn injected_concurrency_drift_is_demoted_within_one_sweep() {
    use tp_core::test_support::{claimed_event, enqueued_event_for, JobBuilder};
    use tp_core::SystemClock;
    use tp_storage::{MaterializedState, Wal};

    // Fabricate store-level drift: five processing records against a limit
    // of three, as corrupted state (or a buggy migration) could produce.
    let mut state = MaterializedState::default();
    for i in 0..5 {
        let id = format!("job-drift{i}");
        state.apply_event(&enqueued_event_for(
            JobBuilder::new().id(id.as_str()).file_path(format!("/watch/d/{i}.mp3")).build(),
        ));
        state.apply_event(&claimed_event(&id, &format!("lse-{i}"), 1_000 + i as u64));
    }

    let dir = tempfile::TempDir::new().unwrap();
    let wal = Wal::open(&dir.path().join("events.wal"), 0).unwrap();
    let queue = tp_queue::JobQueue::new(
        state,
        wal,
        SystemClock,
        tp_queue::QueueConfig::default(),
    );
    assert_eq!(queue.count_by_status().processing, 5);

    // One sweep cycle restores the invariant, oldest first. (Those synthetic
    // leases are long-expired against the system clock, so they also count
    // as stalls; either path ends with |processing| ≤ limit.)
    queue.sweep_stalled().unwrap();
    assert!(
        queue.count_by_status().processing <= queue.config().concurrency_limit,
        "sweep must restore the concurrency invariant"
    );
    assert_eq!(queue.count_by_status().processing, 0);
}
