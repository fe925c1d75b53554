// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The front-to-back success scenarios: ingest → claim → engine → artifacts.

use super::support::{World, WELL_BEHAVED_ENGINE};
use tp_core::{JobStatus, Priority};
use tp_daemon::ingest::IngestOutcome;

#[tokio::test]
async fn small_file_flows_to_completed_tree() {
    let world = World::new(WELL_BEHAVED_ENGINE);
    let path = world.drop_audio("A", "lecture.mp3");

    let IngestOutcome::Enqueued { id, .. } = world.ingest.ingest_file(&path).unwrap() else {
        panic!("expected enqueue");
    };
    let pending = world.queue.get(&id).unwrap();
    assert_eq!(pending.status, JobStatus::Pending);
    assert_eq!(pending.priority, Priority::Urgent, "small files jump the queue");

    let (pool, shutdown) = world.start_pool(1);
    let job = world.wait_until_terminal(&world.queue, &id).await;
    shutdown.cancel();
    pool.shutdown().await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);

    let audio = world.config.dirs.completed.join("A/lecture.mp3");
    let transcript = world.config.dirs.completed.join("A/lecture.mp3.txt");
    assert!(audio.is_file());
    assert_eq!(
        std::fs::read_to_string(&transcript).unwrap(),
        "transcript of lecture.mp3"
    );
    assert!(!path.exists(), "inbox copy must move out");
}

#[tokio::test]
async fn sanitized_file_completes_with_both_names_recorded() {
    let world = World::new(WELL_BEHAVED_ENGINE);
    let path = world.drop_audio("A", "My Notes 📝.mp3");

    let IngestOutcome::Enqueued { id, sanitized } = world.ingest.ingest_file(&path).unwrap()
    else {
        panic!("expected enqueue");
    };
    assert!(sanitized);
    assert!(world.config.dirs.watch.join("A/My_Notes_.mp3").is_file());

    let (pool, shutdown) = world.start_pool(1);
    let job = world.wait_until_terminal(&world.queue, &id).await;
    shutdown.cancel();
    pool.shutdown().await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.original_file_name, "My Notes 📝.mp3");
    assert_eq!(job.sanitized_file_name, "My_Notes_.mp3");
    assert!(world.config.dirs.completed.join("A/My_Notes_.mp3.txt").is_file());
}

#[tokio::test]
async fn nested_relative_paths_are_preserved() {
    let world = World::new(WELL_BEHAVED_ENGINE);
    let path = world.drop_audio("courses/ml/week1", "intro.mp3");

    let IngestOutcome::Enqueued { id, .. } = world.ingest.ingest_file(&path).unwrap() else {
        panic!("expected enqueue");
    };
    let (pool, shutdown) = world.start_pool(1);
    world.wait_until_terminal(&world.queue, &id).await;
    shutdown.cancel();
    pool.shutdown().await;

    assert!(world.config.dirs.completed.join("courses/ml/week1/intro.mp3").is_file());
    assert!(world
        .config
        .dirs
        .completed
        .join("courses/ml/week1/intro.mp3.txt")
        .is_file());
}
