// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The full live pipeline: watcher → queue → pool → completed tree, with no
//! manual ingestion calls.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::support::{World, WELL_BEHAVED_ENGINE};
use tp_daemon::watcher::spawn_watcher;

#[tokio::test]
async fn dropped_file_is_transcribed_end_to_end() {
    let world = World::new(WELL_BEHAVED_ENGINE);

    let shutdown = CancellationToken::new();
    let watcher = spawn_watcher(Arc::clone(&world.ingest), shutdown.clone()).unwrap();
    let (pool, pool_shutdown) = world.start_pool(2);

    // Arm the recursive watch, then drop the file in
    tokio::time::sleep(Duration::from_millis(200)).await;
    world.drop_audio("live/session1", "standup.mp3");

    tokio::time::timeout(Duration::from_secs(15), async {
        while world.queue.count_by_status().completed < 1 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("file was never transcribed");

    shutdown.cancel();
    pool_shutdown.cancel();
    watcher.await.unwrap();
    pool.shutdown().await;

    assert!(world
        .config
        .dirs
        .completed
        .join("live/session1/standup.mp3.txt")
        .is_file());
    assert!(!world.config.dirs.watch.join("live/session1/standup.mp3").exists());
}

#[tokio::test]
async fn batch_of_files_respects_concurrency_and_drains() {
    let world = World::new(WELL_BEHAVED_ENGINE);

    // Pre-existing backlog picked up by the initial scan
    for i in 0..6 {
        world.drop_audio("backlog", &format!("ep{i}.mp3"));
    }

    let shutdown = CancellationToken::new();
    let watcher = spawn_watcher(Arc::clone(&world.ingest), shutdown.clone()).unwrap();
    let (pool, pool_shutdown) = world.start_pool(3);

    tokio::time::timeout(Duration::from_secs(20), async {
        loop {
            let counts = world.queue.count_by_status();
            assert!(counts.processing <= 3, "|processing| exceeded the limit");
            if counts.completed == 6 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("backlog did not drain");

    shutdown.cancel();
    pool_shutdown.cancel();
    watcher.await.unwrap();
    pool.shutdown().await;

    for i in 0..6 {
        assert!(world
            .config
            .dirs
            .completed
            .join(format!("backlog/ep{i}.mp3.txt"))
            .is_file());
    }
}

#[tokio::test]
async fn watcher_survives_invalid_files_amid_valid_ones() {
    let world = World::new(WELL_BEHAVED_ENGINE);
    world.drop_audio("mixed", "good.mp3");
    std::fs::write(world.config.dirs.watch.join("mixed/readme.txt"), b"notes").unwrap();

    let shutdown = CancellationToken::new();
    let watcher = spawn_watcher(Arc::clone(&world.ingest), shutdown.clone()).unwrap();
    let (pool, pool_shutdown) = world.start_pool(1);

    tokio::time::timeout(Duration::from_secs(15), async {
        while world.queue.count_by_status().completed < 1 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("valid file was not processed");

    shutdown.cancel();
    pool_shutdown.cancel();
    watcher.await.unwrap();
    pool.shutdown().await;

    // The invalid file was skipped, not failed, and stays put
    assert_eq!(world.queue.count_by_status().total(), 1);
    assert!(world.config.dirs.watch.join("mixed/readme.txt").is_file());
}
