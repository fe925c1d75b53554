// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;
use tp_core::JobStatus;

use crate::test_helpers::test_context;

fn spawn(ctx: &Arc<IngestContext>) -> (CancellationToken, tokio::task::JoinHandle<()>) {
    let shutdown = CancellationToken::new();
    let handle = spawn_watcher(Arc::clone(ctx), shutdown.clone()).unwrap();
    (shutdown, handle)
}

async fn wait_for_jobs(ctx: &IngestContext, count: usize) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while ctx.queue.count_by_status().total() < count {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!("expected {count} jobs, have {}", ctx.queue.count_by_status().total())
    });
}

#[tokio::test]
async fn initial_scan_ingests_existing_files() {
    let (ctx, _root) = test_context();
    let ctx = Arc::new(ctx);
    let dir = ctx.config.dirs.watch.join("a");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("one.mp3"), b"audio").unwrap();
    std::fs::write(dir.join("two.mp3"), b"audio").unwrap();

    let (shutdown, handle) = spawn(&ctx);
    wait_for_jobs(&ctx, 2).await;
    shutdown.cancel();
    handle.await.unwrap();

    let counts = ctx.queue.count_by_status();
    assert_eq!(counts.pending, 2);
}

#[tokio::test]
async fn new_file_is_picked_up() {
    let (ctx, _root) = test_context();
    let ctx = Arc::new(ctx);

    let (shutdown, handle) = spawn(&ctx);
    // Give the recursive watch a moment to arm
    tokio::time::sleep(Duration::from_millis(200)).await;

    let dir = ctx.config.dirs.watch.join("fresh");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("drop.mp3"), b"audio").unwrap();

    wait_for_jobs(&ctx, 1).await;
    shutdown.cancel();
    handle.await.unwrap();

    let page = ctx
        .queue
        .list(&tp_queue::ListFilter::default(), tp_queue::Page::default());
    assert_eq!(page.jobs[0].file_name, "drop.mp3");
    assert_eq!(page.jobs[0].status, JobStatus::Pending);
}

#[tokio::test]
async fn restart_does_not_double_enqueue() {
    let (ctx, _root) = test_context();
    let ctx = Arc::new(ctx);
    let dir = ctx.config.dirs.watch.join("a");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("seen.mp3"), b"audio").unwrap();

    let (shutdown, handle) = spawn(&ctx);
    wait_for_jobs(&ctx, 1).await;
    shutdown.cancel();
    handle.await.unwrap();

    // Simulated watcher restart over the same queue
    let (shutdown, handle) = spawn(&ctx);
    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(ctx.queue.count_by_status().total(), 1);
}

#[tokio::test]
async fn unreadable_inbox_fails_fast() {
    let (ctx, _root) = test_context();
    std::fs::remove_dir_all(&ctx.config.dirs.watch).unwrap();
    let result = spawn_watcher(Arc::new(ctx), CancellationToken::new());
    assert!(matches!(result, Err(WatchError::InboxUnreadable(_))));
}

#[tokio::test]
async fn tmp_and_hidden_files_are_ignored() {
    let (ctx, _root) = test_context();
    let ctx = Arc::new(ctx);
    std::fs::write(ctx.config.dirs.watch.join(".hidden.mp3"), b"x").unwrap();
    std::fs::write(ctx.config.dirs.watch.join("copy.mp3.tmp"), b"x").unwrap();

    let (shutdown, handle) = spawn(&ctx);
    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(ctx.queue.count_by_status().total(), 0);
}

#[tokio::test]
async fn files_beyond_max_depth_are_ignored() {
    let (ctx, _root) = test_context();
    let ctx = Arc::new(ctx);
    let deep = ctx.config.dirs.watch.join("a/b/c/d");
    std::fs::create_dir_all(&deep).unwrap();
    std::fs::write(deep.join("deep.mp3"), b"audio").unwrap();

    let (shutdown, handle) = spawn(&ctx);
    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(ctx.queue.count_by_status().total(), 0);
}

#[tokio::test]
async fn removed_pending_file_fails_its_job() {
    let (ctx, _root) = test_context();
    let ctx = Arc::new(ctx);
    let dir = ctx.config.dirs.watch.join("a");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("fleeting.mp3");
    std::fs::write(&path, b"audio").unwrap();

    let (shutdown, handle) = spawn(&ctx);
    wait_for_jobs(&ctx, 1).await;

    std::fs::remove_file(&path).unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while ctx.queue.count_by_status().failed == 0 {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("pending job was not failed after removal");

    shutdown.cancel();
    handle.await.unwrap();

    let page = ctx
        .queue
        .list(&tp_queue::ListFilter::default(), tp_queue::Page::default());
    let job = &page.jobs[0];
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_code, Some(tp_core::ErrorCode::FileMissing));
    // Tracker forgets the path so a re-dropped file is ingested again
    assert!(!ctx.tracker.is_processed(&path));
}

// ── Write stability ─────────────────────────────────────────────────────────

#[tokio::test]
async fn stability_waits_for_growth_to_stop() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("growing.mp3");
    std::fs::write(&path, b"start").unwrap();

    let grower = {
        let path = path.clone();
        tokio::spawn(async move {
            for _ in 0..3 {
                tokio::time::sleep(Duration::from_millis(60)).await;
                let mut bytes = std::fs::read(&path).unwrap();
                bytes.extend_from_slice(b"more");
                std::fs::write(&path, bytes).unwrap();
            }
        })
    };

    assert!(wait_write_stable(&path, Duration::from_millis(150)).await);
    grower.await.unwrap();
}

#[tokio::test]
async fn stability_fails_for_vanished_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("gone.mp3");
    std::fs::write(&path, b"x").unwrap();

    let remover = {
        let path = path.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            std::fs::remove_file(&path).unwrap();
        })
    };

    assert!(!wait_write_stable(&path, Duration::from_millis(300)).await);
    remover.await.unwrap();
}
