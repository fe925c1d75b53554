// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{drop_file, test_context};
use tp_core::ErrorCode;

#[test]
fn empty_world_reconciles_to_empty_report() {
    let (ctx, _root) = test_context();
    let report = reconcile(&ctx).unwrap();
    assert_eq!(report, ReconciliationReport::default());
    assert!(ctx.config.report_path().is_file());
}

#[test]
fn zombie_processing_job_is_demoted_with_attempts_unchanged() {
    let (ctx, _root) = test_context();
    let path = drop_file(&ctx, "a", "lecture.mp3", 1024);
    ctx.ingest_file(&path).unwrap();

    // Simulate the crash: a worker claimed it, then the process died
    let (job, _lease) = ctx.queue.claim().unwrap().unwrap();
    assert_eq!(job.attempts, 0);

    // Interrupted run left a partial transcript in the scratch tree
    let scratch = ctx.config.dirs.output.join("a");
    std::fs::create_dir_all(&scratch).unwrap();
    std::fs::write(scratch.join("lecture.txt"), b"half a transcript").unwrap();

    let report = reconcile(&ctx).unwrap();
    assert_eq!(report.jobs_reconciled, 1);
    assert_eq!(report.partial_files_deleted, 1);

    let job = ctx.queue.get(&job.id).unwrap();
    assert_eq!(job.status, tp_core::JobStatus::Pending);
    assert_eq!(job.attempts, 0, "reconciliation must not burn an attempt");
    assert!(!scratch.join("lecture.txt").exists());
}

#[test]
fn no_processing_jobs_survive_reconcile() {
    let (ctx, _root) = test_context();
    for i in 0..3 {
        let path = drop_file(&ctx, "a", &format!("{i}.mp3"), 1024);
        ctx.ingest_file(&path).unwrap();
    }
    ctx.queue.claim().unwrap().unwrap();
    ctx.queue.claim().unwrap().unwrap();

    reconcile(&ctx).unwrap();
    assert_eq!(ctx.queue.count_by_status().processing, 0);
}

#[test]
fn orphan_inbox_file_is_enqueued() {
    let (ctx, _root) = test_context();
    drop_file(&ctx, "b", "orphan.mp3", 2048);

    let report = reconcile(&ctx).unwrap();
    assert_eq!(report.files_scanned, 1);
    assert_eq!(report.jobs_created, 1);
    assert_eq!(ctx.queue.count_by_status().pending, 1);
}

#[test]
fn tracked_file_is_not_reenqueued() {
    let (ctx, _root) = test_context();
    let path = drop_file(&ctx, "b", "seen.mp3", 2048);
    ctx.ingest_file(&path).unwrap();
    let (job, lease) = ctx.queue.claim().unwrap().unwrap();
    // Completed: audio would normally move out of the inbox, but even if the
    // move raced a crash, the fingerprint keeps it out of the queue
    ctx.queue.complete(&lease, "/t.txt".into()).unwrap();
    let _ = job;

    let report = reconcile(&ctx).unwrap();
    assert_eq!(report.jobs_created, 0);
    assert_eq!(ctx.queue.count_by_status().pending, 0);
}

#[test]
fn phantom_pending_job_is_failed_with_file_missing() {
    let (ctx, _root) = test_context();
    let path = drop_file(&ctx, "c", "ghost.mp3", 1024);
    let crate::ingest::IngestOutcome::Enqueued { id, .. } = ctx.ingest_file(&path).unwrap()
    else {
        panic!("expected enqueue");
    };
    std::fs::remove_file(&path).unwrap();

    let report = reconcile(&ctx).unwrap();
    assert_eq!(report.phantoms_failed, 1);

    let job = ctx.queue.get(&id).unwrap();
    assert_eq!(job.status, tp_core::JobStatus::Failed);
    assert_eq!(job.error_code, Some(ErrorCode::FileMissing));
    assert!(job.error_reason.as_deref().unwrap_or_default().contains("ghost.mp3"));
}

#[test]
fn fresh_tmp_files_survive_the_sweep() {
    let (ctx, _root) = test_context();
    let tmp = ctx.config.dirs.completed.join("x.mp3.tmp");
    std::fs::write(&tmp, b"in flight").unwrap();

    reconcile(&ctx).unwrap();
    assert!(tmp.exists(), "fresh tmp must not be swept");
}

#[test]
fn aged_tmp_files_are_swept() {
    let (ctx, _root) = test_context();
    let tmp = ctx.config.dirs.output.join("x.mp3.tmp");
    std::fs::write(&tmp, b"in flight").unwrap();

    // Age threshold of zero treats every tmp file as stale
    sweep_tmp(&ctx.config.dirs.output, Duration::ZERO);
    assert!(!tmp.exists());
}

#[test]
fn tmp_files_are_not_ingested_as_orphans() {
    let (ctx, _root) = test_context();
    std::fs::write(ctx.config.dirs.watch.join("half.mp3.tmp"), b"bytes").unwrap();

    let report = reconcile(&ctx).unwrap();
    assert_eq!(report.files_scanned, 0);
    assert_eq!(report.jobs_created, 0);
}

#[test]
fn runtime_reconcile_restores_claims() {
    let (ctx, _root) = test_context();
    drop_file(&ctx, "d", "late.mp3", 512);

    let report = reconcile_paused(&ctx).unwrap();
    assert_eq!(report.jobs_created, 1);
    assert!(!ctx.queue.claims_paused());
    // The freshly created job is claimable again
    assert!(ctx.queue.claim().unwrap().is_some());
}

#[test]
fn report_is_persisted_as_json() {
    let (ctx, _root) = test_context();
    drop_file(&ctx, "e", "one.mp3", 512);
    let report = reconcile(&ctx).unwrap();

    let raw = std::fs::read_to_string(ctx.config.report_path()).unwrap();
    let parsed: ReconciliationReport = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed, report);
    assert!(raw.contains("filesScanned"));
}
