// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Boot reconciliation: make the on-disk layout authoritative.
//!
//! Runs exactly once during boot, blocking, before the watcher or the pool
//! accept work; also re-runnable at runtime behind a claim pause. After a
//! pass: no processing jobs exist, every inbox file has exactly one active
//! job, pending jobs without a source file are failed, and stray `.tmp`
//! copies are gone.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

use tp_core::JobStatus;
use tp_queue::QueueError;

use crate::ingest::{IngestContext, IngestOutcome};

/// Stray in-flight copies older than this are unlinked.
const TMP_MAX_AGE: Duration = Duration::from_secs(5 * 60);

/// Reconciliation errors abort the boot.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("queue error during reconciliation: {0}")]
    Store(#[from] QueueError),

    #[error("cannot write reconciliation report: {0}")]
    ReportWrite(#[source] std::io::Error),
}

/// Outcome summary, persisted to the state dir and returned by the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub files_scanned: usize,
    pub jobs_created: usize,
    pub partial_files_deleted: usize,
    pub jobs_reconciled: usize,
    pub phantoms_failed: usize,
}

/// Run one reconciliation pass.
pub fn reconcile(ctx: &IngestContext) -> Result<ReconciliationReport, ReconcileError> {
    let config = &ctx.config;
    let mut report = ReconciliationReport::default();

    // 1. Inventory the inbox.
    let inbox_files: Vec<_> = WalkDir::new(&config.dirs.watch)
        .max_depth(config.watch.max_depth)
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| !is_sweepable_name(p))
        .collect();
    report.files_scanned = inbox_files.len();

    // 2/3. Demote zombie processing jobs. No workers exist yet (or claims
    // are paused), so every processing record is a corpse from a crash.
    let state = ctx.queue.snapshot_state();
    for job in state.jobs.values().filter(|j| j.status == JobStatus::Processing) {
        let output_dir =
            tp_engine::engine_output_dir(&config.dirs.output, &job.relative_path);
        let stem = job
            .file_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let partial =
            output_dir.join(format!("{stem}.{}", config.engine.output_format.extension()));
        if partial.is_file() {
            if let Err(e) = std::fs::remove_file(&partial) {
                warn!(path = %partial.display(), error = %e, "could not delete partial transcript");
            } else {
                warn!(
                    job_id = %job.id,
                    path = %partial.display(),
                    "[SELF-HEAL] deleted partial transcript from interrupted run"
                );
                report.partial_files_deleted += 1;
            }
        }

        ctx.queue.requeue_zombie(&job.id)?;
        warn!(
            job_id = %job.id,
            attempts = job.attempts,
            "[SELF-HEAL] reset in-flight job to pending after restart"
        );
        report.jobs_reconciled += 1;
    }

    // 4. Orphan inbox files go through the full ingestion pipeline; the
    // dedup gate and the duplicate-path guard keep known files out.
    for path in &inbox_files {
        if let IngestOutcome::Enqueued { id, .. } = ctx.ingest_file(path)? {
            warn!(job_id = %id, path = %path.display(), "[SELF-HEAL] enqueued orphan inbox file");
            report.jobs_created += 1;
        }
    }

    // 5. Pending jobs whose source vanished are phantoms.
    let state = ctx.queue.snapshot_state();
    for job in state.jobs.values().filter(|j| j.status == JobStatus::Pending) {
        if !job.file_path.is_file() {
            ctx.queue.fail_phantom(&job.id)?;
            warn!(
                job_id = %job.id,
                path = %job.file_path.display(),
                "[SELF-HEAL] failed phantom job with missing source"
            );
            report.phantoms_failed += 1;
        }
    }

    // 6. Sweep stray tmp copies across every managed tree.
    for root in [
        &config.dirs.watch,
        &config.dirs.output,
        &config.dirs.completed,
        &config.dirs.failed,
    ] {
        sweep_tmp(root, TMP_MAX_AGE);
    }

    // 7. Persist the report; an unwritable state dir fails the boot.
    std::fs::write(
        config.report_path(),
        serde_json::to_vec_pretty(&report).map_err(|e| ReconcileError::ReportWrite(e.into()))?,
    )
    .map_err(ReconcileError::ReportWrite)?;

    info!(
        files_scanned = report.files_scanned,
        jobs_created = report.jobs_created,
        partial_files_deleted = report.partial_files_deleted,
        jobs_reconciled = report.jobs_reconciled,
        phantoms_failed = report.phantoms_failed,
        "reconciliation complete"
    );
    Ok(report)
}

/// Run reconciliation at runtime: claims are paused for the duration so the
/// pass never races a worker.
pub fn reconcile_paused(ctx: &IngestContext) -> Result<ReconciliationReport, ReconcileError> {
    ctx.queue.pause_claims(true);
    let result = reconcile(ctx);
    ctx.queue.pause_claims(false);
    result
}

fn is_sweepable_name(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().ends_with(tp_engine::TMP_SUFFIX))
        .unwrap_or(false)
}

/// Unlink `*.tmp` files older than `max_age` anywhere under `root`.
pub(crate) fn sweep_tmp(root: &Path, max_age: Duration) {
    for entry in WalkDir::new(root).into_iter().flatten() {
        if !entry.file_type().is_file() || !is_sweepable_name(entry.path()) {
            continue;
        }
        let old_enough = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|mtime| mtime.elapsed().ok())
            .map(|age| age >= max_age)
            .unwrap_or(false);
        if old_enough {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => warn!(path = %entry.path().display(), "[SELF-HEAL] swept stray tmp file"),
                Err(e) => warn!(path = %entry.path().display(), error = %e, "tmp sweep failed"),
            }
        }
    }
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
