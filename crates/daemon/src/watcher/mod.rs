// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbox watcher: notify events plus an initial scan, feeding the ingestion
//! pipeline.
//!
//! Detected files are never dropped silently — store failures retry with
//! exponential backoff until the file is ingested or disappears. Per-file
//! errors are logged and skipped; only an unreadable inbox at start is fatal.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecursiveMode, Watcher as _};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::ingest::IngestContext;

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const STABILITY_POLL: Duration = Duration::from_millis(500);
/// Give up waiting for a file to stop growing after this long; the next
/// modify event retries.
const STABILITY_DEADLINE: Duration = Duration::from_secs(120);
const BACKOFF_START: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// One inbox event after kind filtering.
#[derive(Debug, Clone)]
enum WatchSignal {
    Arrived(PathBuf),
    Removed(PathBuf),
}

/// Watcher errors
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("inbox is not readable: {0}")]
    InboxUnreadable(#[source] std::io::Error),

    #[error("filesystem watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// Start watching. Fails fast if the inbox cannot be read; afterwards the
/// returned task runs until `shutdown` is cancelled.
pub fn spawn_watcher(
    ctx: Arc<IngestContext>,
    shutdown: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>, WatchError> {
    let watch_root = ctx.config.dirs.watch.clone();
    std::fs::read_dir(&watch_root).map_err(WatchError::InboxUnreadable)?;

    let (tx, rx) = mpsc::channel::<WatchSignal>(EVENT_CHANNEL_CAPACITY);

    // The notify callback runs on notify's own thread; blocking_send is the
    // bridge into the async side.
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
        match result {
            Ok(event) => {
                let signal = match event.kind {
                    notify::EventKind::Create(_) | notify::EventKind::Modify(_) => {
                        WatchSignal::Arrived
                    }
                    notify::EventKind::Remove(_) => WatchSignal::Removed,
                    _ => return,
                };
                for path in event.paths {
                    if tx.blocking_send(signal(path)).is_err() {
                        return; // receiver gone: shutting down
                    }
                }
            }
            Err(e) => warn!(error = %e, "watch event error"),
        }
    })?;
    watcher.watch(&watch_root, RecursiveMode::Recursive)?;
    info!(inbox = %watch_root.display(), "watching inbox");

    Ok(tokio::spawn(watch_loop(ctx, watcher, rx, shutdown)))
}

async fn watch_loop(
    ctx: Arc<IngestContext>,
    _watcher: notify::RecommendedWatcher,
    mut rx: mpsc::Receiver<WatchSignal>,
    shutdown: CancellationToken,
) {
    initial_scan(&ctx, &shutdown).await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            signal = rx.recv() => match signal {
                Some(WatchSignal::Arrived(path)) => handle_candidate(&ctx, &path, false).await,
                Some(WatchSignal::Removed(path)) => handle_removal(&ctx, &path),
                None => break,
            },
        }
    }
    info!("watcher stopped");
}

/// A file left the inbox. If a pending job still points at it, fail it now
/// instead of letting a worker discover the hole later.
fn handle_removal(ctx: &Arc<IngestContext>, path: &Path) {
    if path.exists() {
        // Rename storms emit Remove+Create; the Create side handles it
        return;
    }
    let Some(job) = ctx.queue.active_job_for_path(path) else {
        return;
    };
    if job.status != tp_core::JobStatus::Pending {
        // Processing jobs legitimately leave the inbox when a worker
        // finalizes them
        return;
    }

    warn!(
        job_id = %job.id,
        path = %path.display(),
        "[SELF-HEAL] inbox file removed; failing its pending job"
    );
    if let Err(e) = ctx.queue.fail_phantom(&job.id) {
        warn!(job_id = %job.id, error = %e, "failed to fail phantom job");
    }
    if let Err(e) = ctx.tracker.unmark(path) {
        warn!(path = %path.display(), error = %e, "tracker unmark failed");
    }
}

/// Process pre-existing inbox files as if they had just arrived. The dedup
/// gate keeps restarts from double-enqueueing.
async fn initial_scan(ctx: &Arc<IngestContext>, shutdown: &CancellationToken) {
    let root = ctx.config.dirs.watch.clone();
    let max_depth = ctx.config.watch.max_depth;

    let mut found = 0usize;
    for entry in WalkDir::new(&root).max_depth(max_depth).into_iter().flatten() {
        if shutdown.is_cancelled() {
            return;
        }
        if entry.file_type().is_file() {
            found += 1;
            handle_candidate(ctx, entry.path(), true).await;
        }
    }
    info!(files = found, "initial inbox scan complete");
}

async fn handle_candidate(ctx: &Arc<IngestContext>, path: &Path, preexisting: bool) {
    if !within_depth(&ctx.config.dirs.watch, path, ctx.config.watch.max_depth) {
        debug!(path = %path.display(), "beyond max watch depth; ignoring");
        return;
    }
    if is_ignorable(path) {
        return;
    }

    let threshold = Duration::from_millis(ctx.config.watch.write_stability_ms);
    // Files that have sat in the inbox since before the threshold are
    // already stable; don't serialize 2s waits across a big initial scan.
    let needs_wait = !preexisting || modified_within(path, threshold);
    if needs_wait && !wait_write_stable(path, threshold).await {
        return;
    }

    ingest_with_backoff(ctx, path).await;
}

/// Retry ingestion until it succeeds or the file disappears. Store outages
/// must not drop detected files.
async fn ingest_with_backoff(ctx: &Arc<IngestContext>, path: &Path) {
    let mut backoff = BACKOFF_START;
    loop {
        match ctx.ingest_file(path) {
            Ok(_) => return,
            Err(e) => {
                if !path.exists() {
                    warn!(path = %path.display(), "file vanished during ingest retries");
                    return;
                }
                error!(path = %path.display(), error = %e, "ingest failed; retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(BACKOFF_CAP);
            }
        }
    }
}

/// Wait until the file size has been unchanged for `threshold`.
pub(crate) async fn wait_write_stable(path: &Path, threshold: Duration) -> bool {
    if threshold.is_zero() {
        return path.is_file();
    }

    let deadline = tokio::time::Instant::now() + STABILITY_DEADLINE;
    let mut last_size = match file_size(path) {
        Some(size) => size,
        None => return false,
    };
    let mut stable_for = Duration::ZERO;
    let poll = STABILITY_POLL.min(threshold);

    loop {
        tokio::time::sleep(poll).await;
        match file_size(path) {
            None => return false,
            Some(size) if size != last_size => {
                last_size = size;
                stable_for = Duration::ZERO;
            }
            Some(_) => {
                stable_for += poll;
                if stable_for >= threshold {
                    return true;
                }
            }
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(path = %path.display(), "file never stabilized; deferring to next event");
            return false;
        }
    }
}

fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().filter(|m| m.is_file()).map(|m| m.len())
}

fn modified_within(path: &Path, threshold: Duration) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|mtime| mtime.elapsed().ok())
        .map(|age| age < threshold)
        .unwrap_or(true)
}

/// Directory nesting below the watch root, counting the file itself.
/// `watch/a/b/x.mp3` is depth 3.
fn within_depth(root: &Path, path: &Path, max_depth: usize) -> bool {
    match path.strip_prefix(root) {
        Ok(rel) => rel.components().count() <= max_depth,
        Err(_) => false,
    }
}

/// Dotfiles and in-flight copy artifacts never enter the pipeline.
fn is_ignorable(path: &Path) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    name.starts_with('.') || name.ends_with(tp_engine::TMP_SUFFIX)
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
