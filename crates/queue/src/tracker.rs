// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent dedup index over ingested files (C1).
//!
//! Two views of the same store: by absolute path (30-day TTL) and by content
//! fingerprint (permanent). Lookups fail open — if the fingerprint cannot be
//! computed the file is allowed through, and the queue's duplicate-path guard
//! is the backstop.

use std::path::Path;
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};
use tracing::debug;

use tp_core::{Clock, Event, JobId};

use crate::queue::{JobQueue, QueueError};

/// Path entries older than this are ignored on read. Fingerprint entries
/// never expire.
pub const PATH_TTL_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// Content fingerprint: `sha256("{path}:{size}:{mtime_nanos}")`, falling back
/// to `sha256(path)` when the file cannot be stat'ed.
pub fn fingerprint_for(path: &Path) -> String {
    let mut hasher = Sha256::new();
    match std::fs::metadata(path) {
        Ok(meta) => {
            let mtime_nanos = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_nanos())
                .unwrap_or(0);
            hasher.update(format!("{}:{}:{}", path.display(), meta.len(), mtime_nanos));
        }
        Err(_) => {
            hasher.update(path.display().to_string());
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Handle over the queue's store exposing the dedup operations.
pub struct FileTracker<C: Clock> {
    queue: JobQueue<C>,
}

impl<C: Clock> Clone for FileTracker<C> {
    fn clone(&self) -> Self {
        Self { queue: self.queue.clone() }
    }
}

impl<C: Clock> FileTracker<C> {
    pub(crate) fn new(queue: JobQueue<C>) -> Self {
        Self { queue }
    }

    /// True if this path (fresh entry) or this content (any age) was already
    /// ingested.
    pub fn is_processed(&self, path: &Path) -> bool {
        let now = self.queue.clock().epoch_ms();
        let fingerprint = fingerprint_for(path);
        self.queue.with_state(|state| {
            if let Some(entry) = state.processed_paths.get(path) {
                if now.saturating_sub(entry.processed_at_ms) <= PATH_TTL_MS {
                    return true;
                }
            }
            state.processed_fingerprints.contains_key(&fingerprint)
        })
    }

    /// Record both indexes for an ingested file.
    pub fn mark_processed(&self, path: &Path, job_id: JobId) -> Result<(), QueueError> {
        let now = self.queue.clock().epoch_ms();
        let fingerprint = fingerprint_for(path);
        debug!(path = %path.display(), job_id = %job_id, "tracker mark");
        self.queue.with_state(|state| {
            self.queue.commit_locked(
                state,
                vec![Event::TrackerMarked {
                    path: path.to_path_buf(),
                    fingerprint,
                    job_id,
                    at_ms: now,
                }],
                vec![],
            )
        })
    }

    /// Forget a file so it can be re-ingested (terminal failure re-runs,
    /// job deletion).
    pub fn unmark(&self, path: &Path) -> Result<(), QueueError> {
        self.queue.with_state(|state| {
            // Prefer the recorded fingerprint: the file may have changed or
            // vanished since it was marked.
            let fingerprint = state
                .processed_paths
                .get(path)
                .map(|e| e.fingerprint.clone())
                .unwrap_or_else(|| fingerprint_for(path));
            self.queue.commit_locked(
                state,
                vec![Event::TrackerUnmarked { path: path.to_path_buf(), fingerprint }],
                vec![],
            )
        })
    }
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
