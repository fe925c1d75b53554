// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The ingestion pipeline: sanitize → validate → dedup → classify → enqueue.
//!
//! Shared by the file watcher (live events and the initial scan) and the
//! reconciler (orphan inbox files), so every file enters the queue through
//! the same rules regardless of how it was discovered.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use tp_core::{JobMetadata, Priority, SystemClock};
use tp_queue::{fingerprint_for, FileTracker, JobQueue, NewJob, QueueError};

use crate::config::{Config, IngestRules};

/// What happened to one candidate file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A job was created.
    Enqueued { id: tp_core::JobId, sanitized: bool },
    /// The tracker or the queue already knows this file.
    SkippedDuplicate,
    /// Validation rejected the file (logged; not an error).
    SkippedInvalid,
}

/// Shared dependencies for ingestion.
pub struct IngestContext {
    pub queue: JobQueue<SystemClock>,
    pub tracker: FileTracker<SystemClock>,
    pub config: std::sync::Arc<Config>,
}

impl IngestContext {
    pub fn new(queue: JobQueue<SystemClock>, config: std::sync::Arc<Config>) -> Self {
        let tracker = queue.tracker();
        Self { queue, tracker, config }
    }

    /// Run the full pipeline for one file.
    ///
    /// Validation failures and duplicates are outcomes, not errors; only a
    /// store failure surfaces as `Err` so the caller can decide between
    /// backoff (watcher) and abort (reconciler boot).
    pub fn ingest_file(&self, path: &Path) -> Result<IngestOutcome, QueueError> {
        let original_name = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => return Ok(IngestOutcome::SkippedInvalid),
        };

        // 1. Sanitize the name, renaming in place when it changes.
        let sanitized_name = sanitize_file_name(&original_name);
        let (path, sanitized) = if sanitized_name != original_name {
            let renamed = path.with_file_name(&sanitized_name);
            if let Err(e) = std::fs::rename(path, &renamed) {
                warn!(path = %path.display(), error = %e, "failed to sanitize-rename; skipping");
                return Ok(IngestOutcome::SkippedInvalid);
            }
            debug!(from = %original_name, to = %sanitized_name, "sanitized file name");
            (renamed, true)
        } else {
            (path.to_path_buf(), false)
        };

        // 2. Validate.
        let size = match validate(&path, &self.config.rules) {
            Ok(size) => size,
            Err(reason) => {
                warn!(path = %path.display(), reason, "rejecting file");
                return Ok(IngestOutcome::SkippedInvalid);
            }
        };

        // 3. Dedup gate.
        if self.tracker.is_processed(&path) {
            debug!(path = %path.display(), "already processed; skipping");
            return Ok(IngestOutcome::SkippedDuplicate);
        }

        // 4. Classify and enqueue.
        let priority = Priority::for_size_bytes(size);
        let relative_path = path
            .parent()
            .and_then(|p| p.strip_prefix(&self.config.dirs.watch).ok())
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        let new_job = NewJob {
            file_path: path.clone(),
            relative_path,
            file_name: sanitized_name.clone(),
            original_file_name: original_name,
            file_size_bytes: size,
            mime_type: mime_type_for(&extension).to_string(),
            audio_format: extension,
            priority,
            fingerprint: fingerprint_for(&path),
            metadata: JobMetadata {
                model: self.config.engine.model.clone(),
                language: self.config.engine.language.clone(),
                task: self.config.engine.task.clone(),
                context: Default::default(),
            },
        };

        let id = match self.queue.enqueue(new_job) {
            Ok(id) => id,
            Err(QueueError::DuplicatePath(_)) => {
                debug!(path = %path.display(), "active job exists; skipping");
                return Ok(IngestOutcome::SkippedDuplicate);
            }
            Err(e) => return Err(e),
        };

        // 5. Mark processed. Losing the mark is tolerable (fail-open dedup):
        // the queue's duplicate-path guard backstops it.
        if let Err(e) = self.tracker.mark_processed(&path, id) {
            warn!(path = %path.display(), error = %e, "tracker mark failed; dedup degraded");
        }

        tracing::info!(
            job_id = %id,
            file = %path.display(),
            priority = %priority,
            size_bytes = size,
            "file ingested"
        );
        Ok(IngestOutcome::Enqueued { id, sanitized })
    }
}

/// Replace anything outside the whitelist (ASCII alphanumerics, `_`, `-`,
/// `.`) with `_`, neutralize traversal sequences, and collapse the
/// underscore runs this produces. `My Notes 📝.mp3` → `My_Notes_.mp3`.
pub fn sanitize_file_name(name: &str) -> String {
    // ".." must not survive even though '.' itself is allowed
    let mut cleaned = name.to_string();
    while cleaned.contains("..") {
        cleaned = cleaned.replace("..", "_");
    }

    let mapped: String = cleaned
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    // Collapse runs of underscores left by multi-byte characters and spaces
    let mut out = String::with_capacity(mapped.len());
    let mut last_underscore = false;
    for c in mapped.chars() {
        if c == '_' {
            if !last_underscore {
                out.push(c);
            }
            last_underscore = true;
        } else {
            out.push(c);
            last_underscore = false;
        }
    }
    out
}

/// Regular file, supported extension, size within bounds. Returns the size.
fn validate(path: &Path, rules: &IngestRules) -> Result<u64, &'static str> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(_) => return Err("cannot stat file"),
    };
    if !meta.is_file() {
        return Err("not a regular file");
    }

    let extension = match path.extension() {
        Some(ext) => ext.to_string_lossy().to_ascii_lowercase(),
        None => return Err("no file extension"),
    };
    if !rules.supports_extension(&extension) {
        return Err("unsupported format");
    }

    let size = meta.len();
    if size < rules.min_file_size_bytes {
        return Err("below minimum file size");
    }
    if size > rules.max_file_size_bytes {
        return Err("above maximum file size");
    }
    Ok(size)
}

pub fn mime_type_for(extension: &str) -> &'static str {
    match extension {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
#[path = "ingest_tests.rs"]
mod tests;
