// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for this crate's test suites.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tp_core::{FakeClock, JobMetadata, Priority};
use tp_storage::{MaterializedState, Wal};

use crate::queue::{JobQueue, NewJob, QueueConfig};

pub(crate) fn test_queue_with(config: QueueConfig) -> (JobQueue<FakeClock>, FakeClock, TempDir) {
    let dir = TempDir::new().unwrap();
    let wal = Wal::open(&dir.path().join("events.wal"), 0).unwrap();
    let clock = FakeClock::at(1_000_000);
    let queue = JobQueue::new(MaterializedState::default(), wal, clock.clone(), config);
    (queue, clock, dir)
}

pub(crate) fn test_queue() -> (JobQueue<FakeClock>, FakeClock, TempDir) {
    test_queue_with(QueueConfig::default())
}

pub(crate) fn new_job(path: &str, priority: Priority) -> NewJob {
    let path = PathBuf::from(path);
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    NewJob {
        relative_path: path
            .parent()
            .and_then(|p| p.strip_prefix("/watch").ok())
            .map(Path::to_path_buf)
            .unwrap_or_default(),
        file_name: file_name.clone(),
        original_file_name: file_name,
        file_size_bytes: 5 * 1024 * 1024,
        mime_type: "audio/mpeg".into(),
        audio_format: "mp3".into(),
        priority,
        fingerprint: format!("fp:{}", path.display()),
        metadata: JobMetadata::default(),
        file_path: path,
    }
}
