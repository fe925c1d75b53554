// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for this crate's test suites.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use tp_core::SystemClock;
use tp_engine::{EngineConfig, EngineFlavor, OutputFormat, WorkDirs};
use tp_queue::{JobQueue, QueueConfig};
use tp_storage::{MaterializedState, Wal};

use crate::config::{Config, IngestRules, WatchConfig};
use crate::ingest::IngestContext;

/// A queue over a temp WAL plus a managed directory tree with a near-zero
/// stability threshold.
pub(crate) fn test_context() -> (IngestContext, TempDir) {
    test_context_with(QueueConfig::default())
}

pub(crate) fn test_context_with(queue_config: QueueConfig) -> (IngestContext, TempDir) {
    let root = TempDir::new().unwrap();
    let dirs = WorkDirs {
        watch: root.path().join("watch"),
        output: root.path().join("output"),
        completed: root.path().join("completed"),
        failed: root.path().join("failed"),
    };
    for dir in [&dirs.watch, &dirs.output, &dirs.completed, &dirs.failed] {
        std::fs::create_dir_all(dir).unwrap();
    }

    let wal = Wal::open(&root.path().join("events.wal"), 0).unwrap();
    let queue =
        JobQueue::new(MaterializedState::default(), wal, SystemClock, queue_config.clone());

    let config = Config {
        dirs,
        state_dir: root.path().join("state"),
        queue: queue_config,
        engine: EngineConfig {
            binary: PathBuf::from("/nonexistent/whisper"),
            model: "base".into(),
            language: Some("en".into()),
            task: None,
            compute_type: None,
            flavor: EngineFlavor::FasterWhisper,
            output_format: OutputFormat::Txt,
        },
        watch: WatchConfig { max_depth: 3, write_stability_ms: 0 },
        rules: IngestRules {
            supported_formats: vec!["mp3".into(), "wav".into()],
            min_file_size_bytes: 0,
            max_file_size_bytes: 100 * 1024 * 1024,
        },
        http_host: "127.0.0.1".into(),
        http_port: 0,
        shutdown_timeout: std::time::Duration::from_secs(60),
    };
    std::fs::create_dir_all(config.state_dir.clone()).unwrap();

    (IngestContext::new(queue, Arc::new(config)), root)
}

pub(crate) fn drop_file(ctx: &IngestContext, rel: &str, name: &str, bytes: u64) -> PathBuf {
    let dir = ctx.config.dirs.watch.join(rel);
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let file = std::fs::File::create(&path).unwrap();
    file.set_len(bytes).unwrap();
    path
}
