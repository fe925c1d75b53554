// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixtures for worker/pool tests: a scripted fake engine and a managed
//! directory tree, the way the real daemon lays one out.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tp_core::{JobMetadata, Priority, SystemClock};
use tp_queue::{JobQueue, NewJob, QueueConfig};
use tp_storage::{MaterializedState, Wal};

use crate::adapter::{EngineConfig, EngineFlavor, OutputFormat, ProcessEngine};
use crate::worker::WorkDirs;

pub(crate) struct Harness {
    pub root: TempDir,
    pub dirs: WorkDirs,
    pub queue: JobQueue<SystemClock>,
}

impl Harness {
    pub fn new(config: QueueConfig) -> Self {
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
        let queue = JobQueue::new(MaterializedState::default(), wal, SystemClock, config);
        Self { root, dirs, queue }
    }

    /// Drop an audio file into `watch/<rel>/<name>` and enqueue it.
    pub fn ingest(&self, rel: &str, name: &str) -> tp_core::JobId {
        let dir = self.dirs.watch.join(rel);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, b"fake audio bytes").unwrap();

        self.queue
            .enqueue(NewJob {
                file_path: path,
                relative_path: PathBuf::from(rel),
                file_name: name.to_string(),
                original_file_name: name.to_string(),
                file_size_bytes: 16,
                mime_type: "audio/mpeg".into(),
                audio_format: "mp3".into(),
                priority: Priority::Urgent,
                fingerprint: format!("fp:{rel}/{name}"),
                metadata: JobMetadata::default(),
            })
            .unwrap()
    }

    /// Install a `#!/bin/sh` fake engine and return it configured like the
    /// real faster-whisper CLI.
    pub fn script_engine(&self, body: &str) -> Arc<ProcessEngine> {
        let path = self.root.path().join("fake-engine.sh");
        write_script(&path, body);
        Arc::new(ProcessEngine::new(EngineConfig {
            binary: path,
            model: "base".into(),
            language: None,
            task: None,
            compute_type: None,
            flavor: EngineFlavor::FasterWhisper,
            output_format: OutputFormat::Txt,
        }))
    }
}

pub(crate) fn write_script(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}

/// Script prologue that extracts `$1` (input) and `--output_dir` into
/// `$in` / `$out`, and the input stem into `$stem`.
pub(crate) const PARSE_ARGS: &str = r#"
in="$1"; shift
out="."
while [ $# -gt 0 ]; do
  case "$1" in
    --output_dir) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
base=$(basename "$in")
stem="${base%.*}"
"#;
