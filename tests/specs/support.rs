// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared end-to-end fixtures: a full daemon stack (queue over a real WAL,
//! ingestion, worker pool, HTTP router) around a scripted engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use tp_core::{Job, JobId, SystemClock};
use tp_daemon::api::{router, AppState};
use tp_daemon::config::{Config, IngestRules, WatchConfig};
use tp_daemon::ingest::IngestContext;
use tp_engine::{
    EngineConfig, EngineFlavor, OutputFormat, ProcessEngine, WorkDirs, WorkerPool,
};
use tp_queue::{JobQueue, QueueConfig};
use tp_storage::{MaterializedState, Wal};

pub struct World {
    pub root: TempDir,
    pub config: Arc<Config>,
    pub queue: JobQueue<SystemClock>,
    pub ingest: Arc<IngestContext>,
    pub engine: Arc<ProcessEngine>,
}

/// A fake engine script body that emits progress and writes a transcript.
pub const WELL_BEHAVED_ENGINE: &str = r#"
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
echo "progress = 25%" >&2
echo "progress = 75%" >&2
printf 'transcript of %s' "$base" > "$out/$stem.txt"
exit 0
"#;

impl World {
    pub fn new(engine_body: &str) -> Self {
        Self::with_queue_config(engine_body, QueueConfig::default())
    }

    pub fn with_queue_config(engine_body: &str, queue_config: QueueConfig) -> Self {
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
        let state_dir = root.path().join("state");
        std::fs::create_dir_all(&state_dir).unwrap();

        let engine_path = root.path().join("engine.sh");
        write_script(&engine_path, engine_body);

        let engine_config = EngineConfig {
            binary: engine_path,
            model: "base".into(),
            language: None,
            task: None,
            compute_type: None,
            flavor: EngineFlavor::FasterWhisper,
            output_format: OutputFormat::Txt,
        };

        let config = Arc::new(Config {
            dirs,
            state_dir,
            queue: queue_config.clone(),
            engine: engine_config.clone(),
            watch: WatchConfig { max_depth: 3, write_stability_ms: 0 },
            rules: IngestRules {
                supported_formats: vec!["mp3".into(), "wav".into()],
                min_file_size_bytes: 0,
                max_file_size_bytes: 500 * 1024 * 1024,
            },
            http_host: "127.0.0.1".into(),
            http_port: 0,
            shutdown_timeout: Duration::from_secs(60),
        });

        let queue = open_queue(&config, queue_config);
        let ingest = Arc::new(IngestContext::new(queue.clone(), Arc::clone(&config)));
        let engine = Arc::new(ProcessEngine::new(engine_config));

        Self { root, config, queue, ingest, engine }
    }

    /// Reopen the same state directory, as a restarted daemon would:
    /// snapshot (none in these tests) + WAL replay.
    pub fn reopen(&self) -> (JobQueue<SystemClock>, Arc<IngestContext>) {
        let queue = open_queue(&self.config, self.config.queue.clone());
        let ingest = Arc::new(IngestContext::new(queue.clone(), Arc::clone(&self.config)));
        (queue, ingest)
    }

    pub fn drop_audio(&self, rel: &str, name: &str) -> PathBuf {
        let dir = self.config.dirs.watch.join(rel);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, format!("audio bytes of {name}")).unwrap();
        path
    }

    pub fn start_pool(&self, size: usize) -> (WorkerPool, CancellationToken) {
        self.start_pool_on(size, &self.queue)
    }

    pub fn start_pool_on(
        &self,
        size: usize,
        queue: &JobQueue<SystemClock>,
    ) -> (WorkerPool, CancellationToken) {
        let shutdown = CancellationToken::new();
        let pool = WorkerPool::spawn(
            size,
            queue.clone(),
            self.engine.clone(),
            self.config.dirs.clone(),
            shutdown.clone(),
        );
        (pool, shutdown)
    }

    pub fn api(&self) -> axum::Router {
        let state = AppState::new(Arc::clone(&self.ingest), self.engine.clone(), None);
        state.mark_ready();
        router(state)
    }

    pub async fn wait_until_terminal(&self, queue: &JobQueue<SystemClock>, id: &JobId) -> Job {
        tokio::time::timeout(Duration::from_secs(15), async {
            loop {
                let job = queue.get(id).unwrap();
                if job.is_terminal() {
                    return job;
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        })
        .await
        .expect("job did not reach a terminal state in time")
    }
}

fn open_queue(config: &Config, queue_config: QueueConfig) -> JobQueue<SystemClock> {
    std::fs::create_dir_all(config.wal_path().parent().unwrap()).unwrap();
    let wal = Wal::open(&config.wal_path(), 0).unwrap();
    let mut state = MaterializedState::default();
    for entry in wal.entries_after(0).unwrap() {
        state.apply_event(&entry.event);
    }
    JobQueue::new(state, wal, SystemClock, queue_config)
}

pub fn write_script(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}
