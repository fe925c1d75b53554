// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed-size worker pool.
//!
//! N workers share one queue handle; the queue's claim path is what actually
//! bounds concurrency, so the pool size and the concurrency limit are the
//! same knob.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use tp_core::Clock;
use tp_queue::JobQueue;

use crate::adapter::TranscriptionEngine;
use crate::worker::{run_worker, WorkDirs, WorkerContext};

/// Handle over the spawned workers.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Spawn `size` workers. `shutdown` is shared: cancelling it stops all
    /// claims; in-flight subprocesses finish and report first.
    pub fn spawn<C: Clock>(
        size: usize,
        queue: JobQueue<C>,
        engine: Arc<dyn TranscriptionEngine>,
        dirs: WorkDirs,
        shutdown: CancellationToken,
    ) -> Self {
        let handles = (0..size)
            .map(|worker_id| {
                let ctx = WorkerContext {
                    worker_id,
                    queue: queue.clone(),
                    engine: Arc::clone(&engine),
                    dirs: dirs.clone(),
                    shutdown: shutdown.clone(),
                };
                tokio::spawn(run_worker(ctx))
            })
            .collect();
        info!(size, "worker pool started");
        Self { handles, shutdown }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Signal shutdown and wait for every worker to drain.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("worker pool drained");
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
