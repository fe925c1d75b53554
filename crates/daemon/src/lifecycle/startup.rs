// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage recovery and daemon initialization.

use std::fs::File;
use std::io::Write;

use fs2::FileExt;
use tracing::{info, warn};

use tp_core::SystemClock;
use tp_queue::JobQueue;
use tp_storage::{load_snapshot, Checkpointer, MaterializedState, Wal};

use crate::config::Config;

use super::LifecycleError;

/// Everything startup hands to the rest of boot.
pub struct Boot {
    pub queue: JobQueue<SystemClock>,
    pub checkpointer: Checkpointer,
    // NOTE(lifetime): held to maintain the exclusive lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
}

/// Recover state and build the queue. Order matters: lock first (prevents
/// two daemons sharing a state dir), then snapshot, then WAL replay.
pub fn startup(config: &Config) -> Result<Boot, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)
        .map_err(|e| LifecycleError::Io { path: config.state_dir.clone(), source: e })?;
    if let Some(parent) = config.wal_path().parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| LifecycleError::Io { path: parent.to_path_buf(), source: e })?;
    }

    // Acquire the lock before touching any state files. OpenOptions avoids
    // truncating a running daemon's PID before we hold the lock.
    let mut lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(config.lock_path())
        .map_err(|e| LifecycleError::Io { path: config.lock_path(), source: e })?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    lock_file
        .set_len(0)
        .and_then(|()| writeln!(lock_file, "{}", std::process::id()))
        .map_err(|e| LifecycleError::Io { path: config.lock_path(), source: e })?;

    // Snapshot is an optimization: if it is corrupt, the on-disk layout is
    // still authoritative and reconciliation rebuilds what matters.
    let (mut state, processed_seq) = match load_snapshot(&config.snapshot_path()) {
        Ok(Some(snapshot)) => {
            info!(seq = snapshot.seq, jobs = snapshot.state.jobs.len(), "loaded snapshot");
            (snapshot.state, snapshot.seq)
        }
        Ok(None) => {
            info!("no snapshot found, starting with empty state");
            (MaterializedState::default(), 0)
        }
        Err(e) => {
            warn!(error = %e, "snapshot unreadable; rebuilding from WAL and disk");
            (MaterializedState::default(), 0)
        }
    };

    let wal = Wal::open(&config.wal_path(), processed_seq)?;
    let to_replay = wal.entries_after(processed_seq)?;
    let replayed = to_replay.len();
    for entry in to_replay {
        state.apply_event(&entry.event);
    }
    if replayed > 0 {
        info!(replayed, after_seq = processed_seq, "replayed WAL events");
    }

    let counts = state.count_by_status();
    info!(
        pending = counts.pending,
        processing = counts.processing,
        completed = counts.completed,
        failed = counts.failed,
        "recovered state"
    );

    let queue = JobQueue::new(state, wal, SystemClock, config.queue.clone());
    let checkpointer = Checkpointer::new(config.snapshot_path());

    Ok(Boot { queue, checkpointer, lock_file })
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
