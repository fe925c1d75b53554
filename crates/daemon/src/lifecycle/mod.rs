// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: startup recovery, boot reconciliation, shutdown.

mod reconcile;
mod startup;

pub use reconcile::{reconcile, reconcile_paused, ReconcileError, ReconciliationReport};
pub use startup::{startup, Boot};

use std::path::PathBuf;

use thiserror::Error;

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("WAL error: {0}")]
    Wal(#[from] tp_storage::WalError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] tp_storage::SnapshotError),

    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
