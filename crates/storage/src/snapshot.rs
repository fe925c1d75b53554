// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State snapshots: zstd-compressed JSON checkpoints of materialized state.
//!
//! A snapshot records the WAL sequence it covers; recovery loads the snapshot
//! and replays only the WAL entries after that sequence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::state::MaterializedState;

/// Bump when the snapshot payload changes incompatibly.
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

const ZSTD_LEVEL: i32 = 3;

/// Snapshot errors
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("snapshot version {found} not supported (current: {current})")]
    VersionMismatch { found: u32, current: u32 },
}

/// A point-in-time copy of materialized state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    /// WAL sequence this snapshot covers (inclusive).
    pub seq: u64,
    pub state: MaterializedState,
}

/// Result of a successful checkpoint.
#[derive(Debug, Clone, Copy)]
pub struct CheckpointResult {
    pub seq: u64,
    pub size_bytes: u64,
}

/// Load the snapshot at `path`. Missing file is not an error.
pub fn load_snapshot(path: &Path) -> Result<Option<Snapshot>, SnapshotError> {
    let compressed = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let bytes = zstd::decode_all(compressed.as_slice())?;
    let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
    if snapshot.version != CURRENT_SNAPSHOT_VERSION {
        return Err(SnapshotError::VersionMismatch {
            found: snapshot.version,
            current: CURRENT_SNAPSHOT_VERSION,
        });
    }
    Ok(Some(snapshot))
}

/// Writes snapshots atomically (temp file + rename).
pub struct Checkpointer {
    path: PathBuf,
}

impl Checkpointer {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Write a snapshot covering WAL sequence `seq`.
    pub fn checkpoint_sync(
        &self,
        seq: u64,
        state: &MaterializedState,
    ) -> Result<CheckpointResult, SnapshotError> {
        let snapshot =
            Snapshot { version: CURRENT_SNAPSHOT_VERSION, seq, state: state.clone() };
        let bytes = serde_json::to_vec(&snapshot)?;
        let compressed = zstd::encode_all(bytes.as_slice(), ZSTD_LEVEL)?;

        let tmp = self.path.with_extension("snapshot.tmp");
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&tmp, &compressed)?;
        std::fs::rename(&tmp, &self.path)?;

        debug!(seq, size_bytes = compressed.len(), "snapshot written");
        Ok(CheckpointResult { seq, size_bytes: compressed.len() as u64 })
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
