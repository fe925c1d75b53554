// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tp-storage: durable storage for the job queue.
//!
//! Write-ahead log of [`tp_core::Event`]s plus periodic zstd-compressed
//! snapshots. State is materialized by replaying the WAL over the latest
//! snapshot.

mod snapshot;
mod state;
mod wal;

pub use snapshot::{
    load_snapshot, Checkpointer, CheckpointResult, Snapshot, SnapshotError,
    CURRENT_SNAPSHOT_VERSION,
};
pub use state::{MaterializedState, StatusCounts, TrackedFingerprint, TrackedPath};
pub use wal::{Wal, WalEntry, WalError};
