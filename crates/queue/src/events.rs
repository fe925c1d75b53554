// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscriber-facing queue events.
//!
//! A thin, lossy-for-slow-readers broadcast layer over committed transitions.
//! Everything here has already been acknowledged by the store; a subscriber
//! that lags simply misses intermediate progress ticks, never state.

use serde::Serialize;
use tp_core::{ErrorCode, JobId};

/// Notifications emitted after a transition commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum QueueEvent {
    /// A worker claimed the job.
    Active { id: JobId },
    /// Progress within the current attempt.
    Progress { id: JobId, percent: u8 },
    Completed { id: JobId },
    Failed { id: JobId, code: ErrorCode },
    /// The stall sweeper hit an expired lease.
    Stalled { id: JobId, stall_count: u32 },
}

impl QueueEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            QueueEvent::Active { id }
            | QueueEvent::Progress { id, .. }
            | QueueEvent::Completed { id }
            | QueueEvent::Failed { id, .. }
            | QueueEvent::Stalled { id, .. } => *id,
        }
    }
}
