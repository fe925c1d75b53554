// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Machine-readable failure taxonomy for job records.

use serde::{Deserialize, Serialize};

/// Error codes recorded on failed jobs.
///
/// Every non-transient failure carries one of these plus a human-readable
/// reason string. Serialized in `ERR_<CATEGORY>_<DETAIL>` form for API parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Engine binary absent or not executable.
    #[serde(rename = "ERR_ENGINE_NOT_FOUND")]
    EngineNotFound,
    /// Engine exited with a non-zero code.
    #[serde(rename = "ERR_ENGINE_CRASH")]
    EngineCrash,
    /// Engine reported success but the expected output file was not found.
    #[serde(rename = "ERR_OUTPUT_MISSING")]
    OutputMissing,
    /// Decode/format failure reported by the engine.
    #[serde(rename = "ERR_FILE_INVALID")]
    FileInvalid,
    /// Source file disappeared between enqueue and processing.
    #[serde(rename = "ERR_FILE_MISSING")]
    FileMissing,
    /// Exceeded the stall budget without completing.
    #[serde(rename = "ERR_JOB_STALLED")]
    JobStalled,
    /// Persistent store read/write failure.
    #[serde(rename = "ERR_STORE_UNAVAILABLE")]
    StoreUnavailable,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::EngineNotFound => "ERR_ENGINE_NOT_FOUND",
            ErrorCode::EngineCrash => "ERR_ENGINE_CRASH",
            ErrorCode::OutputMissing => "ERR_OUTPUT_MISSING",
            ErrorCode::FileInvalid => "ERR_FILE_INVALID",
            ErrorCode::FileMissing => "ERR_FILE_MISSING",
            ErrorCode::JobStalled => "ERR_JOB_STALLED",
            ErrorCode::StoreUnavailable => "ERR_STORE_UNAVAILABLE",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
