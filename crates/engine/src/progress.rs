// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine stderr parsing: progress lines and failure classification.

use std::sync::OnceLock;

use regex::Regex;

// Tolerant of the engine's exact spacing; see the subprocess contract.
#[allow(clippy::unwrap_used)]
fn progress_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)progress\s*=\s*(\d+)\s*%").unwrap())
}

/// Extract a progress percentage from one stderr line.
///
/// Values are capped at 99 — 100 is only reached through a successful exit.
/// Absence of progress lines merely disables progress reporting.
pub fn parse_progress(line: &str) -> Option<u8> {
    let caps = progress_re().captures(line)?;
    let value: u32 = caps.get(1)?.as_str().parse().ok()?;
    Some(value.min(99) as u8)
}

/// Heuristic: does this stderr output describe a broken input file rather
/// than an engine fault?
pub fn looks_like_decode_failure(stderr_tail: &str) -> bool {
    let lower = stderr_tail.to_ascii_lowercase();
    const MARKERS: &[&str] = &[
        "invalid data",
        "failed to decode",
        "could not decode",
        "failed to load audio",
        "unsupported format",
        "error opening input",
        "corrupt",
    ];
    MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;
