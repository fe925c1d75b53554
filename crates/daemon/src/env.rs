// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

/// Daemon version reported by the API.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

pub fn path_var(name: &str) -> Option<PathBuf> {
    var(name).map(PathBuf::from)
}

pub fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    var(name).and_then(|s| s.parse().ok())
}

/// Resolve state directory: TP_STATE_DIR > XDG_STATE_HOME/palantir >
/// ~/.local/state/palantir
pub fn state_dir() -> Option<PathBuf> {
    if let Some(dir) = path_var("TP_STATE_DIR") {
        return Some(dir);
    }
    if let Some(xdg) = path_var("XDG_STATE_HOME") {
        return Some(xdg.join("palantir"));
    }
    dirs::home_dir().map(|home| home.join(".local/state/palantir"))
}

/// Global shutdown deadline (default 60s, `SHUTDOWN_TIMEOUT_MS`).
pub fn shutdown_timeout() -> Duration {
    Duration::from_millis(parse_var("SHUTDOWN_TIMEOUT_MS").unwrap_or(60_000))
}

/// HTTP bind address (default 0.0.0.0:8080).
pub fn http_bind() -> (String, u16) {
    let host = var("HTTP_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
    let port = parse_var("HTTP_PORT").unwrap_or(8080);
    (host, port)
}

/// Checkpoint cadence for the background snapshot task (default 60s).
pub fn checkpoint_interval() -> Duration {
    Duration::from_millis(parse_var("CHECKPOINT_INTERVAL_MS").unwrap_or(60_000))
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
