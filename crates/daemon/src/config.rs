// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed daemon configuration, validated at boot.
//!
//! Everything comes from environment variables (enumerated in `env.rs` and
//! here); an invalid configuration fails the boot before any component
//! starts.

use std::path::{Path, PathBuf};

use thiserror::Error;

use tp_engine::{EngineConfig, EngineFlavor, OutputFormat, WorkDirs};
use tp_queue::QueueConfig;

use crate::env;

pub const DEFAULT_SUPPORTED_FORMATS: &[&str] = &["mp3", "wav", "m4a", "flac", "ogg", "mp4", "mov"];

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is required")]
    Missing { name: &'static str },

    #[error("{name} must be an absolute path (got {path})")]
    NotAbsolute { name: &'static str, path: String },

    #[error("{name} looks like a foreign-OS path: {path}")]
    ForeignPath { name: &'static str, path: String },

    #[error("watch directory does not exist: {}", .0.display())]
    WatchMissing(PathBuf),

    #[error("directory {} is not accessible: {source}", .path.display())]
    Inaccessible {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid worker bounds: MIN_WORKERS={min} MAX_WORKERS={max}")]
    WorkerBounds { min: usize, max: usize },

    #[error("MIN_FILE_SIZE ({min} MB) exceeds MAX_FILE_SIZE ({max} MB)")]
    SizeBounds { min: u64, max: u64 },

    #[error("unknown engine flavor: {0}")]
    BadFlavor(String),

    #[error("unknown engine output format: {0}")]
    BadOutputFormat(String),

    #[error("could not determine state directory (set TP_STATE_DIR)")]
    NoStateDir,
}

/// Watcher tuning.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Recursion depth below the watch root (directories, default 3).
    pub max_depth: usize,
    /// A file's size must be unchanged this long to count as arrived.
    pub write_stability_ms: u64,
}

/// File acceptance rules shared by the watcher and the reconciler.
#[derive(Debug, Clone)]
pub struct IngestRules {
    pub supported_formats: Vec<String>,
    pub min_file_size_bytes: u64,
    pub max_file_size_bytes: u64,
}

impl IngestRules {
    pub fn supports_extension(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        self.supported_formats.iter().any(|f| f == &ext)
    }
}

/// Full daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub dirs: WorkDirs,
    pub state_dir: PathBuf,
    pub queue: QueueConfig,
    pub engine: EngineConfig,
    pub watch: WatchConfig,
    pub rules: IngestRules,
    pub http_host: String,
    pub http_port: u16,
    pub shutdown_timeout: std::time::Duration,
}

impl Config {
    /// Read and validate the full configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let watch = required_dir("WATCH_DIRECTORY")?;
        let output = required_dir("OUTPUT_DIRECTORY")?;
        let completed = required_dir("COMPLETED_DIRECTORY")?;
        let failed = required_dir("FAILED_DIRECTORY")?;

        // Watch must pre-exist; the others are created.
        if !watch.is_dir() {
            return Err(ConfigError::WatchMissing(watch));
        }
        for dir in [&output, &completed, &failed] {
            std::fs::create_dir_all(dir)
                .map_err(|e| ConfigError::Inaccessible { path: dir.clone(), source: e })?;
        }
        for dir in [&watch, &output, &completed, &failed] {
            probe_readable(dir)?;
        }
        for dir in [&output, &completed, &failed] {
            probe_writable(dir)?;
        }

        let queue = queue_config_from_env()?;
        let engine = engine_config_from_env()?;
        let rules = ingest_rules_from_env()?;

        let (http_host, http_port) = env::http_bind();
        let state_dir = env::state_dir().ok_or(ConfigError::NoStateDir)?;

        Ok(Self {
            dirs: WorkDirs { watch, output, completed, failed },
            state_dir,
            queue,
            engine,
            watch: WatchConfig {
                max_depth: env::parse_var("WATCH_MAX_DEPTH").unwrap_or(3),
                write_stability_ms: env::parse_var("WRITE_STABILITY_MS").unwrap_or(2_000),
            },
            rules,
            http_host,
            http_port,
            shutdown_timeout: env::shutdown_timeout(),
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.state_dir.join("wal/events.wal")
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.state_dir.join("state.snapshot")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("daemon.pid")
    }

    pub fn report_path(&self) -> PathBuf {
        self.state_dir.join("last_reconciliation.json")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }
}

fn required_dir(name: &'static str) -> Result<PathBuf, ConfigError> {
    let path = env::path_var(name).ok_or(ConfigError::Missing { name })?;
    validate_path_shape(name, &path)?;
    Ok(path)
}

/// Absolute, and not visibly from another OS family (a `C:\...` path on a
/// Unix host is a deployment mistake, not a directory).
fn validate_path_shape(name: &'static str, path: &Path) -> Result<(), ConfigError> {
    let display = path.display().to_string();
    let foreign = display.contains('\\')
        || display
            .as_bytes()
            .get(1)
            .map(|&b| b == b':' && display.as_bytes()[0].is_ascii_alphabetic())
            .unwrap_or(false);
    if foreign {
        return Err(ConfigError::ForeignPath { name, path: display });
    }
    if !path.is_absolute() {
        return Err(ConfigError::NotAbsolute { name, path: display });
    }
    Ok(())
}

fn probe_readable(dir: &Path) -> Result<(), ConfigError> {
    std::fs::read_dir(dir)
        .map(|_| ())
        .map_err(|e| ConfigError::Inaccessible { path: dir.to_path_buf(), source: e })
}

fn probe_writable(dir: &Path) -> Result<(), ConfigError> {
    let probe = dir.join(".palantir-write-probe");
    std::fs::write(&probe, b"probe")
        .and_then(|()| std::fs::remove_file(&probe))
        .map_err(|e| ConfigError::Inaccessible { path: dir.to_path_buf(), source: e })
}

fn queue_config_from_env() -> Result<QueueConfig, ConfigError> {
    let defaults = QueueConfig::default();

    let min_workers: usize = env::parse_var("MIN_WORKERS").unwrap_or(1);
    let max_workers: usize =
        env::parse_var("MAX_WORKERS").unwrap_or_else(|| min_workers.max(defaults.concurrency_limit));
    if min_workers < 1 || max_workers < min_workers {
        return Err(ConfigError::WorkerBounds { min: min_workers, max: max_workers });
    }

    let concurrency: usize = env::parse_var("CONCURRENCY_LIMIT")
        .unwrap_or(defaults.concurrency_limit)
        .clamp(min_workers, max_workers)
        .max(1);

    Ok(QueueConfig {
        concurrency_limit: concurrency,
        lock_duration_ms: env::parse_var("LOCK_DURATION").unwrap_or(defaults.lock_duration_ms),
        max_attempts: env::parse_var("MAX_JOB_ATTEMPTS").unwrap_or(defaults.max_attempts),
        stalled_interval_ms: env::parse_var("STALLED_INTERVAL")
            .unwrap_or(defaults.stalled_interval_ms),
        max_stalled_count: env::parse_var("MAX_STALLED_COUNT")
            .unwrap_or(defaults.max_stalled_count),
    })
}

fn engine_config_from_env() -> Result<EngineConfig, ConfigError> {
    let flavor = match env::var("ENGINE_FLAVOR") {
        Some(s) => EngineFlavor::parse(&s).ok_or(ConfigError::BadFlavor(s))?,
        None => EngineFlavor::FasterWhisper,
    };
    let output_format = match env::var("ENGINE_OUTPUT_FORMAT") {
        Some(s) => OutputFormat::parse(&s).ok_or(ConfigError::BadOutputFormat(s))?,
        None => OutputFormat::Txt,
    };

    Ok(EngineConfig {
        binary: env::path_var("ENGINE_BINARY").unwrap_or_else(|| PathBuf::from("whisper")),
        model: env::var("ENGINE_MODEL").unwrap_or_else(|| "base".to_string()),
        language: env::var("ENGINE_LANGUAGE"),
        task: env::var("ENGINE_TASK"),
        compute_type: env::var("ENGINE_COMPUTE_TYPE"),
        flavor,
        output_format,
    })
}

fn ingest_rules_from_env() -> Result<IngestRules, ConfigError> {
    const MB: u64 = 1024 * 1024;

    let supported_formats = env::var("SUPPORTED_FORMATS")
        .map(|csv| {
            csv.split(',')
                .map(|s| s.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_else(|| DEFAULT_SUPPORTED_FORMATS.iter().map(|s| s.to_string()).collect());

    // Sizes are configured in MB; 0 disables the lower bound.
    let min_mb: u64 = env::parse_var("MIN_FILE_SIZE").unwrap_or(0);
    let max_mb: u64 = env::parse_var("MAX_FILE_SIZE").unwrap_or(2_048);
    if min_mb > max_mb {
        return Err(ConfigError::SizeBounds { min: min_mb, max: max_mb });
    }

    Ok(IngestRules {
        supported_formats,
        min_file_size_bytes: min_mb * MB,
        max_file_size_bytes: max_mb * MB,
    })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
