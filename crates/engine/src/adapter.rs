// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Adapter around the external transcription engine binary.
//!
//! The engine is a subprocess with a CLI contract: exit 0 on success, write
//! `<stem>.txt` (or `.json`) under the given output directory, and optionally
//! emit `progress = NN%` lines on stderr. Argument shape differs per flavor.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, Command};

use tp_core::JobMetadata;

/// Engine invocation errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine binary not found or not executable: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to spawn engine: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("engine io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which CLI dialect the configured binary speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineFlavor {
    /// whisper.cpp `main`: `-m model -f input -otxt -of <out-stem>`
    WhisperCpp,
    /// faster-whisper/ctranslate2 CLI: `input --model m --output_dir d ...`
    FasterWhisper,
}

impl EngineFlavor {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "whisper-cpp" | "whisper.cpp" | "whispercpp" => Some(EngineFlavor::WhisperCpp),
            "faster-whisper" | "fasterwhisper" => Some(EngineFlavor::FasterWhisper),
            _ => None,
        }
    }
}

/// Transcript serialization the engine is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Txt,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Txt => "txt",
            OutputFormat::Json => "json",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "txt" | "text" => Some(OutputFormat::Txt),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

/// Static engine configuration from the environment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub binary: PathBuf,
    pub model: String,
    pub language: Option<String>,
    pub task: Option<String>,
    pub compute_type: Option<String>,
    pub flavor: EngineFlavor,
    pub output_format: OutputFormat,
}

impl EngineConfig {
    /// Resolve the binary: absolute/relative paths checked directly,
    /// bare names searched on PATH.
    pub fn resolve_binary(&self) -> Option<PathBuf> {
        if self.binary.components().count() > 1 || self.binary.is_absolute() {
            return self.binary.is_file().then(|| self.binary.clone());
        }
        let path_var = std::env::var_os("PATH")?;
        std::env::split_paths(&path_var)
            .map(|dir| dir.join(&self.binary))
            .find(|candidate| candidate.is_file())
    }
}

/// A running engine subprocess with its stderr line stream split out.
pub struct EngineChild {
    child: Child,
    stderr: Option<Lines<BufReader<ChildStderr>>>,
}

impl EngineChild {
    /// Take the stderr line stream (once).
    pub fn take_stderr(&mut self) -> Option<Lines<BufReader<ChildStderr>>> {
        self.stderr.take()
    }

    /// Wait for the subprocess to exit.
    pub async fn wait(&mut self) -> Result<std::process::ExitStatus, EngineError> {
        Ok(self.child.wait().await?)
    }

    /// Force-kill the subprocess (shutdown deadline exceeded).
    pub async fn kill(&mut self) -> Result<(), EngineError> {
        Ok(self.child.kill().await?)
    }
}

/// Seam between the worker pool and the engine binary.
#[async_trait]
pub trait TranscriptionEngine: Send + Sync + 'static {
    /// Can the engine run right now? Surfaced by `/health/detailed`.
    fn is_available(&self) -> bool;

    /// Human-readable identity for health output.
    fn describe(&self) -> String;

    /// Where the engine will write its transcript for `input`.
    fn expected_output(&self, input: &Path, output_dir: &Path) -> PathBuf;

    /// Spawn a transcription run. stdin is null; stdout/stderr piped.
    async fn spawn(
        &self,
        input: &Path,
        output_dir: &Path,
        metadata: &JobMetadata,
    ) -> Result<EngineChild, EngineError>;
}

/// The real subprocess-backed engine.
pub struct ProcessEngine {
    config: EngineConfig,
}

impl ProcessEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Model selection: per-job metadata wins over static config.
    fn model_for(&self, metadata: &JobMetadata) -> String {
        if metadata.model.is_empty() {
            self.config.model.clone()
        } else {
            metadata.model.clone()
        }
    }

    fn language_for<'a>(&'a self, metadata: &'a JobMetadata) -> Option<&'a str> {
        metadata.language.as_deref().or(self.config.language.as_deref())
    }

    /// Build the argument vector for one run.
    pub fn build_args(
        &self,
        input: &Path,
        output_dir: &Path,
        metadata: &JobMetadata,
    ) -> Vec<String> {
        let model = self.model_for(metadata);
        let language = self.language_for(metadata);
        let task = metadata.task.as_deref().or(self.config.task.as_deref());

        match self.config.flavor {
            EngineFlavor::WhisperCpp => {
                let stem = input.file_stem().unwrap_or_default().to_string_lossy();
                let mut args = vec![
                    "-m".to_string(),
                    model,
                    "-f".to_string(),
                    input.to_string_lossy().into_owned(),
                    format!("-o{}", self.config.output_format.extension()),
                    "-of".to_string(),
                    output_dir.join(stem.as_ref()).to_string_lossy().into_owned(),
                    "--print-progress".to_string(),
                ];
                if let Some(lang) = language {
                    args.push("-l".to_string());
                    args.push(lang.to_string());
                }
                if task == Some("translate") {
                    args.push("--translate".to_string());
                }
                args
            }
            EngineFlavor::FasterWhisper => {
                let mut args = vec![
                    input.to_string_lossy().into_owned(),
                    "--model".to_string(),
                    model,
                    "--output_dir".to_string(),
                    output_dir.to_string_lossy().into_owned(),
                    "--output_format".to_string(),
                    self.config.output_format.extension().to_string(),
                ];
                if let Some(lang) = language {
                    args.push("--language".to_string());
                    args.push(lang.to_string());
                }
                if let Some(task) = task {
                    args.push("--task".to_string());
                    args.push(task.to_string());
                }
                if let Some(ct) = self.config.compute_type.as_deref() {
                    args.push("--compute_type".to_string());
                    args.push(ct.to_string());
                }
                args
            }
        }
    }
}

#[async_trait]
impl TranscriptionEngine for ProcessEngine {
    fn is_available(&self) -> bool {
        self.config.resolve_binary().is_some()
    }

    fn describe(&self) -> String {
        format!("{} (model {})", self.config.binary.display(), self.config.model)
    }

    fn expected_output(&self, input: &Path, output_dir: &Path) -> PathBuf {
        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        output_dir.join(format!("{stem}.{}", self.config.output_format.extension()))
    }

    async fn spawn(
        &self,
        input: &Path,
        output_dir: &Path,
        metadata: &JobMetadata,
    ) -> Result<EngineChild, EngineError> {
        let binary = self
            .config
            .resolve_binary()
            .ok_or_else(|| EngineError::NotFound(self.config.binary.clone()))?;

        let mut child = Command::new(binary)
            .args(self.build_args(input, output_dir, metadata))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::NotFound(self.config.binary.clone())
                } else {
                    EngineError::Spawn(e)
                }
            })?;

        // Engines can be chatty on stdout; drain it so a full pipe buffer
        // never wedges the child (stall detection would then kill the job).
        if let Some(mut stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let _ = tokio::io::copy(&mut stdout, &mut tokio::io::sink()).await;
            });
        }

        let stderr = child.stderr.take().map(|s| BufReader::new(s).lines());
        Ok(EngineChild { child, stderr })
    }
}

#[cfg(test)]
#[path = "adapter_tests.rs"]
mod tests;
