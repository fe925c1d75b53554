// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker loop: claim → spawn → stream → finalize → cleanup.
//!
//! Each job runs through an explicit state machine. Every state has a single
//! exit contract and the lease is owned until Cleanup releases it — failures
//! become `fail` transitions through the queue, never errors escaping the
//! loop. There is deliberately no wall-clock timeout on the subprocess: the
//! queue's stall detection is the only deadline mechanism, so legitimately
//! long transcripts are never killed.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tp_core::{Clock, ErrorCode, Job, JobStatus};
use tp_queue::{JobQueue, Lease, QueueError};

use crate::adapter::{EngineChild, EngineError, TranscriptionEngine};
use crate::artifacts::{audio_dest, engine_output_dir, move_atomic, transcript_dest};
use crate::progress::{looks_like_decode_failure, parse_progress};

/// Poll cadence while waiting for a claim.
const CLAIM_POLL_MS: u64 = 500;
/// Heartbeat floor while streaming: at least this often, progress or not.
const HEARTBEAT_EVERY: Duration = Duration::from_secs(10);
/// How many stderr lines to keep for failure classification.
const STDERR_TAIL_LINES: usize = 40;

/// The managed directory trees a worker moves files between.
#[derive(Debug, Clone)]
pub struct WorkDirs {
    pub watch: PathBuf,
    pub output: PathBuf,
    pub completed: PathBuf,
    pub failed: PathBuf,
}

/// Everything one worker task needs.
pub struct WorkerContext<C: Clock> {
    pub worker_id: usize,
    pub queue: JobQueue<C>,
    pub engine: std::sync::Arc<dyn TranscriptionEngine>,
    pub dirs: WorkDirs,
    pub shutdown: CancellationToken,
}

/// Worker states. Transitions run strictly forward; `Cleanup` is the only
/// state that releases the lease.
enum JobState {
    Spawning,
    Streaming(EngineChild),
    Finalizing(std::process::ExitStatus, String),
    Cleanup(Outcome),
}

enum Outcome {
    Done(PathBuf),
    Retryable(ErrorCode, String),
}

/// Run one worker until shutdown. Stops claiming on cancel; an in-flight
/// subprocess is allowed to finish and report.
pub async fn run_worker<C: Clock>(ctx: WorkerContext<C>) {
    info!(worker = ctx.worker_id, "worker started");
    loop {
        if ctx.shutdown.is_cancelled() {
            break;
        }

        let claimed = match ctx.queue.claim() {
            Ok(claimed) => claimed,
            Err(e) => {
                warn!(worker = ctx.worker_id, error = %e, "claim failed; backing off");
                None
            }
        };

        match claimed {
            Some((job, lease)) => process_job(&ctx, job, lease).await,
            None => {
                // Small per-worker jitter so the pool doesn't poll in lockstep
                let jitter = (ctx.worker_id as u64 % 5) * 37;
                tokio::select! {
                    _ = ctx.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_millis(CLAIM_POLL_MS + jitter)) => {}
                }
            }
        }
    }
    info!(worker = ctx.worker_id, "worker stopped");
}

/// Drive one claimed job through the state machine.
async fn process_job<C: Clock>(ctx: &WorkerContext<C>, job: Job, lease: Lease) {
    let output_dir = engine_output_dir(&ctx.dirs.output, &job.relative_path);
    let expected = ctx.engine.expected_output(&job.file_path, &output_dir);

    let mut state = JobState::Spawning;
    loop {
        state = match state {
            JobState::Spawning => match spawn(ctx, &job, &output_dir).await {
                Ok(child) => JobState::Streaming(child),
                Err(outcome) => JobState::Cleanup(outcome),
            },

            JobState::Streaming(child) => {
                let (status, tail) = stream(ctx, &lease, child).await;
                match status {
                    Some(status) => JobState::Finalizing(status, tail),
                    // Lost the lease mid-run: the sweeper owns the job now.
                    // Drop any partial output so the next attempt starts clean.
                    None => {
                        if expected.exists() {
                            let _ = std::fs::remove_file(&expected);
                        }
                        return;
                    }
                }
            }

            JobState::Finalizing(status, tail) => {
                JobState::Cleanup(finalize(ctx, &job, &expected, status, &tail))
            }

            JobState::Cleanup(outcome) => {
                cleanup(ctx, &job, &lease, &expected, outcome);
                return;
            }
        };
    }
}

/// Spawning: make the scratch directory, verify the source, start the engine.
async fn spawn<C: Clock>(
    ctx: &WorkerContext<C>,
    job: &Job,
    output_dir: &Path,
) -> Result<EngineChild, Outcome> {
    if let Err(e) = std::fs::create_dir_all(output_dir) {
        return Err(Outcome::Retryable(
            ErrorCode::EngineCrash,
            format!("cannot create output directory: {e}"),
        ));
    }

    if !job.file_path.is_file() {
        return Err(Outcome::Retryable(
            ErrorCode::FileMissing,
            format!("Source file no longer present at {}", job.file_path.display()),
        ));
    }

    debug!(job_id = %job.id, engine = %ctx.engine.describe(), "spawning engine");
    match ctx.engine.spawn(&job.file_path, output_dir, &job.metadata).await {
        Ok(child) => Ok(child),
        Err(EngineError::NotFound(path)) => Err(Outcome::Retryable(
            ErrorCode::EngineNotFound,
            format!("engine binary absent or not executable: {}", path.display()),
        )),
        Err(e) => Err(Outcome::Retryable(ErrorCode::EngineCrash, format!("spawn failed: {e}"))),
    }
}

/// Streaming: scan stderr for progress, heartbeat at least every 10s, wait
/// for exit. Returns `None` if the lease was lost (stall sweeper took over).
async fn stream<C: Clock>(
    ctx: &WorkerContext<C>,
    lease: &Lease,
    mut child: EngineChild,
) -> (Option<std::process::ExitStatus>, String) {
    let mut stderr = child.take_stderr();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut ticker = tokio::time::interval(HEARTBEAT_EVERY);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.reset();

    let mut lease = *lease;
    let mut lease_lost = false;

    // Phase 1: pump stderr until EOF (the engine exiting closes it),
    // heartbeating on progress and at least every 10s.
    loop {
        tokio::select! {
            line = read_line(&mut stderr) => match line {
                Some(line) => {
                    if let Some(percent) = parse_progress(&line) {
                        // Progress implies liveness: renew before reporting
                        match ctx.queue.heartbeat(&lease) {
                            Ok(renewed) => lease = renewed,
                            Err(QueueError::LeaseExpired(_)) => {
                                lease_lost = true;
                                break;
                            }
                            Err(e) => warn!(error = %e, "heartbeat failed"),
                        }
                        let _ = ctx.queue.report_progress(&lease, percent);
                    }
                    push_tail(&mut tail, line);
                }
                None => break,
            },

            _ = ticker.tick() => {
                match ctx.queue.heartbeat(&lease) {
                    Ok(renewed) => lease = renewed,
                    Err(QueueError::LeaseExpired(_)) => {
                        lease_lost = true;
                        break;
                    }
                    Err(e) => warn!(error = %e, "heartbeat failed"),
                }
            },
        }
    }

    if lease_lost {
        warn!(job_id = %lease.job_id, "lease lost mid-run; abandoning result");
        let _ = child.kill().await;
        return (None, collect_tail(tail));
    }

    // Phase 2: stderr is closed; wait for the exit status, still renewing
    // so the sweeper does not steal the job during finalization.
    let status = loop {
        tokio::select! {
            status = child.wait() => break status.ok(),

            _ = ticker.tick() => {
                match ctx.queue.heartbeat(&lease) {
                    Ok(renewed) => lease = renewed,
                    Err(QueueError::LeaseExpired(_)) => {
                        lease_lost = true;
                        break None;
                    }
                    Err(e) => warn!(error = %e, "heartbeat failed"),
                }
            },
        }
    };

    if lease_lost {
        warn!(job_id = %lease.job_id, "lease lost mid-run; abandoning result");
        let _ = child.kill().await;
        return (None, collect_tail(tail));
    }

    (status, collect_tail(tail))
}

async fn read_line(
    stderr: &mut Option<tokio::io::Lines<tokio::io::BufReader<tokio::process::ChildStderr>>>,
) -> Option<String> {
    match stderr {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => None,
    }
}

fn push_tail(tail: &mut VecDeque<String>, line: String) {
    if tail.len() == STDERR_TAIL_LINES {
        tail.pop_front();
    }
    tail.push_back(line);
}

fn collect_tail(tail: VecDeque<String>) -> String {
    tail.into_iter().collect::<Vec<_>>().join("\n")
}

/// Finalizing: interpret the exit status and the produced artifacts.
fn finalize<C: Clock>(
    ctx: &WorkerContext<C>,
    job: &Job,
    expected: &Path,
    status: std::process::ExitStatus,
    stderr_tail: &str,
) -> Outcome {
    if status.success() {
        let non_empty =
            std::fs::metadata(expected).map(|m| m.len() > 0).unwrap_or(false);
        if !non_empty {
            return Outcome::Retryable(
                ErrorCode::OutputMissing,
                format!(
                    "engine reported success but {} is missing or empty",
                    expected.display()
                ),
            );
        }

        let audio_to = audio_dest(&ctx.dirs.completed, &job.relative_path, &job.file_name);
        let transcript_to =
            transcript_dest(&ctx.dirs.completed, &job.relative_path, &job.file_name);
        if let Err(e) = move_atomic(&job.file_path, &audio_to) {
            return Outcome::Retryable(
                ErrorCode::EngineCrash,
                format!("failed to move completed audio: {e}"),
            );
        }
        if let Err(e) = move_atomic(expected, &transcript_to) {
            return Outcome::Retryable(
                ErrorCode::OutputMissing,
                format!("failed to move transcript: {e}"),
            );
        }
        return Outcome::Done(transcript_to);
    }

    if looks_like_decode_failure(stderr_tail) {
        return Outcome::Retryable(
            ErrorCode::FileInvalid,
            "engine could not decode the input file".to_string(),
        );
    }

    let code_desc =
        status.code().map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string());
    Outcome::Retryable(ErrorCode::EngineCrash, format!("engine exited with code {code_desc}"))
}

/// Cleanup: report through the queue, move the source on terminal failure,
/// delete partial output. Releases the lease by consuming it.
fn cleanup<C: Clock>(
    ctx: &WorkerContext<C>,
    job: &Job,
    lease: &Lease,
    expected: &Path,
    outcome: Outcome,
) {
    match outcome {
        Outcome::Done(transcript_path) => {
            if let Err(e) = ctx.queue.complete(lease, transcript_path) {
                warn!(job_id = %job.id, error = %e, "completion report rejected");
            }
        }
        Outcome::Retryable(code, reason) => {
            // Partial transcript must not leak into the next attempt
            if expected.exists() {
                let _ = std::fs::remove_file(expected);
            }

            match ctx.queue.fail(lease, code, reason.as_str()) {
                Ok(JobStatus::Failed) => {
                    // Terminal: the source leaves the inbox
                    if job.file_path.is_file() {
                        let dest =
                            audio_dest(&ctx.dirs.failed, &job.relative_path, &job.file_name);
                        if let Err(e) = move_atomic(&job.file_path, &dest) {
                            warn!(job_id = %job.id, error = %e, "failed to move source to failed tree");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "failure report rejected");
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
