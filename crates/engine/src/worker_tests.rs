// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::pool::WorkerPool;
use crate::test_helpers::{Harness, PARSE_ARGS};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tp_core::{ErrorCode, JobId, JobStatus};
use tp_queue::{QueueConfig, QueueEvent};

async fn wait_for_terminal(harness: &Harness, id: &JobId) -> tp_core::Job {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let job = harness.queue.get(id).unwrap();
            if job.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("job did not reach a terminal state in time")
}

fn single_attempt_config() -> QueueConfig {
    QueueConfig { max_attempts: 1, ..QueueConfig::default() }
}

#[tokio::test]
async fn happy_path_completes_and_moves_artifacts() {
    let harness = Harness::new(QueueConfig::default());
    let engine = harness.script_engine(&format!(
        r#"{PARSE_ARGS}
echo "progress = 50%" >&2
printf 'the transcript text' > "$out/$stem.txt"
exit 0"#
    ));
    let id = harness.ingest("a", "lecture.mp3");

    let shutdown = CancellationToken::new();
    let pool = WorkerPool::spawn(
        1,
        harness.queue.clone(),
        engine,
        harness.dirs.clone(),
        shutdown.clone(),
    );

    let job = wait_for_terminal(&harness, &id).await;
    pool.shutdown().await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);

    let audio = harness.dirs.completed.join("a/lecture.mp3");
    let transcript = harness.dirs.completed.join("a/lecture.mp3.txt");
    assert!(audio.is_file(), "audio not moved to completed tree");
    assert_eq!(std::fs::read_to_string(&transcript).unwrap(), "the transcript text");
    assert_eq!(job.transcript_path.as_deref(), Some(transcript.as_path()));
    // Inbox is empty again
    assert!(!harness.dirs.watch.join("a/lecture.mp3").exists());
}

#[tokio::test]
async fn progress_events_flow_before_completion() {
    let harness = Harness::new(QueueConfig::default());
    let engine = harness.script_engine(&format!(
        r#"{PARSE_ARGS}
echo "progress = 10%" >&2
echo "progress = 90%" >&2
sleep 0.1
printf 'done' > "$out/$stem.txt"
exit 0"#
    ));
    let mut events = harness.queue.subscribe();
    let id = harness.ingest("a", "talk.mp3");

    let shutdown = CancellationToken::new();
    let pool = WorkerPool::spawn(
        1,
        harness.queue.clone(),
        engine,
        harness.dirs.clone(),
        shutdown.clone(),
    );
    wait_for_terminal(&harness, &id).await;
    pool.shutdown().await;

    let mut saw_progress = false;
    let mut saw_completed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            QueueEvent::Progress { percent, .. } => {
                assert!(percent <= 99, "progress must cap at 99 before exit");
                saw_progress = true;
            }
            QueueEvent::Completed { .. } => saw_completed = true,
            _ => {}
        }
    }
    assert!(saw_progress);
    assert!(saw_completed);
}

#[tokio::test]
async fn engine_crash_fails_terminally_and_moves_to_failed_tree() {
    let harness = Harness::new(single_attempt_config());
    let engine = harness.script_engine("echo 'something broke' >&2\nexit 7");
    let id = harness.ingest("b", "broken.mp3");

    let shutdown = CancellationToken::new();
    let pool = WorkerPool::spawn(
        1,
        harness.queue.clone(),
        engine,
        harness.dirs.clone(),
        shutdown.clone(),
    );
    let job = wait_for_terminal(&harness, &id).await;
    pool.shutdown().await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_code, Some(ErrorCode::EngineCrash));
    assert_eq!(job.error_reason.as_deref(), Some("engine exited with code 7"));
    assert!(harness.dirs.failed.join("b/broken.mp3").is_file());
    assert!(!harness.dirs.watch.join("b/broken.mp3").exists());
}

#[tokio::test]
async fn decode_failure_is_classified_as_invalid_file() {
    let harness = Harness::new(single_attempt_config());
    let engine = harness
        .script_engine("echo 'Error: Invalid data found when processing input' >&2\nexit 1");
    let id = harness.ingest("b", "not-audio.mp3");

    let shutdown = CancellationToken::new();
    let pool = WorkerPool::spawn(
        1,
        harness.queue.clone(),
        engine,
        harness.dirs.clone(),
        shutdown.clone(),
    );
    let job = wait_for_terminal(&harness, &id).await;
    pool.shutdown().await;

    assert_eq!(job.error_code, Some(ErrorCode::FileInvalid));
}

#[tokio::test]
async fn silent_success_without_output_is_output_missing() {
    let harness = Harness::new(single_attempt_config());
    let engine = harness.script_engine("exit 0");
    let id = harness.ingest("c", "quiet.mp3");

    let shutdown = CancellationToken::new();
    let pool = WorkerPool::spawn(
        1,
        harness.queue.clone(),
        engine,
        harness.dirs.clone(),
        shutdown.clone(),
    );
    let job = wait_for_terminal(&harness, &id).await;
    pool.shutdown().await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_code, Some(ErrorCode::OutputMissing));
}

#[tokio::test]
async fn empty_output_file_counts_as_missing() {
    let harness = Harness::new(single_attempt_config());
    let engine = harness.script_engine(&format!(
        r#"{PARSE_ARGS}
: > "$out/$stem.txt"
exit 0"#
    ));
    let id = harness.ingest("c", "empty.mp3");

    let shutdown = CancellationToken::new();
    let pool = WorkerPool::spawn(
        1,
        harness.queue.clone(),
        engine,
        harness.dirs.clone(),
        shutdown.clone(),
    );
    let job = wait_for_terminal(&harness, &id).await;
    pool.shutdown().await;

    assert_eq!(job.error_code, Some(ErrorCode::OutputMissing));
}

#[tokio::test]
async fn vanished_source_fails_with_file_missing() {
    let harness = Harness::new(single_attempt_config());
    let engine = harness.script_engine("exit 0");
    let id = harness.ingest("d", "gone.mp3");
    // Remove the file after enqueue, before a worker sees it
    std::fs::remove_file(harness.dirs.watch.join("d/gone.mp3")).unwrap();

    let shutdown = CancellationToken::new();
    let pool = WorkerPool::spawn(
        1,
        harness.queue.clone(),
        engine,
        harness.dirs.clone(),
        shutdown.clone(),
    );
    let job = wait_for_terminal(&harness, &id).await;
    pool.shutdown().await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_code, Some(ErrorCode::FileMissing));
}

#[tokio::test]
async fn retryable_failure_requeues_with_attempt_count() {
    // max_attempts 2: first crash requeues, second is terminal
    let harness = Harness::new(QueueConfig { max_attempts: 2, ..QueueConfig::default() });
    let engine = harness.script_engine("exit 3");
    let id = harness.ingest("e", "flaky.mp3");

    let shutdown = CancellationToken::new();
    let pool = WorkerPool::spawn(
        1,
        harness.queue.clone(),
        engine,
        harness.dirs.clone(),
        shutdown.clone(),
    );
    let job = wait_for_terminal(&harness, &id).await;
    pool.shutdown().await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 2);
}

#[tokio::test]
async fn whisper_cpp_flavor_finds_its_output() {
    use crate::adapter::{EngineConfig, EngineFlavor, OutputFormat, ProcessEngine};
    use crate::test_helpers::write_script;
    use std::sync::Arc;

    let harness = Harness::new(QueueConfig::default());

    // whisper.cpp takes `-f input -of <out-stem>` and writes `<out-stem>.txt`
    let script = harness.root.path().join("whisper-cpp.sh");
    write_script(
        &script,
        r#"
of=""
while [ $# -gt 0 ]; do
  case "$1" in
    -of) of="$2"; shift 2 ;;
    *) shift ;;
  esac
done
echo "progress = 60%" >&2
printf 'cpp transcript' > "$of.txt"
exit 0"#,
    );
    let engine = Arc::new(ProcessEngine::new(EngineConfig {
        binary: script,
        model: "ggml-base.bin".into(),
        language: None,
        task: None,
        compute_type: None,
        flavor: EngineFlavor::WhisperCpp,
        output_format: OutputFormat::Txt,
    }));
    let id = harness.ingest("cpp", "talk.mp3");

    let shutdown = CancellationToken::new();
    let pool = WorkerPool::spawn(
        1,
        harness.queue.clone(),
        engine,
        harness.dirs.clone(),
        shutdown.clone(),
    );
    let job = wait_for_terminal(&harness, &id).await;
    pool.shutdown().await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(
        std::fs::read_to_string(harness.dirs.completed.join("cpp/talk.mp3.txt")).unwrap(),
        "cpp transcript"
    );
}

#[tokio::test]
async fn partial_transcript_removed_on_failure() {
    let harness = Harness::new(single_attempt_config());
    let engine = harness.script_engine(&format!(
        r#"{PARSE_ARGS}
printf 'half a transcri' > "$out/$stem.txt"
exit 1"#
    ));
    let id = harness.ingest("f", "partial.mp3");

    let shutdown = CancellationToken::new();
    let pool = WorkerPool::spawn(
        1,
        harness.queue.clone(),
        engine,
        harness.dirs.clone(),
        shutdown.clone(),
    );
    wait_for_terminal(&harness, &id).await;
    pool.shutdown().await;

    assert!(
        !harness.dirs.output.join("f/partial.txt").exists(),
        "partial transcript must be deleted on failure"
    );
}
