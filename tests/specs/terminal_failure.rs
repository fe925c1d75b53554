// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Failing engines: retry accounting, the failed tree, and the retry API.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use super::support::World;
use tp_core::{ErrorCode, JobStatus};
use tp_daemon::ingest::IngestOutcome;

const ALWAYS_CRASHING_ENGINE: &str = r#"
echo "model load failed" >&2
exit 1
"#;

#[tokio::test]
async fn engine_failures_consume_attempts_then_fail_terminally() {
    let world = World::new(ALWAYS_CRASHING_ENGINE);
    let path = world.drop_audio("A", "doomed.mp3");
    let IngestOutcome::Enqueued { id, .. } = world.ingest.ingest_file(&path).unwrap() else {
        panic!("expected enqueue");
    };

    let (pool, shutdown) = world.start_pool(1);
    let job = world.wait_until_terminal(&world.queue, &id).await;
    shutdown.cancel();
    pool.shutdown().await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 3, "default budget is three attempts");
    assert_eq!(job.error_code, Some(ErrorCode::EngineCrash));
    assert_eq!(job.error_reason.as_deref(), Some("engine exited with code 1"));

    // Source audio parked under the failed tree, inbox clean
    assert!(world.config.dirs.failed.join("A/doomed.mp3").is_file());
    assert!(!path.exists());
}

#[tokio::test]
async fn retry_api_resets_failed_job_and_restores_source() {
    let world = World::new(ALWAYS_CRASHING_ENGINE);
    let path = world.drop_audio("A", "doomed.mp3");
    let IngestOutcome::Enqueued { id, .. } = world.ingest.ingest_file(&path).unwrap() else {
        panic!("expected enqueue");
    };

    let (pool, shutdown) = world.start_pool(1);
    world.wait_until_terminal(&world.queue, &id).await;
    shutdown.cancel();
    pool.shutdown().await;

    let api = world.api();
    let response = api
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/v1/jobs/{id}/retry"))
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let job = world.queue.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempts, 0);
    assert!(job.error_code.is_none(), "retry clears the error");
    assert!(path.is_file(), "retry restores the source to the inbox");
}

#[tokio::test]
async fn retry_then_fixed_engine_completes() {
    // Engine crashes until a marker file appears, then behaves.
    let world = World::new(
        r#"
in="$1"; shift
out="."
while [ $# -gt 0 ]; do
  case "$1" in
    --output_dir) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
marker="$(dirname "$0")/fixed.marker"
if [ ! -f "$marker" ]; then
  echo "flaky failure" >&2
  exit 1
fi
base=$(basename "$in")
stem="${base%.*}"
printf 'second time lucky' > "$out/$stem.txt"
exit 0
"#,
    );
    let path = world.drop_audio("A", "flaky.mp3");
    let IngestOutcome::Enqueued { id, .. } = world.ingest.ingest_file(&path).unwrap() else {
        panic!("expected enqueue");
    };

    let (pool, shutdown) = world.start_pool(1);
    let failed = world.wait_until_terminal(&world.queue, &id).await;
    assert_eq!(failed.status, JobStatus::Failed);
    shutdown.cancel();
    pool.shutdown().await;

    // Operator fixes the engine, restores the file, retries
    std::fs::write(world.root.path().join("fixed.marker"), b"ok").unwrap();
    tp_engine::move_atomic(
        &world.config.dirs.failed.join("A/flaky.mp3"),
        &path,
    )
    .unwrap();
    world.queue.retry(&id).unwrap();

    let (pool, shutdown) = world.start_pool(1);
    let job = world.wait_until_terminal(&world.queue, &id).await;
    shutdown.cancel();
    pool.shutdown().await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(
        std::fs::read_to_string(world.config.dirs.completed.join("A/flaky.mp3.txt")).unwrap(),
        "second time lucky"
    );
}

#[tokio::test]
async fn decode_failures_are_classified_as_invalid_input() {
    let world = World::new(
        r#"
echo "Error: Invalid data found when processing input" >&2
exit 1
"#,
    );
    let path = world.drop_audio("A", "not-audio.mp3");
    let IngestOutcome::Enqueued { id, .. } = world.ingest.ingest_file(&path).unwrap() else {
        panic!("expected enqueue");
    };

    let (pool, shutdown) = world.start_pool(1);
    let job = world.wait_until_terminal(&world.queue, &id).await;
    shutdown.cancel();
    pool.shutdown().await;

    assert_eq!(job.error_code, Some(ErrorCode::FileInvalid));
}
