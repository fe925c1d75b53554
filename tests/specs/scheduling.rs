// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduling order and pagination truth through the HTTP surface.

use axum::body::Body;
use axum::http::Request;
use serde_json::Value;
use tower::ServiceExt;

use super::support::{World, WELL_BEHAVED_ENGINE};
use tp_core::Priority;
use tp_queue::{NewJob, QueueConfig};

fn pending_job(path: &str, priority: Priority, fingerprint: &str) -> NewJob {
    let path = std::path::PathBuf::from(path);
    let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
    NewJob {
        relative_path: "p".into(),
        file_name: file_name.clone(),
        original_file_name: file_name,
        file_size_bytes: 1024,
        mime_type: "audio/mpeg".into(),
        audio_format: "mp3".into(),
        priority,
        fingerprint: fingerprint.to_string(),
        metadata: Default::default(),
        file_path: path,
    }
}

async fn get_json(api: &axum::Router, uri: &str) -> Value {
    let response = api
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.status().is_success(), "GET {uri} -> {}", response.status());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn priority_dominates_then_fifo() {
    let world = World::new(WELL_BEHAVED_ENGINE);

    // Enqueued in the "wrong" order on purpose
    world.queue.enqueue(pending_job("/watch/p/low.mp3", Priority::Low, "f1")).unwrap();
    world.queue.enqueue(pending_job("/watch/p/normal.mp3", Priority::Normal, "f2")).unwrap();
    world.queue.enqueue(pending_job("/watch/p/urgent.mp3", Priority::Urgent, "f3")).unwrap();
    world.queue.enqueue(pending_job("/watch/p/high.mp3", Priority::High, "f4")).unwrap();

    let order: Vec<String> = (0..4)
        .map(|_| world.queue.claim().unwrap().unwrap().0.file_name)
        .collect();
    assert_eq!(order, ["urgent.mp3", "high.mp3", "normal.mp3", "low.mp3"]);
}

#[tokio::test]
async fn pagination_totals_are_exact_not_extrapolated() {
    // Scenario: 150 enqueued, 40 consumed, 110 remain pending.
    let config = QueueConfig { concurrency_limit: 500, ..QueueConfig::default() };
    let world = World::with_queue_config(WELL_BEHAVED_ENGINE, config);

    for i in 0..150 {
        world
            .queue
            .enqueue(pending_job(
                &format!("/watch/p/{i:03}.mp3"),
                Priority::Normal,
                &format!("fp{i}"),
            ))
            .unwrap();
    }
    for _ in 0..40 {
        let (_, lease) = world.queue.claim().unwrap().unwrap();
        world.queue.complete(&lease, "/t.txt".into()).unwrap();
    }

    let api = world.api();
    let body = get_json(&api, "/api/v1/jobs?status=pending&page=3&limit=20").await;

    assert_eq!(body["data"].as_array().unwrap().len(), 20);
    assert_eq!(body["total"], 110, "total must be the exact status count");

    // The last pending page is partial but the total is unchanged
    let body = get_json(&api, "/api/v1/jobs?status=pending&page=6&limit=20").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 10);
    assert_eq!(body["total"], 110);
}

#[tokio::test]
async fn stats_endpoint_matches_queue_truth() {
    let world = World::new(WELL_BEHAVED_ENGINE);
    for i in 0..4 {
        world
            .queue
            .enqueue(pending_job(
                &format!("/watch/p/{i}.mp3"),
                Priority::Normal,
                &format!("fp{i}"),
            ))
            .unwrap();
    }
    let (_, lease) = world.queue.claim().unwrap().unwrap();
    world.queue.complete(&lease, "/t.txt".into()).unwrap();
    world.queue.claim().unwrap().unwrap();

    let api = world.api();
    let body = get_json(&api, "/api/v1/queue/stats").await;
    assert_eq!(body["pending"], 2);
    assert_eq!(body["processing"], 1);
    assert_eq!(body["completed"], 1);
    assert_eq!(body["total"], 4);
}

#[tokio::test]
async fn priority_change_is_a_reposition_not_a_second_job() {
    let world = World::new(WELL_BEHAVED_ENGINE);
    let parked =
        world.queue.enqueue(pending_job("/watch/p/parked.mp3", Priority::Low, "f1")).unwrap();
    world.queue.enqueue(pending_job("/watch/p/other.mp3", Priority::Normal, "f2")).unwrap();

    world.queue.update(&parked, Some(Priority::Urgent), None).unwrap();

    // Same id, new position, still exactly two jobs
    assert_eq!(world.queue.count_by_status().total(), 2);
    let (first, _) = world.queue.claim().unwrap().unwrap();
    assert_eq!(first.id, parked);
    assert_eq!(first.priority, Priority::Urgent);
}
