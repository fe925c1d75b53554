// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A full operator session over the HTTP surface: create, inspect, retune,
//! clean up.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::support::{World, WELL_BEHAVED_ENGINE};

async fn call(api: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = api.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn create_inspect_retune_and_delete() {
    let world = World::new(WELL_BEHAVED_ENGINE);
    let api = world.api();
    let path = world.drop_audio("ops", "interview.mp3");

    // Create
    let (status, created) = call(
        &api,
        post("/api/v1/jobs", json!({ "filePath": path.display().to_string() })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["originalFileName"], "interview.mp3");

    // Inspect: shows up in the list and individually, with health
    let (_, listing) = call(&api, get("/api/v1/jobs?status=pending")).await;
    assert_eq!(listing["total"], 1);
    let (status, job) = call(&api, get(&format!("/api/v1/jobs/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["healthStatus"], "healthy");

    // Retune: bump the priority, attach context
    let (status, patched) = call(
        &api,
        Request::builder()
            .method("PATCH")
            .uri(format!("/api/v1/jobs/{id}"))
            .header("content-type", "application/json")
            .body(Body::from(
                json!({
                    "priority": "urgent",
                    "metadata": { "model": "large-v3", "context": { "speaker": "two" } }
                })
                .to_string(),
            ))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["priority"], "urgent");
    assert_eq!(patched["metadata"]["model"], "large-v3");
    assert_eq!(patched["id"], id, "priority change must keep the id");

    // Stats agree
    let (_, stats) = call(&api, get("/api/v1/queue/stats")).await;
    assert_eq!(stats["pending"], 1);
    assert_eq!(stats["total"], 1);

    // Delete: record and artifacts gone
    let (status, _) = call(
        &api,
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/v1/jobs/{id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!path.exists());

    let (status, _) = call(&api, get(&format!("/api/v1/jobs/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn documentation_matches_the_serving_router() {
    let world = World::new(WELL_BEHAVED_ENGINE);
    let api = world.api();

    let (status, doc) = call(&api, get("/documentation/json")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["info"]["title"], "Transcription Palantir");

    // Every documented path answers something other than 404/405 semantics
    // when hit with its documented method; spot-check the two mutating ones.
    let (status, _) = call(&api, post("/api/v1/queue/clean-failed", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, report) = call(&api, post("/api/v1/system/reconcile", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(report["filesScanned"].is_number());
}

#[tokio::test]
async fn health_endpoints_reflect_readiness_and_engine() {
    let world = World::new(WELL_BEHAVED_ENGINE);
    let api = world.api();

    let (status, health) = call(&api, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");

    // World::api marks ready before serving, as the daemon does after boot
    let (status, _) = call(&api, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, detailed) = call(&api, get("/health/detailed")).await;
    assert_eq!(status, StatusCode::OK);
    // The scripted engine binary exists, so the engine probe passes
    assert_eq!(detailed["engine"]["available"], true);
    assert_eq!(detailed["status"], "ok");
}
