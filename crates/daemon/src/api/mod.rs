// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface: job CRUD, queue stats, health, metrics, OpenAPI.
//!
//! Internal network, no auth. Everything under `/api/v1` except the health,
//! metrics, and documentation endpoints.

mod docs;
mod error;
mod health;
mod jobs;
mod system;
pub mod types;

pub use error::ApiError;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

use tp_core::{Clock, SystemClock};
use tp_engine::TranscriptionEngine;
use tp_queue::{FileTracker, JobQueue};

use crate::ingest::IngestContext;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub ingest: Arc<IngestContext>,
    pub engine: Arc<dyn TranscriptionEngine>,
    pub metrics: Option<PrometheusHandle>,
    ready: Arc<AtomicBool>,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        ingest: Arc<IngestContext>,
        engine: Arc<dyn TranscriptionEngine>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            ingest,
            engine,
            metrics,
            ready: Arc::new(AtomicBool::new(false)),
            started_at: Instant::now(),
        }
    }

    pub fn queue(&self) -> &JobQueue<SystemClock> {
        &self.ingest.queue
    }

    pub fn tracker(&self) -> &FileTracker<SystemClock> {
        &self.ingest.tracker
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn uptime_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    pub fn now_ms(&self) -> u64 {
        self.queue().clock().epoch_ms()
    }
}

/// Build the full router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route(
            "/api/v1/jobs/:id",
            get(jobs::get_job).patch(jobs::update_job).delete(jobs::delete_job),
        )
        .route("/api/v1/jobs/:id/retry", post(jobs::retry_job))
        .route("/api/v1/jobs/:id/revive", post(jobs::revive_job))
        .route("/api/v1/queue/stats", get(system::queue_stats))
        .route("/api/v1/queue/clean-failed", post(system::clean_failed))
        .route("/api/v1/system/reconcile", post(system::trigger_reconcile))
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/health/detailed", get(health::health_detailed))
        .route("/metrics", get(system::metrics))
        .route("/documentation/json", get(docs::openapi_json))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
