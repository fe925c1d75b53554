// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prometheus metrics: recorder installation and the 15s collector task.

use std::time::Duration;

use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use tp_core::Clock;
use tp_queue::JobQueue;

const COLLECT_EVERY: Duration = Duration::from_secs(15);

/// Install the global recorder. `None` if another recorder is already
/// installed (tests); `/metrics` then returns 503.
pub fn install_recorder() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "metrics recorder unavailable");
            None
        }
    }
}

/// Refresh queue gauges on a fixed cadence until cancelled.
pub fn spawn_collector<C: Clock>(
    queue: JobQueue<C>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(COLLECT_EVERY);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => collect(&queue),
            }
        }
    })
}

fn collect<C: Clock>(queue: &JobQueue<C>) {
    let counts = queue.count_by_status();
    gauge!("palantir_jobs", "status" => "pending").set(counts.pending as f64);
    gauge!("palantir_jobs", "status" => "processing").set(counts.processing as f64);
    gauge!("palantir_jobs", "status" => "completed").set(counts.completed as f64);
    gauge!("palantir_jobs", "status" => "failed").set(counts.failed as f64);
    gauge!("palantir_jobs", "status" => "cancelled").set(counts.cancelled as f64);
    gauge!("palantir_queue_depth").set(counts.pending as f64);
    gauge!("palantir_workers_busy").set(counts.processing as f64);
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
