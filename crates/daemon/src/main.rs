// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `tpd` — the Transcription Palantir daemon.
//!
//! Boot order: config → storage recovery → reconciliation (blocking; failure
//! aborts before the API exists) → stall sweeper + watcher + worker pool +
//! metrics → HTTP API. Shutdown drains the pool under a global deadline.

use std::future::IntoFuture;
use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tp_daemon::api::{self, AppState};
use tp_daemon::config::Config;
use tp_daemon::ingest::IngestContext;
use tp_daemon::lifecycle::{reconcile, startup};
use tp_daemon::{env, metrics, watcher};
use tp_engine::{ProcessEngine, WorkerPool};
use tp_queue::spawn_sweeper;

fn main() -> ExitCode {
    // Logging first so even config failures are visible
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_logging(None);
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    init_logging(Some(&config));

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(Arc::new(config)))
}

fn init_logging(config: Option<&Config>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match config {
        Some(config) if std::fs::create_dir_all(config.log_dir()).is_ok() => {
            let appender = tracing_appender::rolling::daily(config.log_dir(), "tpd.log");
            builder.with_writer(appender).with_ansi(false).init();
        }
        _ => builder.init(),
    }
}

async fn run(config: Arc<Config>) -> ExitCode {
    info!(version = env::VERSION, "starting transcription daemon");

    // 1. Storage recovery
    let boot = match startup(&config) {
        Ok(boot) => boot,
        Err(e) => {
            error!(error = %e, "startup failed");
            return ExitCode::FAILURE;
        }
    };
    let queue = boot.queue.clone();
    let ingest = Arc::new(IngestContext::new(queue.clone(), Arc::clone(&config)));

    // 2. Reconciliation, blocking, before any component accepts work.
    // A failure here aborts the boot; the API never starts.
    let report = {
        let ingest = Arc::clone(&ingest);
        match tokio::task::spawn_blocking(move || reconcile(&ingest)).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                error!(error = %e, "reconciliation failed; aborting boot");
                return ExitCode::FAILURE;
            }
            Err(e) => {
                error!(error = %e, "reconciliation panicked; aborting boot");
                return ExitCode::FAILURE;
            }
        }
    };
    info!(
        jobs_created = report.jobs_created,
        jobs_reconciled = report.jobs_reconciled,
        "boot reconciliation done"
    );

    // 3. Background components
    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(queue.clone(), shutdown.clone());

    let watcher_handle = match watcher::spawn_watcher(Arc::clone(&ingest), shutdown.clone()) {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "watcher failed to start");
            return ExitCode::FAILURE;
        }
    };

    let engine = Arc::new(ProcessEngine::new(config.engine.clone()));
    if !tp_engine::TranscriptionEngine::is_available(engine.as_ref()) {
        warn!(
            binary = %config.engine.binary.display(),
            "engine binary not found; jobs will fail until it is installed"
        );
    }
    let pool = WorkerPool::spawn(
        config.queue.concurrency_limit,
        queue.clone(),
        engine.clone(),
        config.dirs.clone(),
        shutdown.clone(),
    );

    let metrics_handle = metrics::install_recorder();
    let collector = metrics::spawn_collector(queue.clone(), shutdown.clone());

    // Periodic snapshots keep restart recovery fast and the WAL compact
    let checkpoint_task = {
        let queue = queue.clone();
        let shutdown = shutdown.clone();
        let checkpointer = boot.checkpointer;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(env::checkpoint_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = queue.checkpoint(&checkpointer) {
                            warn!(error = %e, "periodic checkpoint failed");
                        }
                    }
                }
            }
            // Final snapshot so the next boot replays nothing
            if let Err(e) = queue.checkpoint(&checkpointer) {
                warn!(error = %e, "shutdown checkpoint failed");
            }
        })
    };

    // 4. HTTP API
    let state = AppState::new(Arc::clone(&ingest), engine, metrics_handle);
    let router = api::router(state.clone());

    let listener = match tokio::net::TcpListener::bind((config.http_host.as_str(), config.http_port))
        .await
    {
        Ok(listener) => listener,
        Err(e) => {
            error!(host = %config.http_host, port = config.http_port, error = %e, "bind failed");
            return ExitCode::FAILURE;
        }
    };
    info!(host = %config.http_host, port = config.http_port, "API listening");
    state.mark_ready();

    let server_shutdown = shutdown.clone();
    let serve = axum::serve(listener, router)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .into_future();

    tokio::select! {
        result = serve => {
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
        }
        _ = wait_for_signal() => {
            info!("shutdown signal received");
        }
    }

    // 5. Drain under the global deadline
    shutdown.cancel();
    let deadline = config.shutdown_timeout;
    let drained = tokio::time::timeout(deadline, async {
        pool.shutdown().await;
        let _ = watcher_handle.await;
        let _ = sweeper.await;
        let _ = collector.await;
        let _ = checkpoint_task.await;
    })
    .await;

    match drained {
        Ok(()) => {
            info!("shutdown complete");
            ExitCode::SUCCESS
        }
        Err(_) => {
            error!(timeout_ms = deadline.as_millis() as u64, "shutdown deadline exceeded; forcing exit");
            ExitCode::FAILURE
        }
    }
}

async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "cannot install SIGTERM handler");
            std::future::pending::<()>().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}
