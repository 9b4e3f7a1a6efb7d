use std::sync::Arc;

use lighthouse_worker::{
    app_state::AppState,
    config::AppConfig,
    routes,
    services::{
        audit::{AuditorOptions, LighthouseAuditor},
        queue::RedisJobQueue,
        store::RedisResultStore,
        worker::{JobController, WorkerSettings},
    },
};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "Startup error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    tracing::info!("Starting Lighthouse worker");

    let prometheus_handle = Arc::new(PrometheusBuilder::new().install_recorder()?);

    metrics::describe_counter!("lighthouse_jobs_total", "Audit jobs picked up from the queue");
    metrics::describe_counter!("lighthouse_jobs_completed", "Audit jobs completed");
    metrics::describe_counter!("lighthouse_jobs_failed", "Audit jobs marked as failed");
    metrics::describe_counter!("lighthouse_jobs_retried", "Audit jobs re-queued after a retryable failure");
    metrics::describe_counter!("lighthouse_jobs_dropped", "Malformed queue payloads discarded");
    metrics::describe_histogram!(
        "lighthouse_audit_duration_seconds",
        "Wall time of a single Lighthouse audit"
    );

    // A failed initial connection is fatal; there is no reconnect loop here.
    tracing::info!(
        host = %config.redis_host,
        port = config.redis_port,
        "Connecting to Redis"
    );
    let client = redis::Client::open(config.redis_connection_info())?;
    let conn = client.get_multiplexed_async_connection().await?;
    let store = RedisResultStore::new(conn.clone());
    store.health_check().await?;
    tracing::info!("Connected to Redis");

    let queue = RedisJobQueue::new(conn, config.lighthouse_queue_name.clone());
    let engine = LighthouseAuditor::new(AuditorOptions::from_config(&config));
    let state = AppState::new(queue, store, engine);
    let controller = JobController::new(state, WorkerSettings::from_config(&config));

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!("Health check server running on port {}", config.port);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        let app = routes::router(prometheus_handle);
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "Health server error");
        }
    });

    let worker = tokio::spawn(async move { controller.run(shutdown_rx).await });

    let signal = shutdown_signal().await;
    tracing::info!("{} received, shutting down...", signal);

    let _ = shutdown_tx.send(true);
    // The controller owns the last Redis handles; joining it closes the connection.
    if let Err(e) = worker.await {
        tracing::error!(error = %e, "Worker task panicked");
    }
    tracing::info!("Disconnected from Redis");

    let _ = server.await;
    Ok(())
}

/// Wait for SIGINT or SIGTERM and return its name.
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => "SIGINT",
                    _ = sigterm.recv() => "SIGTERM",
                }
            }
            _ => {
                tracing::warn!("Failed to register signal handlers, falling back to Ctrl-C");
                let _ = tokio::signal::ctrl_c().await;
                "SIGINT"
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "SIGINT"
    }
}
