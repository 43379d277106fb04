use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use sysfuse_agent::config::AgentConfig;
use sysfuse_agent::ingest::build_http_app;
use sysfuse_agent::pipeline::FlushPipeline;
use sysfuse_agent::scheduler::WindowScheduler;
use sysfuse_agent::snapshot::CombinedSnapshotBuilder;
use sysfuse_collector::{HttpMetricsSource, SyscallAggregator};
use sysfuse_forward::HttpForwarder;
use sysfuse_storage::{CsvPersistence, SnapshotStore};
use tokio::signal;
use tokio::sync::watch;
use tokio::time::{interval, Duration};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sysfuse=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());

    let config = AgentConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    tracing::info!(node_id = %config.node_id, "sysfuse-agent starting");

    let store = Arc::new(
        CsvPersistence::new(Path::new(&config.csv_dir))
            .with_context(|| format!("Failed to open CSV directory {}", config.csv_dir))?,
    );
    match store.list_partitions() {
        Ok(partitions) => tracing::info!(
            dir = %config.csv_dir,
            partitions = partitions.len(),
            "CSV persistence ready"
        ),
        Err(e) => tracing::warn!(error = %e, "Failed to list existing partitions"),
    }

    let aggregator = Arc::new(SyscallAggregator::new());
    let source = Arc::new(HttpMetricsSource::new(
        &config.metrics_endpoint,
        config.metrics_timeout(),
    )?);
    let forwarder = Arc::new(HttpForwarder::new(
        &config.central_server_url,
        &config.node_id,
        config.forward_timeout(),
    )?);

    let builder = CombinedSnapshotBuilder::new(source, config.metrics.clone(), aggregator.clone());
    let pipeline = Arc::new(FlushPipeline::new(builder, store.clone(), forwarder));
    let scheduler = WindowScheduler::new(config.flush_interval(), pipeline);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tracing::info!(
        interval_secs = config.flush_interval_secs,
        metrics = %config.metrics_endpoint,
        server = %config.central_server_url,
        "Starting window scheduler"
    );
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx.clone()));

    // Periodic retention cleanup
    let cleanup_handle = if config.retention_days > 0 {
        let retention_days = config.retention_days;
        let cleanup_store = store.clone();
        Some(tokio::spawn(async move {
            let mut tick = interval(Duration::from_secs(3600));
            loop {
                tick.tick().await;
                let store = cleanup_store.clone();
                match tokio::task::spawn_blocking(move || store.cleanup(retention_days)).await {
                    Ok(Ok(removed)) if removed > 0 => {
                        tracing::info!(removed, retention_days, "Removed expired CSV partitions");
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::error!(error = %e, "CSV retention cleanup failed"),
                    Err(e) => tracing::error!(error = %e, "CSV retention task panicked"),
                }
            }
        }))
    } else {
        None
    };

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind webhook listener on {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "Webhook listener started");

    let mut http_shutdown = shutdown_rx.clone();
    let http_server = axum::serve(listener, build_http_app(aggregator)).with_graceful_shutdown(
        async move {
            let _ = http_shutdown.wait_for(|stop| *stop).await;
        },
    );
    let http_handle = tokio::spawn(async move {
        if let Err(e) = http_server.await {
            tracing::error!(error = %e, "Webhook listener failed");
        }
    });

    signal::ctrl_c().await.context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down gracefully");
    let _ = shutdown_tx.send(true);

    if let Err(e) = http_handle.await {
        tracing::error!(error = %e, "Webhook listener task failed");
    }
    if let Err(e) = scheduler_handle.await {
        tracing::error!(error = %e, "Scheduler task failed");
    }
    if let Some(handle) = cleanup_handle {
        handle.abort();
    }

    tracing::info!("sysfuse-agent stopped");
    Ok(())
}
