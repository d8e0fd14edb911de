//! Environmental telemetry pipeline
//!
//! Ingests periodic sensor readings, maintains rolling statistics,
//! flags anomalies, persists a retention-bounded history, and fans out
//! enriched updates to live WebSocket observers.

use anyhow::Result;
use pipeline_lib::{
    analytics::OutlierLog,
    broadcast::BroadcastManager,
    health::{components, HealthRegistry},
    ingest::{IngestConfig, IngestLoop},
    observability::{EventLogger, PipelineMetrics},
    store::{run_retention_task, RetentionTaskConfig, TelemetryStore},
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;
mod sensor;

const PIPELINE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting telemetry-pipeline");

    // Load configuration
    let config = config::PipelineConfig::load()?;
    info!(source = %config.source_name, db_path = %config.db_path, "Pipeline configured");

    // Open the store and create the schema
    let store = TelemetryStore::new(&config.db_path).with_retention(config.retention());
    store.initialize()?;

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::INGEST).await;
    health_registry.register(components::STORE).await;
    health_registry.register(components::BROADCAST).await;
    health_registry.register(components::RETENTION).await;

    // Initialize metrics and the structured event logger
    let metrics = PipelineMetrics::new();
    let logger = EventLogger::new(&config.source_name);
    logger.log_startup(PIPELINE_VERSION);

    let broadcast = Arc::new(BroadcastManager::new());
    let outlier_log = Arc::new(OutlierLog::default());

    // One shutdown channel, subscribed by every long-running task
    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    // Retention and compaction run independently of the ingestion loop,
    // with their own store handle
    let retention_handle = tokio::spawn(run_retention_task(
        store.clone(),
        RetentionTaskConfig {
            cleanup_interval: config.cleanup_interval(),
            compact_interval: config.compact_interval(),
        },
        shutdown_tx.subscribe(),
    ));

    // The ingestion loop owns the analytics components and the source
    let source = sensor::SimulatedSensor::new(&config.source_name);
    let ingest = IngestLoop::new(
        Box::new(source),
        store.clone(),
        broadcast.clone(),
        outlier_log.clone(),
        health_registry.clone(),
        metrics.clone(),
        logger.clone(),
        IngestConfig {
            poll_interval: config.poll_interval(),
        },
    );
    let ingest_handle = tokio::spawn(ingest.run(shutdown_tx.subscribe()));

    // Shared application state for the API
    let app_state = Arc::new(api::AppState {
        health_registry: health_registry.clone(),
        metrics,
        store,
        broadcast,
        outlier_log,
    });

    // Mark pipeline as ready after initialization
    health_registry.set_ready(true).await;

    // Start health, metrics and query server
    let _api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    shutdown_tx.send(()).ok();

    // Let the loop and the retention task observe the signal
    let _ = ingest_handle.await;
    let _ = retention_handle.await;
    info!("Shutdown complete");

    Ok(())
}
