//! The ingestion loop
//!
//! The only component holding control flow: polls the reading source,
//! feeds every analytics component, issues persistence writes without
//! blocking the cycle, and hands the enriched payload to the broadcast
//! manager. A failure while processing one reading is logged and the
//! loop moves on; nothing originating from a single reading may stop
//! ingestion.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant};
use tracing::{error, info};

use crate::alert::{AlertEvaluator, AlertEvent, ThresholdConfig};
use crate::analytics::{
    HorizonAverages, MovingAverageEngine, OutlierConfig, OutlierDetector, OutlierLog,
    OutlierMethod, OutlierRecord, OutlierSeverity, OutlierVerdict,
};
use crate::broadcast::BroadcastManager;
use crate::health::{components, HealthRegistry};
use crate::models::{Metric, MinuteSummary, Reading};
use crate::observability::{EventLogger, PipelineMetrics};
use crate::rollup::MinuteAggregator;
use crate::store::{StoreError, TelemetryStore};

pub use async_trait::async_trait;

/// Contract with the reading source
///
/// A poll yields either the next reading or nothing new; the latter is
/// idle time, not an error.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    async fn poll(&mut self) -> Result<Option<Reading>>;
}

/// Configuration for the ingestion loop
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Source poll interval (default: 1 second)
    pub poll_interval: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Enriched payload handed to the broadcast manager
#[derive(Debug, Serialize)]
struct EnrichedPayload<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: &'a Reading,
    analysis: ReadingAnalysis,
    timestamp: i64,
}

/// Per-reading analysis embedded in the broadcast payload
#[derive(Debug, Serialize)]
struct ReadingAnalysis {
    has_outlier: bool,
    outlier_count: usize,
    confidence: f64,
    moving_averages: BTreeMap<&'static str, HorizonAverages>,
    outliers: BTreeMap<&'static str, OutlierFlag>,
}

#[derive(Debug, Serialize)]
struct OutlierFlag {
    is_outlier: bool,
    score: f64,
    severity: OutlierSeverity,
    method: OutlierMethod,
}

/// Drives the whole pipeline, one reading at a time
pub struct IngestLoop {
    source: Box<dyn ReadingSource>,
    averages: MovingAverageEngine,
    detector: OutlierDetector,
    aggregator: MinuteAggregator,
    evaluator: AlertEvaluator,
    store: TelemetryStore,
    broadcast: Arc<BroadcastManager>,
    outlier_log: Arc<OutlierLog>,
    health: HealthRegistry,
    metrics: PipelineMetrics,
    logger: EventLogger,
    config: IngestConfig,
}

impl IngestLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Box<dyn ReadingSource>,
        store: TelemetryStore,
        broadcast: Arc<BroadcastManager>,
        outlier_log: Arc<OutlierLog>,
        health: HealthRegistry,
        metrics: PipelineMetrics,
        logger: EventLogger,
        config: IngestConfig,
    ) -> Self {
        Self {
            source,
            averages: MovingAverageEngine::new(),
            detector: OutlierDetector::new(),
            aggregator: MinuteAggregator::new(),
            evaluator: AlertEvaluator::default(),
            store,
            broadcast,
            outlier_log,
            health,
            metrics,
            logger,
            config,
        }
    }

    /// Override the default alert thresholds
    pub fn with_thresholds(mut self, thresholds: ThresholdConfig) -> Self {
        self.evaluator = AlertEvaluator::new(thresholds);
        self
    }

    /// Override the default outlier detector tuning
    pub fn with_outlier_config(mut self, config: OutlierConfig) -> Self {
        self.detector = OutlierDetector::with_config(config);
        self
    }

    /// Run until the shutdown channel fires
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Starting ingestion loop"
        );

        let mut ticker = interval(self.config.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.cycle().await {
                        // A bad reading must never stop ingestion
                        error!(error = %e, "Reading processing failed");
                        let store = self.store.clone();
                        let detail = format!("{e:#}");
                        let _ = tokio::task::spawn_blocking(move || {
                            store.save_system_log(
                                "ERROR",
                                "ingest",
                                "reading processing failed",
                                Some(&detail),
                            )
                        })
                        .await;
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down ingestion loop");
                    break;
                }
            }
        }
    }

    async fn cycle(&mut self) -> Result<()> {
        // Nothing new is idle time, not an error
        let Some(reading) = self.source.poll().await? else {
            return Ok(());
        };
        self.process(reading).await
    }

    async fn process(&mut self, reading: Reading) -> Result<()> {
        let start = Instant::now();

        for metric in Metric::ALL {
            let value = reading.metric(metric);
            self.averages.add(metric, value);
            self.detector.add(metric, value);
        }

        let mut moving_averages = BTreeMap::new();
        let mut flagged: BTreeMap<Metric, OutlierVerdict> = BTreeMap::new();
        for metric in Metric::ALL {
            let value = reading.metric(metric);
            moving_averages.insert(metric.as_str(), self.averages.averages(metric));

            let verdict = self.detector.evaluate(metric, value);
            if verdict.is_outlier {
                self.metrics.inc_outliers_detected();
                self.logger.log_outlier(
                    metric.as_str(),
                    value,
                    verdict.score,
                    &verdict.method.to_string(),
                    &verdict.severity.to_string(),
                );
                self.outlier_log
                    .record(OutlierRecord {
                        timestamp: reading.timestamp,
                        metric,
                        value,
                        score: verdict.score,
                        method: verdict.method,
                        severity: verdict.severity,
                    })
                    .await;
                flagged.insert(metric, verdict);
            }
        }

        let summary = self.aggregator.add(&reading);
        if summary.is_some() {
            self.metrics.inc_minute_summaries();
        }

        let alerts = self.evaluator.evaluate(&reading);
        for alert in &alerts {
            self.metrics.inc_alerts_emitted();
            self.logger.log_alert(
                alert.metric_name.as_str(),
                alert.metric_value,
                alert.threshold_value,
                &alert.severity.to_string(),
            );
        }

        // Writes overlap with the wait for the next poll interval
        self.persist(reading.clone(), summary, alerts);

        let payload = EnrichedPayload {
            kind: "measurement",
            data: &reading,
            analysis: analysis(moving_averages, &flagged),
            timestamp: Utc::now().timestamp(),
        };
        let json = serde_json::to_string(&payload)?;
        self.broadcast.broadcast(&json);
        self.metrics
            .set_connected_observers(self.broadcast.observer_count() as i64);

        self.metrics.observe_ingest_latency(start.elapsed().as_secs_f64());
        self.metrics.inc_readings_ingested();
        Ok(())
    }

    /// Fire-and-forget persistence of one reading and anything it
    /// produced; failures are reported, never raised to the caller
    fn persist(&self, reading: Reading, summary: Option<MinuteSummary>, alerts: Vec<AlertEvent>) {
        let store = self.store.clone();
        let log_store = self.store.clone();
        let health = self.health.clone();
        let metrics = self.metrics.clone();
        let logger = self.logger.clone();

        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
                store.save_measurement(&reading)?;
                if let Some(summary) = &summary {
                    store.save_minute_summary(summary)?;
                }
                for alert in &alerts {
                    store.save_alert_event(alert)?;
                }
                Ok(())
            })
            .await;

            match result {
                Ok(Ok(())) => health.set_healthy(components::STORE).await,
                Ok(Err(e)) => {
                    metrics.inc_storage_errors();
                    logger.log_storage_error("save", &e.to_string());
                    health.set_degraded(components::STORE, e.to_string()).await;
                    let detail = e.to_string();
                    let _ = tokio::task::spawn_blocking(move || {
                        log_store.save_system_log(
                            "ERROR",
                            "store",
                            "persistence write failed",
                            Some(&detail),
                        )
                    })
                    .await;
                }
                Err(e) => error!(error = %e, "Persistence task panicked"),
            }
        });
    }
}

fn analysis(
    moving_averages: BTreeMap<&'static str, HorizonAverages>,
    flagged: &BTreeMap<Metric, OutlierVerdict>,
) -> ReadingAnalysis {
    let confidence = flagged
        .values()
        .map(|v| v.confidence)
        .fold(0.0f64, f64::max);
    ReadingAnalysis {
        has_outlier: !flagged.is_empty(),
        outlier_count: flagged.len(),
        confidence,
        moving_averages,
        outliers: flagged
            .iter()
            .map(|(metric, verdict)| {
                (
                    metric.as_str(),
                    OutlierFlag {
                        is_outlier: verdict.is_outlier,
                        score: verdict.score,
                        severity: verdict.severity,
                        method: verdict.method,
                    },
                )
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    struct ScriptedSource {
        script: VecDeque<Result<Option<Reading>>>,
    }

    #[async_trait]
    impl ReadingSource for ScriptedSource {
        async fn poll(&mut self) -> Result<Option<Reading>> {
            self.script.pop_front().unwrap_or(Ok(None))
        }
    }

    fn reading_at(timestamp: i64, temperature: f64) -> Reading {
        Reading {
            timestamp,
            temperature,
            humidity: 50.0,
            heat_index: temperature + 1.0,
            sequence_number: timestamp as u64,
            sensor_status: "ok".to_string(),
            simulation_mode: "diurnal".to_string(),
        }
    }

    fn test_loop(script: VecDeque<Result<Option<Reading>>>) -> (TempDir, IngestLoop) {
        let dir = TempDir::new().unwrap();
        let store = TelemetryStore::new(dir.path().join("telemetry.db"));
        store.initialize().unwrap();
        let ingest = IngestLoop::new(
            Box::new(ScriptedSource { script }),
            store,
            Arc::new(BroadcastManager::new()),
            Arc::new(OutlierLog::default()),
            HealthRegistry::new(),
            PipelineMetrics::new(),
            EventLogger::new("test"),
            IngestConfig {
                poll_interval: Duration::from_millis(5),
            },
        );
        (dir, ingest)
    }

    #[tokio::test]
    async fn test_process_broadcasts_enriched_payload() {
        let (_dir, mut ingest) = test_loop(VecDeque::new());
        let (tx, mut rx) = mpsc::channel(4);
        ingest.broadcast.connect(tx);

        ingest.process(reading_at(1_000, 25.0)).await.unwrap();

        let json = rx.recv().await.unwrap();
        let payload: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(payload["type"], "measurement");
        assert_eq!(payload["data"]["temperature"], 25.0);
        assert_eq!(payload["analysis"]["has_outlier"], false);
        assert_eq!(payload["analysis"]["outlier_count"], 0);
        assert_eq!(payload["analysis"]["moving_averages"]["temperature"]["1m"], 25.0);
        assert!(payload["timestamp"].is_i64());
    }

    #[tokio::test]
    async fn test_outlier_reflected_in_payload_and_log() {
        let (_dir, mut ingest) = test_loop(VecDeque::new());
        let (tx, mut rx) = mpsc::channel(256);
        ingest.broadcast.connect(tx);

        // Warm the histories past the cold-start guard with mild variance
        for i in 0..100i64 {
            let wobble = if i % 2 == 0 { 20.0 } else { 20.5 };
            ingest.process(reading_at(1_000 + i, wobble)).await.unwrap();
        }
        // An obvious spike, still below the alert thresholds
        ingest.process(reading_at(1_200, 35.0)).await.unwrap();

        let mut last = None;
        while let Ok(json) = rx.try_recv() {
            last = Some(json);
        }
        let payload: serde_json::Value = serde_json::from_str(&last.unwrap()).unwrap();
        assert_eq!(payload["analysis"]["has_outlier"], true);
        assert_eq!(payload["analysis"]["outliers"]["temperature"]["is_outlier"], true);
        assert!(payload["analysis"]["confidence"].as_f64().unwrap() > 0.0);

        let recent = ingest.outlier_log.recent(10).await;
        assert!(!recent.is_empty());
        assert_eq!(recent[0].metric, Metric::Temperature);
    }

    #[tokio::test]
    async fn test_rollover_summary_is_persisted() {
        let (_dir, mut ingest) = test_loop(VecDeque::new());
        for i in 0..60i64 {
            ingest.process(reading_at(1_000 + i, 20.0 + i as f64)).await.unwrap();
        }
        ingest.process(reading_at(1_060, 20.0)).await.unwrap();

        // Writes are fire-and-forget; give them a moment to land
        tokio::time::sleep(Duration::from_millis(200)).await;
        let summaries = ingest.store.minute_summaries(u32::MAX).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].sample_count, 60);
        assert_eq!(summaries[0].temperature_max, 79.0);
    }

    #[tokio::test]
    async fn test_source_error_does_not_stop_the_loop() {
        let mut script: VecDeque<Result<Option<Reading>>> = VecDeque::new();
        script.push_back(Err(anyhow::anyhow!("sensor bus stalled")));
        script.push_back(Ok(Some(reading_at(2_000, 21.0))));
        let (_dir, ingest) = test_loop(script);
        let store = ingest.store.clone();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(ingest.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(150)).await;
        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop should exit on shutdown")
            .unwrap();

        // The failure went to system_logs and the next reading was still processed
        let logs = store.system_logs(1, Some("ERROR"), Some("ingest")).unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].details.as_deref().unwrap().contains("sensor bus stalled"));

        let measurements = store.recent_measurements(u32::MAX, None).unwrap();
        assert_eq!(measurements.len(), 1);
        assert_eq!(measurements[0].temperature, 21.0);
    }
}
