//! Observability for the telemetry pipeline
//!
//! Provides:
//! - Prometheus metrics (ingest latency, reading/outlier/alert counters,
//!   connected observers, storage errors)
//! - Structured event logging with tracing

use prometheus::{register_histogram, register_int_gauge, Histogram, IntGauge};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for per-reading processing latency (seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PipelineMetricsInner> = OnceLock::new();

struct PipelineMetricsInner {
    ingest_latency_seconds: Histogram,
    readings_ingested: IntGauge,
    outliers_detected: IntGauge,
    alerts_emitted: IntGauge,
    minute_summaries: IntGauge,
    storage_errors: IntGauge,
    connected_observers: IntGauge,
}

impl PipelineMetricsInner {
    fn new() -> Self {
        Self {
            ingest_latency_seconds: register_histogram!(
                "telemetry_pipeline_ingest_latency_seconds",
                "Time spent processing a single reading",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register ingest_latency_seconds"),

            readings_ingested: register_int_gauge!(
                "telemetry_pipeline_readings_ingested_total",
                "Total number of readings processed"
            )
            .expect("Failed to register readings_ingested_total"),

            outliers_detected: register_int_gauge!(
                "telemetry_pipeline_outliers_detected_total",
                "Total number of metric values flagged as outliers"
            )
            .expect("Failed to register outliers_detected_total"),

            alerts_emitted: register_int_gauge!(
                "telemetry_pipeline_alerts_emitted_total",
                "Total number of threshold alert events emitted"
            )
            .expect("Failed to register alerts_emitted_total"),

            minute_summaries: register_int_gauge!(
                "telemetry_pipeline_minute_summaries_total",
                "Total number of minute rollups finalized"
            )
            .expect("Failed to register minute_summaries_total"),

            storage_errors: register_int_gauge!(
                "telemetry_pipeline_storage_errors_total",
                "Total number of failed persistence operations"
            )
            .expect("Failed to register storage_errors_total"),

            connected_observers: register_int_gauge!(
                "telemetry_pipeline_connected_observers",
                "Number of currently registered broadcast observers"
            )
            .expect("Failed to register connected_observers"),
        }
    }
}

/// Pipeline metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share
/// the same underlying metrics.
#[derive(Clone)]
pub struct PipelineMetrics {
    _private: (),
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PipelineMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_ingest_latency(&self, duration_secs: f64) {
        self.inner().ingest_latency_seconds.observe(duration_secs);
    }

    pub fn inc_readings_ingested(&self) {
        self.inner().readings_ingested.inc();
    }

    pub fn inc_outliers_detected(&self) {
        self.inner().outliers_detected.inc();
    }

    pub fn inc_alerts_emitted(&self) {
        self.inner().alerts_emitted.inc();
    }

    pub fn inc_minute_summaries(&self) {
        self.inner().minute_summaries.inc();
    }

    pub fn inc_storage_errors(&self) {
        self.inner().storage_errors.inc();
    }

    pub fn set_connected_observers(&self, count: i64) {
        self.inner().connected_observers.set(count);
    }
}

/// Structured logger for significant pipeline events
#[derive(Clone)]
pub struct EventLogger {
    source_name: String,
}

impl EventLogger {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
        }
    }

    pub fn log_startup(&self, version: &str) {
        info!(
            event = "pipeline_started",
            source = %self.source_name,
            pipeline_version = %version,
            "Telemetry pipeline started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "pipeline_shutdown",
            source = %self.source_name,
            reason = %reason,
            "Telemetry pipeline shutting down"
        );
    }

    /// Log a flagged metric value
    pub fn log_outlier(
        &self,
        metric: &str,
        value: f64,
        score: f64,
        method: &str,
        severity: &str,
    ) {
        info!(
            event = "outlier_detected",
            source = %self.source_name,
            metric = %metric,
            value = value,
            score = score,
            method = %method,
            severity = %severity,
            "Outlier detected"
        );
    }

    /// Log an emitted threshold alert
    pub fn log_alert(&self, metric: &str, value: f64, threshold: f64, severity: &str) {
        match severity {
            "critical" => {
                warn!(
                    event = "alert_emitted",
                    source = %self.source_name,
                    metric = %metric,
                    value = value,
                    threshold = threshold,
                    severity = %severity,
                    "Threshold violation"
                );
            }
            _ => {
                info!(
                    event = "alert_emitted",
                    source = %self.source_name,
                    metric = %metric,
                    value = value,
                    threshold = threshold,
                    severity = %severity,
                    "Threshold warning"
                );
            }
        }
    }

    /// Log a failed persistence operation
    pub fn log_storage_error(&self, operation: &str, error: &str) {
        warn!(
            event = "storage_error",
            source = %self.source_name,
            operation = %operation,
            error = %error,
            "Persistence operation failed, will retry on next write"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_metrics_observations() {
        let metrics = PipelineMetrics::new();
        metrics.observe_ingest_latency(0.002);
        metrics.inc_readings_ingested();
        metrics.inc_outliers_detected();
        metrics.inc_alerts_emitted();
        metrics.inc_minute_summaries();
        metrics.inc_storage_errors();
        metrics.set_connected_observers(3);
    }

    #[test]
    fn test_event_logger_creation() {
        let logger = EventLogger::new("sensor-0");
        assert_eq!(logger.source_name, "sensor-0");
    }
}
