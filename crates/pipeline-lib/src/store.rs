//! SQLite persistence for readings, rollups, alerts and system logs
//!
//! The store handle is a path plus open flags; every operation opens
//! its own connection, so handles can be cloned freely across tasks
//! without shared connection state. WAL mode and a busy timeout keep
//! the retention task from blocking the ingestion loop's writes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant};
use tracing::{debug, error, info};

use crate::alert::AlertEvent;
use crate::models::{Metric, MinuteSummary, Reading};

/// Default retention horizon (48 hours)
const DEFAULT_RETENTION: Duration = Duration::from_secs(48 * 60 * 60);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS measurements (
    timestamp        INTEGER NOT NULL,
    temperature      REAL    NOT NULL,
    humidity         REAL    NOT NULL,
    heat_index       REAL    NOT NULL,
    sequence_number  INTEGER NOT NULL,
    sensor_status    TEXT    NOT NULL,
    simulation_mode  TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_measurements_ts ON measurements(timestamp);

CREATE TABLE IF NOT EXISTS minute_summaries (
    minute_timestamp INTEGER NOT NULL UNIQUE,
    temperature_min  REAL    NOT NULL,
    temperature_max  REAL    NOT NULL,
    temperature_avg  REAL    NOT NULL,
    humidity_min     REAL    NOT NULL,
    humidity_max     REAL    NOT NULL,
    humidity_avg     REAL    NOT NULL,
    heat_index_min   REAL    NOT NULL,
    heat_index_max   REAL    NOT NULL,
    heat_index_avg   REAL    NOT NULL,
    sample_count     INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS alert_events (
    timestamp        INTEGER NOT NULL,
    alert_type       TEXT    NOT NULL,
    metric_name      TEXT    NOT NULL,
    metric_value     REAL    NOT NULL,
    threshold_value  REAL    NOT NULL,
    severity         TEXT    NOT NULL,
    message          TEXT    NOT NULL,
    resolved_at      INTEGER
);
CREATE INDEX IF NOT EXISTS idx_alert_events_ts ON alert_events(timestamp);

CREATE TABLE IF NOT EXISTS system_logs (
    timestamp        INTEGER NOT NULL,
    level            TEXT    NOT NULL,
    component        TEXT    NOT NULL,
    message          TEXT    NOT NULL,
    details          TEXT
);
CREATE INDEX IF NOT EXISTS idx_system_logs_ts ON system_logs(timestamp);
";

/// Storage failure taxonomy
///
/// Every variant is transient from the pipeline's point of view:
/// callers log and retry on the next natural write opportunity.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open telemetry database {path}: {source}")]
    Open {
        source: rusqlite::Error,
        path: PathBuf,
    },
    #[error("storage execution error: {0}")]
    Execute(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A free-form operational log row
#[derive(Debug, Clone, Serialize)]
pub struct SystemLogEntry {
    pub timestamp: i64,
    pub level: String,
    pub component: String,
    pub message: String,
    pub details: Option<String>,
}

/// Per-metric mean and variability over a query window
#[derive(Debug, Clone, Serialize)]
pub struct MetricWindowStats {
    pub metric: Metric,
    pub mean: f64,
    pub std_dev: f64,
    pub samples: u64,
}

/// Rows removed by one cleanup pass
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupReport {
    pub measurements: usize,
    pub minute_summaries: usize,
    pub alert_events: usize,
    pub system_logs: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.measurements + self.minute_summaries + self.alert_events + self.system_logs
    }
}

/// Handle to the telemetry database
#[derive(Debug, Clone)]
pub struct TelemetryStore {
    path: PathBuf,
    flags: OpenFlags,
    retention: Duration,
}

impl TelemetryStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            flags: OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
            retention: DEFAULT_RETENTION,
        }
    }

    /// Override the 48-hour retention horizon
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    fn connection(&self) -> Result<Connection, StoreError> {
        let conn =
            Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
                StoreError::Open {
                    source,
                    path: self.path.clone(),
                }
            })?;
        conn.busy_timeout(Duration::from_secs(5))
            .and_then(|_| conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(())))
            .and_then(|_| conn.execute_batch("PRAGMA synchronous = NORMAL;"))
            .map_err(|source| StoreError::Open {
                source,
                path: self.path.clone(),
            })?;
        Ok(conn)
    }

    /// Create tables and indexes if they do not exist
    pub fn initialize(&self) -> Result<(), StoreError> {
        let conn = self.connection()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn save_measurement(&self, reading: &Reading) -> Result<(), StoreError> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO measurements (
                timestamp, temperature, humidity, heat_index,
                sequence_number, sensor_status, simulation_mode
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                reading.timestamp,
                reading.temperature,
                reading.humidity,
                reading.heat_index,
                reading.sequence_number as i64,
                reading.sensor_status,
                reading.simulation_mode,
            ],
        )?;
        Ok(())
    }

    /// Upsert keyed by `minute_timestamp`: a second write for the same
    /// minute replaces the first, never duplicates
    pub fn save_minute_summary(&self, summary: &MinuteSummary) -> Result<(), StoreError> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO minute_summaries (
                minute_timestamp,
                temperature_min, temperature_max, temperature_avg,
                humidity_min, humidity_max, humidity_avg,
                heat_index_min, heat_index_max, heat_index_avg,
                sample_count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(minute_timestamp) DO UPDATE SET
                temperature_min = excluded.temperature_min,
                temperature_max = excluded.temperature_max,
                temperature_avg = excluded.temperature_avg,
                humidity_min = excluded.humidity_min,
                humidity_max = excluded.humidity_max,
                humidity_avg = excluded.humidity_avg,
                heat_index_min = excluded.heat_index_min,
                heat_index_max = excluded.heat_index_max,
                heat_index_avg = excluded.heat_index_avg,
                sample_count = excluded.sample_count",
            params![
                summary.minute_timestamp,
                summary.temperature_min,
                summary.temperature_max,
                summary.temperature_avg,
                summary.humidity_min,
                summary.humidity_max,
                summary.humidity_avg,
                summary.heat_index_min,
                summary.heat_index_max,
                summary.heat_index_avg,
                summary.sample_count,
            ],
        )?;
        Ok(())
    }

    pub fn save_alert_event(&self, event: &AlertEvent) -> Result<(), StoreError> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO alert_events (
                timestamp, alert_type, metric_name, metric_value,
                threshold_value, severity, message, resolved_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.timestamp,
                event.alert_type.to_string(),
                event.metric_name.as_str(),
                event.metric_value,
                event.threshold_value,
                event.severity.to_string(),
                event.message,
                event.resolved_at,
            ],
        )?;
        Ok(())
    }

    pub fn save_system_log(
        &self,
        level: &str,
        component: &str,
        message: &str,
        details: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO system_logs (timestamp, level, component, message, details)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![Utc::now().timestamp(), level, component, message, details],
        )?;
        Ok(())
    }

    /// Readings within the window, newest first
    pub fn recent_measurements(
        &self,
        hours: u32,
        limit: Option<u32>,
    ) -> Result<Vec<Reading>, StoreError> {
        let conn = self.connection()?;
        let cutoff = window_cutoff(hours);
        let mut stmt = conn.prepare(
            "SELECT timestamp, temperature, humidity, heat_index,
                    sequence_number, sensor_status, simulation_mode
             FROM measurements
             WHERE timestamp >= ?1
             ORDER BY timestamp DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(
            params![cutoff, limit.map(i64::from).unwrap_or(-1)],
            |row| {
                Ok(Reading {
                    timestamp: row.get(0)?,
                    temperature: row.get(1)?,
                    humidity: row.get(2)?,
                    heat_index: row.get(3)?,
                    sequence_number: row.get::<_, i64>(4)? as u64,
                    sensor_status: row.get(5)?,
                    simulation_mode: row.get(6)?,
                })
            },
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Minute summaries within the window, newest first
    pub fn minute_summaries(&self, hours: u32) -> Result<Vec<MinuteSummary>, StoreError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT minute_timestamp,
                    temperature_min, temperature_max, temperature_avg,
                    humidity_min, humidity_max, humidity_avg,
                    heat_index_min, heat_index_max, heat_index_avg,
                    sample_count
             FROM minute_summaries
             WHERE minute_timestamp >= ?1
             ORDER BY minute_timestamp DESC",
        )?;
        let rows = stmt.query_map(params![window_cutoff(hours)], |row| {
            Ok(MinuteSummary {
                minute_timestamp: row.get(0)?,
                temperature_min: row.get(1)?,
                temperature_max: row.get(2)?,
                temperature_avg: row.get(3)?,
                humidity_min: row.get(4)?,
                humidity_max: row.get(5)?,
                humidity_avg: row.get(6)?,
                heat_index_min: row.get(7)?,
                heat_index_max: row.get(8)?,
                heat_index_avg: row.get(9)?,
                sample_count: row.get(10)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Alert events within the window, optionally filtered by severity,
    /// newest first
    pub fn alert_events(
        &self,
        hours: u32,
        severity: Option<&str>,
    ) -> Result<Vec<AlertEvent>, StoreError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp, alert_type, metric_name, metric_value,
                    threshold_value, severity, message, resolved_at
             FROM alert_events
             WHERE timestamp >= ?1 AND (?2 IS NULL OR severity = ?2)
             ORDER BY timestamp DESC",
        )?;
        let rows = stmt.query_map(params![window_cutoff(hours), severity], |row| {
            Ok(AlertEvent {
                timestamp: row.get(0)?,
                alert_type: parse_tag(row, 1)?,
                metric_name: parse_tag(row, 2)?,
                metric_value: row.get(3)?,
                threshold_value: row.get(4)?,
                severity: parse_tag(row, 5)?,
                message: row.get(6)?,
                resolved_at: row.get(7)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// System logs within the window, optionally filtered by level and
    /// component, newest first
    pub fn system_logs(
        &self,
        hours: u32,
        level: Option<&str>,
        component: Option<&str>,
    ) -> Result<Vec<SystemLogEntry>, StoreError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp, level, component, message, details
             FROM system_logs
             WHERE timestamp >= ?1
               AND (?2 IS NULL OR level = ?2)
               AND (?3 IS NULL OR component = ?3)
             ORDER BY timestamp DESC",
        )?;
        let rows = stmt.query_map(params![window_cutoff(hours), level, component], |row| {
            Ok(SystemLogEntry {
                timestamp: row.get(0)?,
                level: row.get(1)?,
                component: row.get(2)?,
                message: row.get(3)?,
                details: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Per-metric mean and sample standard deviation over the window
    pub fn window_stats(&self, hours: u32) -> Result<Vec<MetricWindowStats>, StoreError> {
        let conn = self.connection()?;
        let mut stats = Vec::with_capacity(Metric::ALL.len());
        for metric in Metric::ALL {
            let column = metric.as_str();
            let sql = format!(
                "SELECT COUNT(*), COALESCE(AVG({column}), 0.0),
                        COALESCE(AVG({column} * {column}), 0.0)
                 FROM measurements WHERE timestamp >= ?1"
            );
            let (samples, mean, mean_sq): (i64, f64, f64) = conn.query_row(
                &sql,
                params![window_cutoff(hours)],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
            let std_dev = if samples > 1 {
                let n = samples as f64;
                ((mean_sq - mean * mean).max(0.0) * n / (n - 1.0)).sqrt()
            } else {
                0.0
            };
            stats.push(MetricWindowStats {
                metric,
                mean,
                std_dev,
                samples: samples as u64,
            });
        }
        Ok(stats)
    }

    /// Delete rows older than the retention horizon from every table
    ///
    /// Unresolved alert events are exempt: only rows whose
    /// `resolved_at` is set become eligible for deletion.
    pub fn cleanup_old_data(&self) -> Result<CleanupReport, StoreError> {
        let conn = self.connection()?;
        let cutoff = Utc::now().timestamp() - self.retention.as_secs() as i64;
        let report = CleanupReport {
            measurements: conn.execute(
                "DELETE FROM measurements WHERE timestamp < ?1",
                params![cutoff],
            )?,
            minute_summaries: conn.execute(
                "DELETE FROM minute_summaries WHERE minute_timestamp < ?1",
                params![cutoff],
            )?,
            alert_events: conn.execute(
                "DELETE FROM alert_events WHERE timestamp < ?1 AND resolved_at IS NOT NULL",
                params![cutoff],
            )?,
            system_logs: conn.execute(
                "DELETE FROM system_logs WHERE timestamp < ?1",
                params![cutoff],
            )?,
        };
        Ok(report)
    }

    /// Reclaim space freed by cleanup passes
    pub fn compact(&self) -> Result<(), StoreError> {
        let conn = self.connection()?;
        conn.execute_batch("VACUUM;")?;
        Ok(())
    }

    /// Snapshot the database to `dest`
    ///
    /// The destination must not already exist.
    pub fn backup(&self, dest: &Path) -> Result<(), StoreError> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = self.connection()?;
        let dest = dest.to_string_lossy().into_owned();
        conn.execute("VACUUM INTO ?1", params![dest])?;
        Ok(())
    }
}

fn window_cutoff(hours: u32) -> i64 {
    Utc::now().timestamp() - i64::from(hours) * 3600
}

/// Parse a TEXT tag column back into its serde-tagged enum
fn parse_tag<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    index: usize,
) -> rusqlite::Result<T> {
    let raw: String = row.get(index)?;
    serde_json::from_value(serde_json::Value::String(raw)).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

/// Cadence of the background retention task
#[derive(Debug, Clone)]
pub struct RetentionTaskConfig {
    /// How often the cleanup pass runs (default: 1 hour)
    pub cleanup_interval: Duration,
    /// How often compaction runs (default: 6 hours)
    pub compact_interval: Duration,
}

impl Default for RetentionTaskConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(60 * 60),
            compact_interval: Duration::from_secs(6 * 60 * 60),
        }
    }
}

/// Periodic retention and compaction, independent of the ingestion loop
///
/// Runs with its own store handle so storage maintenance never holds
/// anything the loop's persistence calls need.
pub async fn run_retention_task(
    store: TelemetryStore,
    config: RetentionTaskConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!(
        cleanup_interval_secs = config.cleanup_interval.as_secs(),
        compact_interval_secs = config.compact_interval.as_secs(),
        "Starting retention task"
    );

    let mut ticker = interval(config.cleanup_interval);
    let mut last_compact = Instant::now();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let handle = store.clone();
                match tokio::task::spawn_blocking(move || handle.cleanup_old_data()).await {
                    Ok(Ok(report)) => {
                        if report.total() > 0 {
                            debug!(
                                measurements = report.measurements,
                                minute_summaries = report.minute_summaries,
                                alert_events = report.alert_events,
                                system_logs = report.system_logs,
                                "Retention cleanup removed expired rows"
                            );
                        }
                    }
                    Ok(Err(e)) => {
                        error!(error = %e, "Retention cleanup failed");
                        let handle = store.clone();
                        let detail = e.to_string();
                        let _ = tokio::task::spawn_blocking(move || {
                            handle.save_system_log("ERROR", "retention", "cleanup failed", Some(&detail))
                        })
                        .await;
                    }
                    Err(e) => error!(error = %e, "Retention cleanup task panicked"),
                }

                if last_compact.elapsed() >= config.compact_interval {
                    last_compact = Instant::now();
                    let handle = store.clone();
                    match tokio::task::spawn_blocking(move || handle.compact()).await {
                        Ok(Ok(())) => debug!("Storage compaction complete"),
                        Ok(Err(e)) => error!(error = %e, "Storage compaction failed"),
                        Err(e) => error!(error = %e, "Compaction task panicked"),
                    }
                }
            }
            _ = shutdown.recv() => {
                info!("Shutting down retention task");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertSeverity, AlertType};
    use tempfile::TempDir;

    fn test_store() -> (TempDir, TelemetryStore) {
        let dir = TempDir::new().unwrap();
        let store = TelemetryStore::new(dir.path().join("telemetry.db"));
        store.initialize().unwrap();
        (dir, store)
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

    fn summary_at(minute_timestamp: i64, temperature_avg: f64) -> MinuteSummary {
        MinuteSummary {
            minute_timestamp,
            temperature_min: temperature_avg - 1.0,
            temperature_max: temperature_avg + 1.0,
            temperature_avg,
            humidity_min: 40.0,
            humidity_max: 60.0,
            humidity_avg: 50.0,
            heat_index_min: 20.0,
            heat_index_max: 25.0,
            heat_index_avg: 22.0,
            sample_count: 60,
        }
    }

    fn alert_at(timestamp: i64, resolved_at: Option<i64>) -> AlertEvent {
        AlertEvent {
            timestamp,
            alert_type: AlertType::Violation,
            metric_name: Metric::Temperature,
            metric_value: 42.0,
            threshold_value: 40.0,
            severity: AlertSeverity::Critical,
            message: "temperature 42.00 exceeds maximum threshold 40.00".to_string(),
            resolved_at,
        }
    }

    #[test]
    fn test_measurement_roundtrip() {
        let (_dir, store) = test_store();
        let now = Utc::now().timestamp();
        store.save_measurement(&reading_at(now, 21.5)).unwrap();

        let rows = store.recent_measurements(1, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].temperature, 21.5);
        assert_eq!(rows[0].sensor_status, "ok");
    }

    #[test]
    fn test_recent_measurements_window_and_limit() {
        let (_dir, store) = test_store();
        let now = Utc::now().timestamp();
        for i in 0..5 {
            store.save_measurement(&reading_at(now - i * 60, 20.0 + i as f64)).unwrap();
        }
        // Reading far outside the 1-hour window
        store.save_measurement(&reading_at(now - 7200, 99.0)).unwrap();

        let rows = store.recent_measurements(1, None).unwrap();
        assert_eq!(rows.len(), 5);
        // Newest first
        assert_eq!(rows[0].temperature, 20.0);

        let limited = store.recent_measurements(1, Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn test_minute_summary_upsert_replaces() {
        let (_dir, store) = test_store();
        let minute = Utc::now().timestamp();
        store.save_minute_summary(&summary_at(minute, 20.0)).unwrap();
        store.save_minute_summary(&summary_at(minute, 30.0)).unwrap();

        let rows = store.minute_summaries(1).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].temperature_avg, 30.0);
    }

    #[test]
    fn test_alert_event_roundtrip_and_severity_filter() {
        let (_dir, store) = test_store();
        let now = Utc::now().timestamp();
        store.save_alert_event(&alert_at(now, None)).unwrap();
        let mut warning = alert_at(now, None);
        warning.alert_type = AlertType::Warning;
        warning.severity = AlertSeverity::Warning;
        store.save_alert_event(&warning).unwrap();

        let all = store.alert_events(1, None).unwrap();
        assert_eq!(all.len(), 2);

        let critical = store.alert_events(1, Some("critical")).unwrap();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].alert_type, AlertType::Violation);
        assert_eq!(critical[0].metric_name, Metric::Temperature);
    }

    #[test]
    fn test_system_log_filters() {
        let (_dir, store) = test_store();
        store.save_system_log("ERROR", "ingest", "boom", Some("details")).unwrap();
        store.save_system_log("INFO", "retention", "pass complete", None).unwrap();

        let errors = store.system_logs(1, Some("ERROR"), None).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].component, "ingest");
        assert_eq!(errors[0].details.as_deref(), Some("details"));

        let retention = store.system_logs(1, None, Some("retention")).unwrap();
        assert_eq!(retention.len(), 1);
        assert_eq!(retention[0].level, "INFO");
    }

    #[test]
    fn test_cleanup_removes_only_expired_rows() {
        let (_dir, store) = test_store();
        let now = Utc::now().timestamp();
        let expired = now - 49 * 3600;
        store.save_measurement(&reading_at(expired, 15.0)).unwrap();
        store.save_measurement(&reading_at(now - 3600, 22.0)).unwrap();

        let report = store.cleanup_old_data().unwrap();
        assert_eq!(report.measurements, 1);

        let rows = store.recent_measurements(50, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].temperature, 22.0);
    }

    #[test]
    fn test_cleanup_keeps_unresolved_alerts() {
        let (_dir, store) = test_store();
        let expired = Utc::now().timestamp() - 49 * 3600;
        store.save_alert_event(&alert_at(expired, None)).unwrap();
        store
            .save_alert_event(&alert_at(expired, Some(expired + 60)))
            .unwrap();

        let report = store.cleanup_old_data().unwrap();
        assert_eq!(report.alert_events, 1);

        let remaining = store.alert_events(100, None).unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].resolved_at.is_none());
    }

    #[test]
    fn test_window_stats() {
        let (_dir, store) = test_store();
        let now = Utc::now().timestamp();
        for (i, value) in [10.0, 20.0, 30.0].iter().enumerate() {
            store.save_measurement(&reading_at(now - i as i64, *value)).unwrap();
        }

        let stats = store.window_stats(1).unwrap();
        let temperature = stats
            .iter()
            .find(|s| s.metric == Metric::Temperature)
            .unwrap();
        assert_eq!(temperature.samples, 3);
        assert!((temperature.mean - 20.0).abs() < 1e-9);
        assert!((temperature.std_dev - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_backup_creates_snapshot() {
        let (dir, store) = test_store();
        let now = Utc::now().timestamp();
        store.save_measurement(&reading_at(now, 21.0)).unwrap();

        let dest = dir.path().join("snapshots").join("backup.db");
        store.backup(&dest).unwrap();
        assert!(dest.exists());

        let restored = TelemetryStore::new(&dest);
        let rows = restored.recent_measurements(1, None).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_compact_runs() {
        let (_dir, store) = test_store();
        store.compact().unwrap();
    }

    #[tokio::test]
    async fn test_retention_task_shuts_down() {
        let dir = TempDir::new().unwrap();
        let store = TelemetryStore::new(dir.path().join("telemetry.db"));
        store.initialize().unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(run_retention_task(
            store,
            RetentionTaskConfig {
                cleanup_interval: Duration::from_millis(10),
                compact_interval: Duration::from_secs(3600),
            },
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("retention task should exit on shutdown")
            .unwrap();
    }
}
