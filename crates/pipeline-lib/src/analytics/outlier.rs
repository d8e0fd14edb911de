//! Dual-method outlier detection
//!
//! Maintains a bounded per-metric history and evaluates each new value
//! with two independent statistical tests:
//! - Z-score against the history mean and standard deviation
//! - IQR fences around the first and third quartile
//!
//! Detection stays inactive until enough history has accumulated
//! (cold-start guard). Degenerate statistics (zero standard deviation,
//! zero IQR) resolve to "not an outlier", never to an error.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::Serialize;
use tokio::sync::RwLock;

use crate::models::Metric;

/// Detector tuning knobs
#[derive(Debug, Clone)]
pub struct OutlierConfig {
    /// Samples required before either test may flag an outlier
    pub min_samples: usize,
    /// Z-score above which a value is an outlier
    pub z_threshold: f64,
    /// IQR fence multiplier
    pub iqr_multiplier: f64,
    /// Per-metric history capacity
    pub history_capacity: usize,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            min_samples: 30,
            z_threshold: 2.5,
            iqr_multiplier: 1.5,
            history_capacity: 1000,
        }
    }
}

/// Which test produced the reported score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierMethod {
    Zscore,
    Iqr,
}

impl std::fmt::Display for OutlierMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutlierMethod::Zscore => write!(f, "zscore"),
            OutlierMethod::Iqr => write!(f, "iqr"),
        }
    }
}

/// Severity bucket derived from the winning score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierSeverity {
    Mild,
    Moderate,
    Severe,
}

impl std::fmt::Display for OutlierSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutlierSeverity::Mild => write!(f, "mild"),
            OutlierSeverity::Moderate => write!(f, "moderate"),
            OutlierSeverity::Severe => write!(f, "severe"),
        }
    }
}

/// Result of evaluating one value against one metric's history
///
/// Ephemeral: recomputed per reading, embedded in broadcast payloads,
/// never persisted on its own.
#[derive(Debug, Clone, Serialize)]
pub struct OutlierVerdict {
    pub is_outlier: bool,
    pub method: OutlierMethod,
    pub score: f64,
    pub z_score: f64,
    pub iqr_score: f64,
    pub severity: OutlierSeverity,
    pub confidence: f64,
    pub sample_count: usize,
}

/// Per-metric bounded histories plus the two statistical tests
///
/// Exclusively owned by the ingestion loop; no internal locking.
#[derive(Debug, Default)]
pub struct OutlierDetector {
    config: OutlierConfig,
    histories: HashMap<Metric, VecDeque<f64>>,
}

impl OutlierDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: OutlierConfig) -> Self {
        Self {
            config,
            histories: HashMap::new(),
        }
    }

    /// Append a value to the metric's history, evicting the oldest
    /// entry beyond capacity
    pub fn add(&mut self, metric: Metric, value: f64) {
        let history = self.histories.entry(metric).or_default();
        if history.len() == self.config.history_capacity {
            history.pop_front();
        }
        history.push_back(value);
    }

    /// Evaluate a value against the metric's history
    ///
    /// The history is expected to already contain the value, i.e. call
    /// [`add`](Self::add) first. Never fails; degenerate statistics
    /// resolve to a not-outlier verdict.
    pub fn evaluate(&self, metric: Metric, value: f64) -> OutlierVerdict {
        static EMPTY: VecDeque<f64> = VecDeque::new();
        let history = self.histories.get(&metric).unwrap_or(&EMPTY);
        let n = history.len();

        let (z_score, z_outlier) = self.z_score_test(history, value);
        let (iqr_score, iqr_outlier) = self.iqr_test(history, value);

        let is_outlier = z_outlier || iqr_outlier;
        let (method, score) = if iqr_score > z_score {
            (OutlierMethod::Iqr, iqr_score)
        } else {
            (OutlierMethod::Zscore, z_score)
        };

        OutlierVerdict {
            is_outlier,
            method,
            score,
            z_score,
            iqr_score,
            severity: severity_for(score),
            confidence: (n as f64 / 100.0).min(1.0),
            sample_count: n,
        }
    }

    fn z_score_test(&self, history: &VecDeque<f64>, value: f64) -> (f64, bool) {
        let n = history.len();
        if n < self.config.min_samples {
            return (0.0, false);
        }
        let mean = history.iter().sum::<f64>() / n as f64;
        // Sample variance (Bessel's correction)
        let variance =
            history.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        let stdev = variance.sqrt();
        if stdev < f64::EPSILON {
            return (0.0, false);
        }
        let z = ((value - mean) / stdev).abs();
        (z, z > self.config.z_threshold)
    }

    fn iqr_test(&self, history: &VecDeque<f64>, value: f64) -> (f64, bool) {
        let n = history.len();
        if n < self.config.min_samples {
            return (0.0, false);
        }
        let mut sorted: Vec<f64> = history.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        // Truncating positional quartiles, not interpolated quantiles
        let q1 = sorted[n / 4];
        let q3 = sorted[3 * n / 4];
        let iqr = q3 - q1;
        if iqr < f64::EPSILON {
            return (0.0, false);
        }

        let lower = q1 - self.config.iqr_multiplier * iqr;
        let upper = q3 + self.config.iqr_multiplier * iqr;
        let score = if value < lower {
            (lower - value) / iqr
        } else if value > upper {
            (value - upper) / iqr
        } else {
            0.0
        };
        (score, score > 0.0)
    }
}

fn severity_for(score: f64) -> OutlierSeverity {
    if score > 4.0 {
        OutlierSeverity::Severe
    } else if score > 2.5 {
        OutlierSeverity::Moderate
    } else {
        OutlierSeverity::Mild
    }
}

/// A flagged reading retained for the outlier query surface
#[derive(Debug, Clone, Serialize)]
pub struct OutlierRecord {
    pub timestamp: i64,
    pub metric: Metric,
    pub value: f64,
    pub score: f64,
    pub method: OutlierMethod,
    pub severity: OutlierSeverity,
}

/// Aggregate view over the flagged readings seen so far
#[derive(Debug, Clone, Serialize)]
pub struct OutlierSummary {
    pub total_flagged: u64,
    pub by_metric: BTreeMap<String, u64>,
    pub latest: Option<OutlierRecord>,
}

#[derive(Debug, Default)]
struct OutlierLogInner {
    records: VecDeque<OutlierRecord>,
    totals: BTreeMap<Metric, u64>,
    total_flagged: u64,
}

/// Bounded in-memory log of flagged readings
///
/// Verdicts are never persisted, so this log is what backs the outlier
/// query surface. Written by the ingestion loop, read concurrently by
/// the API layer.
#[derive(Debug)]
pub struct OutlierLog {
    capacity: usize,
    inner: RwLock<OutlierLogInner>,
}

impl OutlierLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(OutlierLogInner::default()),
        }
    }

    pub async fn record(&self, record: OutlierRecord) {
        let mut inner = self.inner.write().await;
        if inner.records.len() == self.capacity {
            inner.records.pop_front();
        }
        *inner.totals.entry(record.metric).or_insert(0) += 1;
        inner.total_flagged += 1;
        inner.records.push_back(record);
    }

    /// Most recent flagged readings, newest first
    pub async fn recent(&self, limit: usize) -> Vec<OutlierRecord> {
        let inner = self.inner.read().await;
        inner.records.iter().rev().take(limit).cloned().collect()
    }

    pub async fn summary(&self) -> OutlierSummary {
        let inner = self.inner.read().await;
        OutlierSummary {
            total_flagged: inner.total_flagged,
            by_metric: inner
                .totals
                .iter()
                .map(|(metric, count)| (metric.as_str().to_string(), *count))
                .collect(),
            latest: inner.records.back().cloned(),
        }
    }
}

impl Default for OutlierLog {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector_with(values: &[f64]) -> OutlierDetector {
        let mut detector = OutlierDetector::new();
        for &v in values {
            detector.add(Metric::Temperature, v);
        }
        detector
    }

    #[test]
    fn test_cold_start_never_flags() {
        let mut detector = OutlierDetector::new();
        for i in 0..28 {
            detector.add(Metric::Temperature, 20.0 + (i % 3) as f64);
        }
        // 29 accumulated samples including the injected extreme: still
        // below the 30-sample activation threshold
        detector.add(Metric::Temperature, 10_000.0);
        let verdict = detector.evaluate(Metric::Temperature, 10_000.0);
        assert!(!verdict.is_outlier);
        assert_eq!(verdict.sample_count, 29);
        assert_eq!(verdict.z_score, 0.0);
        assert_eq!(verdict.iqr_score, 0.0);
    }

    #[test]
    fn test_spike_is_flagged() {
        let mut detector = OutlierDetector::new();
        for i in 0..100 {
            detector.add(Metric::Temperature, 20.0 + (i % 10) as f64 * 0.1);
        }
        detector.add(Metric::Temperature, 35.0);
        let verdict = detector.evaluate(Metric::Temperature, 35.0);
        assert!(verdict.is_outlier);
        assert!(verdict.score > 2.5);
        assert_eq!(verdict.confidence, 1.0);
    }

    #[test]
    fn test_constant_history_never_flags() {
        // Zero standard deviation and zero IQR both resolve locally
        let mut detector = detector_with(&[21.0; 50]);
        detector.add(Metric::Temperature, 21.0);
        let verdict = detector.evaluate(Metric::Temperature, 21.0);
        assert!(!verdict.is_outlier);
        assert_eq!(verdict.z_score, 0.0);
        assert_eq!(verdict.iqr_score, 0.0);
    }

    #[test]
    fn test_zero_iqr_never_flags_via_iqr() {
        // Mostly constant history: the quartiles coincide, so the IQR
        // fence collapses and the method must stay silent.
        let mut values = vec![20.0; 60];
        values.push(25.0);
        values.push(15.0);
        let detector = detector_with(&values);
        let verdict = detector.evaluate(Metric::Temperature, 24.0);
        assert_eq!(verdict.iqr_score, 0.0);
    }

    #[test]
    fn test_verdict_ranges_hold_for_arbitrary_input() {
        let mut detector = OutlierDetector::new();
        for i in 0..250 {
            let value = (i as f64 * 0.7).sin() * 50.0;
            detector.add(Metric::Humidity, value);
            let verdict = detector.evaluate(Metric::Humidity, value);
            assert!((0.0..=1.0).contains(&verdict.confidence));
            assert!(matches!(
                verdict.severity,
                OutlierSeverity::Mild | OutlierSeverity::Moderate | OutlierSeverity::Severe
            ));
        }
    }

    #[test]
    fn test_confidence_scales_with_sample_count() {
        let detector = detector_with(&[20.0; 40]);
        let verdict = detector.evaluate(Metric::Temperature, 20.0);
        assert!((verdict.confidence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_truncating_quartile_positions() {
        // n = 30: Q1 = sorted[7], Q3 = sorted[22]
        let values: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let detector = detector_with(&values);
        let (score, outlier) = detector.iqr_test(
            detector.histories.get(&Metric::Temperature).unwrap(),
            60.0,
        );
        // q1 = 7, q3 = 22, iqr = 15, upper fence = 44.5
        assert!(outlier);
        assert!((score - (60.0 - 44.5) / 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_severity_ladder() {
        assert_eq!(severity_for(1.0), OutlierSeverity::Mild);
        assert_eq!(severity_for(3.0), OutlierSeverity::Moderate);
        assert_eq!(severity_for(4.5), OutlierSeverity::Severe);
    }

    #[test]
    fn test_history_capacity_eviction() {
        let config = OutlierConfig {
            history_capacity: 10,
            ..Default::default()
        };
        let mut detector = OutlierDetector::with_config(config);
        for i in 0..25 {
            detector.add(Metric::Temperature, i as f64);
        }
        let verdict = detector.evaluate(Metric::Temperature, 24.0);
        assert_eq!(verdict.sample_count, 10);
    }

    #[tokio::test]
    async fn test_outlier_log_bounds_and_summary() {
        let log = OutlierLog::new(3);
        for i in 0..5 {
            log.record(OutlierRecord {
                timestamp: 1_700_000_000 + i,
                metric: Metric::Temperature,
                value: 40.0 + i as f64,
                score: 3.0,
                method: OutlierMethod::Zscore,
                severity: OutlierSeverity::Moderate,
            })
            .await;
        }

        let recent = log.recent(10).await;
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].timestamp, 1_700_000_004);

        let summary = log.summary().await;
        assert_eq!(summary.total_flagged, 5);
        assert_eq!(summary.by_metric.get("temperature"), Some(&5));
        assert_eq!(summary.latest.unwrap().timestamp, 1_700_000_004);
    }
}
