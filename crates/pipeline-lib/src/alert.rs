//! Threshold alerting
//!
//! Classifies each reading against static per-metric thresholds and
//! emits alert events for readings in the warning or danger band.
//! Classification is stateless per reading: every qualifying reading
//! emits a new event, not only the transition into a band.

use serde::{Deserialize, Serialize};

use crate::models::{Metric, Reading};

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Alert type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Warning,
    Violation,
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertType::Warning => write!(f, "warning"),
            AlertType::Violation => write!(f, "violation"),
        }
    }
}

/// Band a value falls into relative to its thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Normal,
    Warning,
    Danger,
}

/// An emitted threshold alert
///
/// `resolved_at` is carried for the persistence schema; this pipeline
/// never sets it itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub timestamp: i64,
    pub alert_type: AlertType,
    pub metric_name: Metric,
    pub metric_value: f64,
    pub threshold_value: f64,
    pub severity: AlertSeverity,
    pub message: String,
    pub resolved_at: Option<i64>,
}

/// Acceptable range and warning margin for one metric
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MetricThresholds {
    pub min: f64,
    pub max: f64,
    pub warning_margin: f64,
}

/// Static thresholds for every tracked metric
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdConfig {
    pub temperature: MetricThresholds,
    pub humidity: MetricThresholds,
    pub heat_index: MetricThresholds,
}

impl ThresholdConfig {
    pub fn for_metric(&self, metric: Metric) -> &MetricThresholds {
        match metric {
            Metric::Temperature => &self.temperature,
            Metric::Humidity => &self.humidity,
            Metric::HeatIndex => &self.heat_index,
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            temperature: MetricThresholds {
                min: -10.0,
                max: 40.0,
                warning_margin: 2.0,
            },
            humidity: MetricThresholds {
                min: 20.0,
                max: 80.0,
                warning_margin: 5.0,
            },
            heat_index: MetricThresholds {
                min: 0.0,
                max: 45.0,
                warning_margin: 3.0,
            },
        }
    }
}

/// Classifies readings against static thresholds
#[derive(Debug, Default)]
pub struct AlertEvaluator {
    thresholds: ThresholdConfig,
}

impl AlertEvaluator {
    pub fn new(thresholds: ThresholdConfig) -> Self {
        Self { thresholds }
    }

    /// Evaluate every metric of a reading, emitting one event per
    /// metric currently in the warning or danger band
    pub fn evaluate(&self, reading: &Reading) -> Vec<AlertEvent> {
        let mut events = Vec::new();
        for metric in Metric::ALL {
            let value = reading.metric(metric);
            let thresholds = self.thresholds.for_metric(metric);
            match classify(thresholds, value) {
                AlertLevel::Normal => {}
                AlertLevel::Warning => {
                    events.push(self.event(reading, metric, value, thresholds, AlertLevel::Warning));
                }
                AlertLevel::Danger => {
                    events.push(self.event(reading, metric, value, thresholds, AlertLevel::Danger));
                }
            }
        }
        events
    }

    fn event(
        &self,
        reading: &Reading,
        metric: Metric,
        value: f64,
        thresholds: &MetricThresholds,
        level: AlertLevel,
    ) -> AlertEvent {
        let (alert_type, severity) = match level {
            AlertLevel::Danger => (AlertType::Violation, AlertSeverity::Critical),
            _ => (AlertType::Warning, AlertSeverity::Warning),
        };
        let threshold_value = nearest_bound(thresholds, value);
        let message = match level {
            AlertLevel::Danger if value > thresholds.max => format!(
                "{} {:.2} exceeds maximum threshold {:.2}",
                metric, value, thresholds.max
            ),
            AlertLevel::Danger => format!(
                "{} {:.2} below minimum threshold {:.2}",
                metric, value, thresholds.min
            ),
            _ => format!(
                "{} {:.2} within {:.2} of threshold {:.2}",
                metric, value, thresholds.warning_margin, threshold_value
            ),
        };
        AlertEvent {
            timestamp: reading.timestamp,
            alert_type,
            metric_name: metric,
            metric_value: value,
            threshold_value,
            severity,
            message,
            resolved_at: None,
        }
    }
}

fn classify(thresholds: &MetricThresholds, value: f64) -> AlertLevel {
    if value < thresholds.min || value > thresholds.max {
        AlertLevel::Danger
    } else if value <= thresholds.min + thresholds.warning_margin
        || value >= thresholds.max - thresholds.warning_margin
    {
        AlertLevel::Warning
    } else {
        AlertLevel::Normal
    }
}

fn nearest_bound(thresholds: &MetricThresholds, value: f64) -> f64 {
    if (value - thresholds.min).abs() <= (value - thresholds.max).abs() {
        thresholds.min
    } else {
        thresholds.max
    }
}
