//! Core data models for the telemetry pipeline

use serde::{Deserialize, Serialize};

/// A single environmental reading produced by the sensor source.
///
/// Readings are immutable once created; every downstream component
/// consumes them by reference and never mutates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    /// Unix timestamp (seconds) at which the reading was taken
    pub timestamp: i64,
    /// Air temperature in degrees Celsius
    pub temperature: f64,
    /// Relative humidity in percent
    pub humidity: f64,
    /// Derived "feels-like" temperature in degrees Celsius
    pub heat_index: f64,
    /// Monotonically increasing sequence number
    pub sequence_number: u64,
    /// Sensor status tag (e.g. "ok", "degraded")
    pub sensor_status: String,
    /// Source mode tag (e.g. "diurnal", "replay")
    pub simulation_mode: String,
}

impl Reading {
    /// Value of the given metric within this reading
    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::HeatIndex => self.heat_index,
        }
    }
}

/// The closed set of metrics tracked by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Temperature,
    Humidity,
    HeatIndex,
}

impl Metric {
    /// All metrics, in canonical order
    pub const ALL: [Metric; 3] = [Metric::Temperature, Metric::Humidity, Metric::HeatIndex];

    /// Stable snake_case name used in JSON payloads and table columns
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
            Metric::HeatIndex => "heat_index",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One-minute rollup of raw readings
///
/// Keyed uniquely by `minute_timestamp`; a second write for the same
/// minute replaces the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinuteSummary {
    pub minute_timestamp: i64,
    pub temperature_min: f64,
    pub temperature_max: f64,
    pub temperature_avg: f64,
    pub humidity_min: f64,
    pub humidity_max: f64,
    pub humidity_avg: f64,
    pub heat_index_min: f64,
    pub heat_index_max: f64,
    pub heat_index_avg: f64,
    pub sample_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_reading() -> Reading {
        Reading {
            timestamp: 1_700_000_000,
            temperature: 22.5,
            humidity: 55.0,
            heat_index: 23.1,
            sequence_number: 42,
            sensor_status: "ok".to_string(),
            simulation_mode: "diurnal".to_string(),
        }
    }

    #[test]
    fn test_metric_accessor() {
        let reading = sample_reading();
        assert_eq!(reading.metric(Metric::Temperature), 22.5);
        assert_eq!(reading.metric(Metric::Humidity), 55.0);
        assert_eq!(reading.metric(Metric::HeatIndex), 23.1);
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(Metric::Temperature.as_str(), "temperature");
        assert_eq!(Metric::HeatIndex.to_string(), "heat_index");
    }

    #[test]
    fn test_metric_serde_names() {
        let json = serde_json::to_string(&Metric::HeatIndex).unwrap();
        assert_eq!(json, "\"heat_index\"");
    }

    #[test]
    fn test_reading_roundtrip() {
        let reading = sample_reading();
        let json = serde_json::to_string(&reading).unwrap();
        let back: Reading = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sequence_number, 42);
        assert_eq!(back.sensor_status, "ok");
    }
}
