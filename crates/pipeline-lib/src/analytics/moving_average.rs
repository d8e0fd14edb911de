//! Rolling mean computation over fixed sample-count horizons
//!
//! Maintains one bounded FIFO buffer per metric and horizon. At the
//! one-sample-per-second cadence of the sensor source the 60/300/900
//! sample capacities correspond to 1/5/15 minute windows.

use std::collections::HashMap;
use std::collections::VecDeque;

use serde::Serialize;

use crate::models::Metric;

/// A fixed moving-average window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizon {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
}

impl Horizon {
    /// All horizons, shortest first
    pub const ALL: [Horizon; 3] = [
        Horizon::OneMinute,
        Horizon::FiveMinutes,
        Horizon::FifteenMinutes,
    ];

    /// Buffer capacity in samples
    pub fn capacity(&self) -> usize {
        match self {
            Horizon::OneMinute => 60,
            Horizon::FiveMinutes => 300,
            Horizon::FifteenMinutes => 900,
        }
    }

    /// Label used in broadcast payloads ("1m", "5m", "15m")
    pub fn label(&self) -> &'static str {
        match self {
            Horizon::OneMinute => "1m",
            Horizon::FiveMinutes => "5m",
            Horizon::FifteenMinutes => "15m",
        }
    }
}

/// Current means for every horizon of one metric
///
/// An empty horizon reports `0.0` rather than an absent value; callers
/// that need to distinguish "no data" must consult sample counts held
/// elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HorizonAverages {
    #[serde(rename = "1m")]
    pub one_minute: f64,
    #[serde(rename = "5m")]
    pub five_minutes: f64,
    #[serde(rename = "15m")]
    pub fifteen_minutes: f64,
}

/// Bounded FIFO buffer for a single metric and horizon
#[derive(Debug)]
struct MetricWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl MetricWindow {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }
}

/// Per-metric rolling means over the 1m/5m/15m horizons
///
/// Exclusively owned by the ingestion loop; no internal locking.
#[derive(Debug, Default)]
pub struct MovingAverageEngine {
    windows: HashMap<Metric, [MetricWindow; 3]>,
}

impl MovingAverageEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a value into every horizon's buffer for the metric,
    /// evicting the oldest sample once a buffer is full
    pub fn add(&mut self, metric: Metric, value: f64) {
        let windows = self.windows.entry(metric).or_insert_with(|| {
            [
                MetricWindow::new(Horizon::OneMinute.capacity()),
                MetricWindow::new(Horizon::FiveMinutes.capacity()),
                MetricWindow::new(Horizon::FifteenMinutes.capacity()),
            ]
        });
        for window in windows.iter_mut() {
            window.push(value);
        }
    }

    /// Arithmetic mean of each horizon's current contents
    pub fn averages(&self, metric: Metric) -> HorizonAverages {
        match self.windows.get(&metric) {
            Some(windows) => HorizonAverages {
                one_minute: windows[0].mean(),
                five_minutes: windows[1].mean(),
                fifteen_minutes: windows[2].mean(),
            },
            None => HorizonAverages {
                one_minute: 0.0,
                five_minutes: 0.0,
                fifteen_minutes: 0.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_horizon_reports_zero() {
        let engine = MovingAverageEngine::new();
        let averages = engine.averages(Metric::Humidity);
        assert_eq!(averages.one_minute, 0.0);
        assert_eq!(averages.five_minutes, 0.0);
        assert_eq!(averages.fifteen_minutes, 0.0);
    }

    #[test]
    fn test_simple_mean() {
        let mut engine = MovingAverageEngine::new();
        for value in [10.0, 20.0, 30.0] {
            engine.add(Metric::Temperature, value);
        }
        let averages = engine.averages(Metric::Temperature);
        assert!((averages.one_minute - 20.0).abs() < 1e-9);
        assert!((averages.five_minutes - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_ring_eviction_in_shortest_horizon() {
        let mut engine = MovingAverageEngine::new();
        // 120 samples: the 1m window holds only the last 60 (values 60..120),
        // the 5m window still holds all 120.
        for i in 0..120 {
            engine.add(Metric::Temperature, i as f64);
        }
        let averages = engine.averages(Metric::Temperature);
        assert!((averages.one_minute - 89.5).abs() < 1e-9);
        assert!((averages.five_minutes - 59.5).abs() < 1e-9);
    }

    #[test]
    fn test_metrics_are_independent() {
        let mut engine = MovingAverageEngine::new();
        engine.add(Metric::Temperature, 100.0);
        engine.add(Metric::Humidity, 50.0);
        assert_eq!(engine.averages(Metric::Temperature).one_minute, 100.0);
        assert_eq!(engine.averages(Metric::Humidity).one_minute, 50.0);
    }

    #[test]
    fn test_horizon_labels_and_capacities() {
        assert_eq!(Horizon::OneMinute.label(), "1m");
        assert_eq!(Horizon::FifteenMinutes.capacity(), 900);
    }

    #[test]
    fn test_horizon_averages_serialize_with_short_labels() {
        let averages = HorizonAverages {
            one_minute: 1.0,
            five_minutes: 2.0,
            fifteen_minutes: 3.0,
        };
        let json = serde_json::to_value(&averages).unwrap();
        assert_eq!(json["1m"], 1.0);
        assert_eq!(json["5m"], 2.0);
        assert_eq!(json["15m"], 3.0);
    }
}
