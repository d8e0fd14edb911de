//! Minute-level rollups of raw readings
//!
//! Buffers incoming readings into a single open bucket and finalizes it
//! into a min/max/avg summary once 60 seconds have elapsed, measured on
//! reading timestamps so the aggregator is deterministic under replay.

use crate::models::{Metric, MinuteSummary, Reading};

/// Bucket span in seconds
const BUCKET_SECS: i64 = 60;

/// Mutable accumulator for the currently open minute
#[derive(Debug)]
struct MinuteBucket {
    start_time: i64,
    temperature: Vec<f64>,
    humidity: Vec<f64>,
    heat_index: Vec<f64>,
}

impl MinuteBucket {
    fn open(start_time: i64) -> Self {
        Self {
            start_time,
            temperature: Vec::new(),
            humidity: Vec::new(),
            heat_index: Vec::new(),
        }
    }

    fn push(&mut self, reading: &Reading) {
        self.temperature.push(reading.metric(Metric::Temperature));
        self.humidity.push(reading.metric(Metric::Humidity));
        self.heat_index.push(reading.metric(Metric::HeatIndex));
    }

    /// Collapse the bucket into a summary; a bucket that never received
    /// a sample yields nothing
    fn finalize(&self) -> Option<MinuteSummary> {
        if self.temperature.is_empty() {
            return None;
        }
        let (temperature_min, temperature_max, temperature_avg) = stats(&self.temperature);
        let (humidity_min, humidity_max, humidity_avg) = stats(&self.humidity);
        let (heat_index_min, heat_index_max, heat_index_avg) = stats(&self.heat_index);
        Some(MinuteSummary {
            minute_timestamp: self.start_time,
            temperature_min,
            temperature_max,
            temperature_avg,
            humidity_min,
            humidity_max,
            humidity_avg,
            heat_index_min,
            heat_index_max,
            heat_index_avg,
            sample_count: self.temperature.len() as u32,
        })
    }
}

fn stats(values: &[f64]) -> (f64, f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for &v in values {
        min = min.min(v);
        max = max.max(v);
        sum += v;
    }
    (min, max, sum / values.len() as f64)
}

/// Buffers raw readings into 60-second rollups
///
/// At most one bucket is open at any time. Exclusively owned by the
/// ingestion loop.
#[derive(Debug, Default)]
pub struct MinuteAggregator {
    bucket: Option<MinuteBucket>,
}

impl MinuteAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reading, returning a finalized summary when the reading
    /// crosses the 60-second boundary of the open bucket
    pub fn add(&mut self, reading: &Reading) -> Option<MinuteSummary> {
        match self.bucket {
            None => {
                let mut bucket = MinuteBucket::open(reading.timestamp);
                bucket.push(reading);
                self.bucket = Some(bucket);
                None
            }
            Some(ref mut bucket) if reading.timestamp - bucket.start_time >= BUCKET_SECS => {
                let summary = bucket.finalize();
                let mut fresh = MinuteBucket::open(reading.timestamp);
                fresh.push(reading);
                self.bucket = Some(fresh);
                summary
            }
            Some(ref mut bucket) => {
                bucket.push(reading);
                None
            }
        }
    }

    /// Number of readings buffered in the open bucket
    pub fn buffered(&self) -> usize {
        self.bucket.as_ref().map_or(0, |b| b.temperature.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn test_first_reading_opens_bucket() {
        let mut aggregator = MinuteAggregator::new();
        assert!(aggregator.add(&reading_at(1_000, 20.0)).is_none());
        assert_eq!(aggregator.buffered(), 1);
    }

    #[test]
    fn test_full_minute_rollup() {
        let mut aggregator = MinuteAggregator::new();
        // 60 readings one second apart, temperatures 20..=79
        for i in 0..60 {
            let summary = aggregator.add(&reading_at(1_000 + i, 20.0 + i as f64));
            assert!(summary.is_none());
        }
        // Crossing the boundary finalizes the bucket
        let summary = aggregator
            .add(&reading_at(1_060, 99.0))
            .expect("summary at rollover");

        assert_eq!(summary.minute_timestamp, 1_000);
        assert_eq!(summary.temperature_min, 20.0);
        assert_eq!(summary.temperature_max, 79.0);
        assert!((summary.temperature_avg - 49.5).abs() < 1e-9);
        assert_eq!(summary.sample_count, 60);

        // The triggering reading seeds the fresh bucket
        assert_eq!(aggregator.buffered(), 1);
    }

    #[test]
    fn test_rollover_resets_start_time() {
        let mut aggregator = MinuteAggregator::new();
        aggregator.add(&reading_at(1_000, 20.0));
        aggregator.add(&reading_at(1_061, 21.0));
        // Next rollover is measured from the new start, not the old one
        assert!(aggregator.add(&reading_at(1_090, 22.0)).is_none());
        let summary = aggregator.add(&reading_at(1_121, 23.0)).unwrap();
        assert_eq!(summary.minute_timestamp, 1_061);
        assert_eq!(summary.sample_count, 2);
    }

    #[test]
    fn test_summary_covers_all_metrics() {
        let mut aggregator = MinuteAggregator::new();
        aggregator.add(&reading_at(0, 10.0));
        aggregator.add(&reading_at(1, 30.0));
        let summary = aggregator.add(&reading_at(60, 0.0)).unwrap();
        assert_eq!(summary.temperature_min, 10.0);
        assert_eq!(summary.temperature_max, 30.0);
        assert_eq!(summary.heat_index_min, 11.0);
        assert_eq!(summary.heat_index_max, 31.0);
        assert_eq!(summary.humidity_avg, 50.0);
    }

    #[test]
    fn test_empty_bucket_is_never_finalized() {
        let bucket = MinuteBucket::open(0);
        assert!(bucket.finalize().is_none());
    }
}
