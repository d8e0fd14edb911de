//! Simulated environmental sensor
//!
//! Produces smooth diurnal temperature and humidity curves with a small
//! deterministic wobble, a derived heat index, and monotonic sequence
//! numbers. Stands in for real sensor hardware behind the
//! [`ReadingSource`] contract.

use anyhow::Result;
use chrono::{Timelike, Utc};
use pipeline_lib::ingest::{async_trait, ReadingSource};
use pipeline_lib::models::Reading;

/// Mean daily temperature in degrees Celsius
const BASE_TEMPERATURE: f64 = 22.0;
/// Peak-to-mean diurnal swing
const TEMPERATURE_AMPLITUDE: f64 = 6.0;
/// Mean relative humidity in percent
const BASE_HUMIDITY: f64 = 55.0;
/// Humidity swing, opposite in phase to temperature
const HUMIDITY_AMPLITUDE: f64 = 15.0;
/// Hour of day at which temperature peaks
const WARMEST_HOUR: f64 = 14.0;

pub struct SimulatedSensor {
    source_name: String,
    sequence: u64,
}

impl SimulatedSensor {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            sequence: 0,
        }
    }

    fn reading_at(&mut self, now: chrono::DateTime<Utc>) -> Reading {
        let seconds_of_day = f64::from(now.num_seconds_from_midnight());
        let phase =
            (seconds_of_day - WARMEST_HOUR * 3600.0) / 86_400.0 * std::f64::consts::TAU;
        let diurnal = phase.cos();

        let wobble = wobble(now.timestamp_subsec_nanos());
        let temperature = BASE_TEMPERATURE + TEMPERATURE_AMPLITUDE * diurnal + wobble;
        let humidity =
            (BASE_HUMIDITY - HUMIDITY_AMPLITUDE * diurnal + wobble * 2.0).clamp(5.0, 100.0);

        self.sequence += 1;
        Reading {
            timestamp: now.timestamp(),
            temperature,
            humidity,
            heat_index: heat_index(temperature, humidity),
            sequence_number: self.sequence,
            sensor_status: "ok".to_string(),
            simulation_mode: "diurnal".to_string(),
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }
}

#[async_trait]
impl ReadingSource for SimulatedSensor {
    async fn poll(&mut self) -> Result<Option<Reading>> {
        Ok(Some(self.reading_at(Utc::now())))
    }
}

/// Deterministic sub-degree wobble derived from the clock's nanoseconds
fn wobble(nanos: u32) -> f64 {
    f64::from(nanos % 1000) / 1000.0 - 0.5
}

/// Heat index ("feels-like" temperature) in degrees Celsius
///
/// NOAA Rothfusz regression, computed in Fahrenheit. Below the
/// regression's validity range the simpler Steadman approximation is
/// used, matching the published two-step procedure.
fn heat_index(temperature_c: f64, humidity: f64) -> f64 {
    let t = temperature_c * 9.0 / 5.0 + 32.0;
    let rh = humidity;

    let simple = 0.5 * (t + 61.0 + (t - 68.0) * 1.2 + rh * 0.094);
    let hi = if (simple + t) / 2.0 < 80.0 {
        simple
    } else {
        -42.379 + 2.049_015_23 * t + 10.143_331_27 * rh
            - 0.224_755_41 * t * rh
            - 6.837_83e-3 * t * t
            - 5.481_717e-2 * rh * rh
            + 1.228_74e-3 * t * t * rh
            + 8.528_2e-4 * t * rh * rh
            - 1.99e-6 * t * t * rh * rh
    };

    (hi - 32.0) * 5.0 / 9.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_sequence_numbers_are_monotonic() {
        let mut sensor = SimulatedSensor::new("sensor-test");
        let first = sensor.poll().await.unwrap().unwrap();
        let second = sensor.poll().await.unwrap().unwrap();
        assert!(second.sequence_number > first.sequence_number);
        assert_eq!(second.sensor_status, "ok");
        assert_eq!(second.simulation_mode, "diurnal");
    }

    #[test]
    fn test_afternoon_is_warmer_than_predawn() {
        let mut sensor = SimulatedSensor::new("sensor-test");
        let predawn = Utc.with_ymd_and_hms(2024, 7, 1, 2, 0, 0).unwrap();
        let afternoon = Utc.with_ymd_and_hms(2024, 7, 1, 14, 0, 0).unwrap();
        let cold = sensor.reading_at(predawn);
        let warm = sensor.reading_at(afternoon);
        assert!(warm.temperature > cold.temperature);
        assert!(warm.humidity < cold.humidity);
    }

    #[test]
    fn test_heat_index_exceeds_temperature_when_hot_and_humid() {
        let hi = heat_index(34.0, 80.0);
        assert!(hi > 34.0);
    }

    #[test]
    fn test_heat_index_tracks_temperature_when_mild() {
        let hi = heat_index(20.0, 50.0);
        assert!((hi - 20.0).abs() < 3.0);
    }

    #[test]
    fn test_humidity_stays_in_range() {
        let mut sensor = SimulatedSensor::new("sensor-test");
        for hour in 0..24 {
            let at = Utc.with_ymd_and_hms(2024, 7, 1, hour, 30, 0).unwrap();
            let reading = sensor.reading_at(at);
            assert!((5.0..=100.0).contains(&reading.humidity));
        }
    }
}
