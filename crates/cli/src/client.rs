//! API client for the pipeline's query surface

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;

/// HTTP client for a running telemetry pipeline
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    pub timestamp: i64,
    pub temperature: f64,
    pub humidity: f64,
    pub heat_index: f64,
    pub sequence_number: u64,
    pub sensor_status: String,
    pub simulation_mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub timestamp: i64,
    pub alert_type: String,
    pub metric_name: String,
    pub metric_value: f64,
    pub threshold_value: f64,
    pub severity: String,
    pub message: String,
    pub resolved_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemLog {
    pub timestamp: i64,
    pub level: String,
    pub component: String,
    pub message: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierRecord {
    pub timestamp: i64,
    pub metric: String,
    pub value: f64,
    pub score: f64,
    pub method: String,
    pub severity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierSummary {
    pub total_flagged: u64,
    pub by_metric: BTreeMap<String, u64>,
    pub latest: Option<OutlierRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowStats {
    pub metric: String,
    pub mean: f64,
    pub std_dev: f64,
    pub samples: u64,
}
