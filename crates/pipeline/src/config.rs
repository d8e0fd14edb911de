//! Pipeline configuration

use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

/// Pipeline configuration, loaded from PIPELINE_* environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Name tag for the reading source
    #[serde(default = "default_source_name")]
    pub source_name: String,

    /// API server port for health/metrics/query endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Path to the SQLite database
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Source poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Retention horizon in hours
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// Cleanup pass cadence in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Compaction cadence in seconds
    #[serde(default = "default_compact_interval")]
    pub compact_interval_secs: u64,
}

fn default_source_name() -> String {
    std::env::var("SOURCE_NAME").unwrap_or_else(|_| "sensor-0".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_db_path() -> String {
    "telemetry.db".to_string()
}

fn default_poll_interval() -> u64 {
    1
}

fn default_retention_hours() -> u64 {
    48
}

fn default_cleanup_interval() -> u64 {
    60 * 60
}

fn default_compact_interval() -> u64 {
    6 * 60 * 60
}

impl PipelineConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("PIPELINE"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_else(|_| PipelineConfig {
            source_name: default_source_name(),
            api_port: default_api_port(),
            db_path: default_db_path(),
            poll_interval_secs: default_poll_interval(),
            retention_hours: default_retention_hours(),
            cleanup_interval_secs: default_cleanup_interval(),
            compact_interval_secs: default_compact_interval(),
        }))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 60 * 60)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn compact_interval(&self) -> Duration {
        Duration::from_secs(self.compact_interval_secs)
    }
}
