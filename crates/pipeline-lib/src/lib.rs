//! Core library for the environmental telemetry pipeline
//!
//! This crate provides:
//! - Rolling statistics and dual-method outlier detection
//! - Minute-level rollups of raw readings
//! - Threshold alerting
//! - Retention-bounded SQLite persistence
//! - Fault-isolating broadcast fan-out
//! - The ingestion loop orchestrating all of the above

pub mod alert;
pub mod analytics;
pub mod broadcast;
pub mod health;
pub mod ingest;
pub mod models;
pub mod observability;
pub mod rollup;
pub mod store;

pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{EventLogger, PipelineMetrics};
