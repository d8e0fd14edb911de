//! Rolling statistics and outlier detection
//!
//! This module provides:
//! - Moving averages over fixed 1m/5m/15m horizons
//! - Dual z-score/IQR outlier detection with a cold-start guard
//! - A bounded in-memory log backing the outlier query surface

mod moving_average;
mod outlier;

pub use moving_average::{Horizon, HorizonAverages, MovingAverageEngine};
pub use outlier::{
    OutlierConfig, OutlierDetector, OutlierLog, OutlierMethod, OutlierRecord, OutlierSeverity,
    OutlierSummary, OutlierVerdict,
};
