//! CLI subcommand implementations

pub mod alerts;
pub mod logs;
pub mod measurements;
pub mod outliers;
pub mod stats;
pub mod summaries;
