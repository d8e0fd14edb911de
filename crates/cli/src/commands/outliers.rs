//! Outlier activity queries

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, OutlierRecord, OutlierSummary};
use crate::output::{format_timestamp, print_table, OutputFormat};

#[derive(Tabled, serde::Serialize)]
struct OutlierRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Method")]
    method: String,
    #[tabled(rename = "Severity")]
    severity: String,
}

impl From<&OutlierRecord> for OutlierRow {
    fn from(record: &OutlierRecord) -> Self {
        Self {
            time: format_timestamp(record.timestamp),
            metric: record.metric.clone(),
            value: format!("{:.2}", record.value),
            score: format!("{:.2}", record.score),
            method: record.method.clone(),
            severity: record.severity.clone(),
        }
    }
}

pub async fn summary(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result: OutlierSummary = client.get("api/outliers/summary").await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Table => {
            println!("{}", "Outlier Summary".bold());
            println!("{}", "=".repeat(40));
            println!("Total flagged:  {}", result.total_flagged);
            for (metric, count) in &result.by_metric {
                println!("  {:12}  {}", metric, count);
            }
            if let Some(latest) = &result.latest {
                println!();
                println!(
                    "Latest: {} {} = {:.2} (score {:.2}, {})",
                    format_timestamp(latest.timestamp).dimmed(),
                    latest.metric,
                    latest.value,
                    latest.score,
                    latest.severity
                );
            }
        }
    }

    Ok(())
}

pub async fn recent(client: &ApiClient, limit: usize, format: OutputFormat) -> Result<()> {
    let records: Vec<OutlierRecord> = client
        .get(&format!("api/outliers/recent?limit={}", limit))
        .await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Table => {
            let rows: Vec<OutlierRow> = records.iter().map(OutlierRow::from).collect();
            print_table(&rows, OutputFormat::Table);
        }
    }

    Ok(())
}
