//! Threshold alert listing

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{AlertEvent, ApiClient};
use crate::output::{format_timestamp, print_table, OutputFormat};

#[derive(Tabled, serde::Serialize)]
struct AlertRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Type")]
    alert_type: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Threshold")]
    threshold: String,
    #[tabled(rename = "Message")]
    message: String,
}

pub async fn run(
    client: &ApiClient,
    hours: u32,
    severity: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let mut path = format!("api/alerts?hours={}", hours);
    if let Some(severity) = &severity {
        path.push_str(&format!("&severity={}", severity));
    }
    let alerts: Vec<AlertEvent> = client.get(&path).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&alerts)?),
        OutputFormat::Table => {
            let rows: Vec<AlertRow> = alerts
                .iter()
                .map(|a| AlertRow {
                    time: format_timestamp(a.timestamp),
                    alert_type: a.alert_type.clone(),
                    severity: colorize_severity(&a.severity),
                    metric: a.metric_name.clone(),
                    value: format!("{:.2}", a.metric_value),
                    threshold: format!("{:.2}", a.threshold_value),
                    message: a.message.clone(),
                })
                .collect();
            print_table(&rows, OutputFormat::Table);
        }
    }

    Ok(())
}

fn colorize_severity(severity: &str) -> String {
    match severity {
        "critical" => severity.red().bold().to_string(),
        "warning" => severity.yellow().to_string(),
        _ => severity.to_string(),
    }
}
