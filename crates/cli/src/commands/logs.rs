//! System log listing

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, SystemLog};
use crate::output::{format_timestamp, print_table, OutputFormat};

#[derive(Tabled, serde::Serialize)]
struct LogRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Level")]
    level: String,
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Details")]
    details: String,
}

pub async fn run(
    client: &ApiClient,
    hours: u32,
    level: Option<String>,
    component: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let mut path = format!("api/logs?hours={}", hours);
    if let Some(level) = &level {
        path.push_str(&format!("&level={}", level));
    }
    if let Some(component) = &component {
        path.push_str(&format!("&component={}", component));
    }
    let logs: Vec<SystemLog> = client.get(&path).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&logs)?),
        OutputFormat::Table => {
            let rows: Vec<LogRow> = logs
                .iter()
                .map(|l| LogRow {
                    time: format_timestamp(l.timestamp),
                    level: l.level.clone(),
                    component: l.component.clone(),
                    message: l.message.clone(),
                    details: l.details.clone().unwrap_or_default(),
                })
                .collect();
            print_table(&rows, OutputFormat::Table);
        }
    }

    Ok(())
}
