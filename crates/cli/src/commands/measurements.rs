//! Raw measurement listing

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, Measurement};
use crate::output::{format_timestamp, print_table, OutputFormat};

#[derive(Tabled, serde::Serialize)]
struct MeasurementRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Seq")]
    sequence: u64,
    #[tabled(rename = "Temp (°C)")]
    temperature: String,
    #[tabled(rename = "Humidity (%)")]
    humidity: String,
    #[tabled(rename = "Heat Index (°C)")]
    heat_index: String,
    #[tabled(rename = "Status")]
    status: String,
}

pub async fn run(
    client: &ApiClient,
    hours: u32,
    limit: Option<u32>,
    format: OutputFormat,
) -> Result<()> {
    let mut path = format!("api/measurements?hours={}", hours);
    if let Some(limit) = limit {
        path.push_str(&format!("&limit={}", limit));
    }
    let measurements: Vec<Measurement> = client.get(&path).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&measurements)?),
        OutputFormat::Table => {
            let rows: Vec<MeasurementRow> = measurements
                .iter()
                .map(|m| MeasurementRow {
                    time: format_timestamp(m.timestamp),
                    sequence: m.sequence_number,
                    temperature: format!("{:.2}", m.temperature),
                    humidity: format!("{:.1}", m.humidity),
                    heat_index: format!("{:.2}", m.heat_index),
                    status: m.sensor_status.clone(),
                })
                .collect();
            print_table(&rows, OutputFormat::Table);
        }
    }

    Ok(())
}
