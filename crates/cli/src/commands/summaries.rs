//! Minute rollup listing

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, MinuteSummary};
use crate::output::{format_timestamp, print_table, OutputFormat};

#[derive(Tabled, serde::Serialize)]
struct SummaryRow {
    #[tabled(rename = "Minute")]
    minute: String,
    #[tabled(rename = "Temp min/avg/max")]
    temperature: String,
    #[tabled(rename = "Humidity min/avg/max")]
    humidity: String,
    #[tabled(rename = "Heat Index min/avg/max")]
    heat_index: String,
    #[tabled(rename = "Samples")]
    samples: u32,
}

pub async fn run(client: &ApiClient, hours: u32, format: OutputFormat) -> Result<()> {
    let summaries: Vec<MinuteSummary> =
        client.get(&format!("api/summaries?hours={}", hours)).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summaries)?),
        OutputFormat::Table => {
            let rows: Vec<SummaryRow> = summaries
                .iter()
                .map(|s| SummaryRow {
                    minute: format_timestamp(s.minute_timestamp),
                    temperature: format!(
                        "{:.1} / {:.1} / {:.1}",
                        s.temperature_min, s.temperature_avg, s.temperature_max
                    ),
                    humidity: format!(
                        "{:.1} / {:.1} / {:.1}",
                        s.humidity_min, s.humidity_avg, s.humidity_max
                    ),
                    heat_index: format!(
                        "{:.1} / {:.1} / {:.1}",
                        s.heat_index_min, s.heat_index_avg, s.heat_index_max
                    ),
                    samples: s.sample_count,
                })
                .collect();
            print_table(&rows, OutputFormat::Table);
        }
    }

    Ok(())
}
