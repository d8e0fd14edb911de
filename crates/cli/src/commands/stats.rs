//! Windowed mean/variability reporting

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, WindowStats};
use crate::output::{print_table, OutputFormat};

#[derive(Tabled, serde::Serialize)]
struct StatsRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Mean")]
    mean: String,
    #[tabled(rename = "Std Dev")]
    std_dev: String,
    #[tabled(rename = "Samples")]
    samples: u64,
}

pub async fn run(client: &ApiClient, hours: u32, format: OutputFormat) -> Result<()> {
    let stats: Vec<WindowStats> = client.get(&format!("api/stats?hours={}", hours)).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Table => {
            let rows: Vec<StatsRow> = stats
                .iter()
                .map(|s| StatsRow {
                    metric: s.metric.clone(),
                    mean: format!("{:.2}", s.mean),
                    std_dev: format!("{:.2}", s.std_dev),
                    samples: s.samples,
                })
                .collect();
            print_table(&rows, OutputFormat::Table);
        }
    }

    Ok(())
}
