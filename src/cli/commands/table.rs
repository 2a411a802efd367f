//! Table reconstruction command.

use super::{build_processor, ensure_engine, read_input};
use crate::config::Config;

/// Print reconstructed rows, one per line with tab-separated cells.
pub async fn cmd_table(config: &Config, input: &str, json: bool) -> anyhow::Result<()> {
    let processor = build_processor(&config.ocr);
    ensure_engine(&processor)?;

    let report = processor.extract_table(read_input(input)?);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for row in &report.rows {
            println!("{}", row.join("\t"));
        }
    }

    match report.error {
        Some(error) if !report.success => anyhow::bail!(error),
        _ => Ok(()),
    }
}
