//! Text extraction command.

use std::time::Duration;

use console::style;

use super::{build_processor, ensure_engine, read_input};
use crate::config::Config;
use crate::ocr::ExtractionReport;

/// Extract text from each input in order, pausing between images.
pub async fn cmd_extract(
    config: &Config,
    inputs: &[String],
    json: bool,
    delay_ms: Option<u64>,
) -> anyhow::Result<()> {
    let processor = build_processor(&config.ocr);
    ensure_engine(&processor)?;

    let delay = Duration::from_millis(delay_ms.unwrap_or(config.batch.delay_ms));
    let images = inputs
        .iter()
        .map(String::as_str)
        .map(read_input)
        .collect::<anyhow::Result<Vec<_>>>()?;

    let batch = tokio::task::spawn_blocking(move || processor.batch_extract(images, delay))
        .await??;

    if json {
        if let [single] = batch.results.as_slice() {
            println!("{}", serde_json::to_string_pretty(single)?);
        } else {
            println!("{}", serde_json::to_string_pretty(&batch)?);
        }
    } else {
        for (raw, report) in inputs.iter().zip(&batch.results) {
            print_report(raw, report, inputs.len() > 1);
        }
        if inputs.len() > 1 {
            eprintln!(
                "{} {} images, {} ok, {} failed, mean confidence {:.1}%",
                style("Σ").cyan(),
                batch.summary.images,
                batch.summary.succeeded,
                batch.summary.failed,
                batch.summary.mean_confidence
            );
        }
    }

    if batch.summary.failed > 0 {
        anyhow::bail!(
            "{} of {} images could not be read",
            batch.summary.failed,
            batch.summary.images
        );
    }
    Ok(())
}

fn print_report(input: &str, report: &ExtractionReport, with_header: bool) {
    let label = if input.len() > 48 { "<inline>" } else { input };

    if !report.success {
        eprintln!(
            "{} {}: {}",
            style("✗").red(),
            label,
            report.error.as_deref().unwrap_or("unknown error")
        );
        return;
    }

    if with_header {
        println!(
            "{} {} ({} words, {:.1}%)",
            style("==>").bold(),
            label,
            report.word_count,
            report.confidence
        );
    }
    println!("{}", report.text);
}
