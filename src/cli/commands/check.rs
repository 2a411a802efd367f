//! Engine check command.

use console::style;

use crate::config::Config;
use crate::ocr::{OcrBackend, TesseractBackend};

/// Report whether tesseract and the configured languages are installed.
pub async fn cmd_check(config: &Config) -> anyhow::Result<()> {
    let backend = TesseractBackend::new(config.ocr.to_ocr_config());

    match &config.source_path {
        Some(path) => println!("  Config:   {}", path.display()),
        None => println!("  Config:   (defaults)"),
    }
    println!("  Language: {}", config.ocr.language);
    println!(
        "  Preprocessing: {}",
        if config.ocr.preprocess { "on" } else { "off" }
    );

    if !backend.is_available() {
        println!("{} {}", style("✗").red(), backend.availability_hint());
        anyhow::bail!("OCR engine unavailable");
    }

    let version = backend.version()?;
    println!("{} {}", style("✓").green(), version);

    let missing = backend.missing_languages()?;
    if missing.is_empty() {
        println!("{} Language data installed", style("✓").green());
        Ok(())
    } else {
        println!(
            "{} Missing language data: {} (install tesseract-ocr-{})",
            style("✗").red(),
            missing.join(", "),
            missing[0]
        );
        anyhow::bail!("missing tesseract language data")
    }
}
