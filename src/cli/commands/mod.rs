//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod check;
mod extract;
#[cfg(feature = "browser")]
mod solve;
mod table;

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::{Config, OcrSettings};
use crate::ocr::{ImageInput, OcrProcessor};

#[derive(Parser)]
#[command(name = "glyphgrab")]
#[command(about = "Extract text and tables from images with OCR")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// OCR language, e.g. "spa" or "spa+eng" (overrides config)
    #[arg(short, long, global = true)]
    language: Option<String>,

    /// Skip binarization, denoising and upscaling
    #[arg(long, global = true)]
    no_preprocess: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Extract text from one or more images
    Extract {
        /// Image paths, base64 text, or "-" for stdin
        #[arg(required = true)]
        inputs: Vec<String>,
        /// Print JSON reports
        #[arg(long)]
        json: bool,
        /// Pause between images in milliseconds (overrides batch.delay_ms)
        #[arg(long)]
        delay_ms: Option<u64>,
    },

    /// Reconstruct table rows from an image
    Table {
        /// Image path, base64 text, or "-" for stdin
        input: String,
        /// Print a JSON report
        #[arg(long)]
        json: bool,
    },

    /// Check that the OCR engine and configured languages are installed
    Check,

    /// Solve the visual challenge on a live page
    #[cfg(feature = "browser")]
    Solve {
        /// Page showing the challenge
        #[arg(long)]
        url: String,
        /// Maximum attempts (overrides challenge.max_attempts)
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Print a JSON report
        #[arg(long)]
        json: bool,
    },
}

/// Build the processor described by the OCR settings.
fn build_processor(settings: &OcrSettings) -> OcrProcessor {
    OcrProcessor::new(settings.to_ocr_config()).with_preprocessing(settings.preprocess)
}

/// Interpret a command-line input argument.
fn read_input(arg: &str) -> anyhow::Result<ImageInput> {
    if arg == "-" {
        let mut bytes = Vec::new();
        std::io::stdin()
            .read_to_end(&mut bytes)
            .context("Failed to read image from stdin")?;
        return Ok(ImageInput::Bytes(bytes));
    }

    let path = Path::new(arg);
    if path.exists() {
        Ok(ImageInput::Path(path.to_path_buf()))
    } else {
        Ok(ImageInput::Text(arg.to_string()))
    }
}

/// Fail early with the engine's own hint when it cannot run.
fn ensure_engine(processor: &OcrProcessor) -> anyhow::Result<()> {
    if processor.validate_engine() {
        Ok(())
    } else {
        anyhow::bail!(processor.backend().availability_hint())
    }
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)
            .await
            .with_context(|| format!("Failed to load config {}", path.display()))?
            .with_env_overrides(),
        None => Config::load().await,
    };
    if let Some(language) = cli.language {
        config.ocr.language = language;
    }
    if cli.no_preprocess {
        config.ocr.preprocess = false;
    }

    match cli.command {
        Commands::Extract {
            inputs,
            json,
            delay_ms,
        } => extract::cmd_extract(&config, &inputs, json, delay_ms).await,
        Commands::Table { input, json } => table::cmd_table(&config, &input, json).await,
        Commands::Check => check::cmd_check(&config).await,
        #[cfg(feature = "browser")]
        Commands::Solve {
            url,
            max_attempts,
            json,
        } => solve::cmd_solve(&config, &url, max_attempts, json).await,
    }
}
