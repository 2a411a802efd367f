//! End-to-end extraction: normalize, preprocess, recognize, summarize.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info};

use super::backend::{OcrBackend, OcrConfig, OcrError, RecognitionResult};
use super::confidence::{self, BatchSummary};
use super::image_source::{normalize, Image, ImageInput};
use super::preprocess::Preprocessor;
use super::table::{reconstruct_table, TableRow};
use super::tesseract::TesseractBackend;

/// Structured outcome of a text extraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionReport {
    pub text: String,
    pub confidence: f64,
    pub token_count: usize,
    pub word_count: usize,
    pub language: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionReport {
    fn from_result(result: &RecognitionResult, language: &str) -> Self {
        Self {
            text: result.text().to_string(),
            confidence: confidence::score(result),
            token_count: result.token_count(),
            word_count: result.text().split_whitespace().count(),
            language: language.to_string(),
            success: true,
            error: None,
        }
    }

    fn failure(error: &OcrError, language: &str) -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            token_count: 0,
            word_count: 0,
            language: language.to_string(),
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// Structured outcome of a table extraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReport {
    pub rows: Vec<TableRow>,
    pub row_count: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reports for a batch plus their summary.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub results: Vec<ExtractionReport>,
    pub summary: BatchSummary,
}

impl BatchReport {
    pub fn from_results(results: Vec<ExtractionReport>) -> Self {
        let summary = BatchSummary::from_scores(
            results
                .iter()
                .map(|r| r.success.then_some(r.confidence)),
        );
        Self { results, summary }
    }
}

/// OCR pipeline bound to one backend and language.
///
/// Holds no mutable state; share it freely behind an `Arc`.
#[derive(Clone)]
pub struct OcrProcessor {
    backend: Arc<dyn OcrBackend>,
    preprocessor: Preprocessor,
    preprocess: bool,
    language: String,
}

impl OcrProcessor {
    /// Create a processor backed by the tesseract command-line tool.
    pub fn new(config: OcrConfig) -> Self {
        let language = config.language.clone();
        Self::with_backend(Arc::new(TesseractBackend::new(config)), language)
    }

    /// Create a processor around any backend.
    pub fn with_backend(backend: Arc<dyn OcrBackend>, language: impl Into<String>) -> Self {
        let language = language.into();
        info!(
            "Initialized OCR processor with {} backend, language: {}",
            backend.backend_type(),
            language
        );
        Self {
            backend,
            preprocessor: Preprocessor::new(),
            preprocess: true,
            language,
        }
    }

    /// Enable or disable the preprocessing stage.
    pub fn with_preprocessing(mut self, enabled: bool) -> Self {
        self.preprocess = enabled;
        self
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn backend(&self) -> &dyn OcrBackend {
        self.backend.as_ref()
    }

    /// Check the engine can be used, logging the outcome.
    pub fn validate_engine(&self) -> bool {
        let available = self.backend.is_available();
        if available {
            info!("{} is installed and accessible", self.backend.backend_type());
        } else {
            error!("{}", self.backend.availability_hint());
        }
        available
    }

    /// Normalize and (optionally) preprocess an input.
    pub fn prepare(&self, input: ImageInput) -> Result<Image, OcrError> {
        let image = normalize(input)?;
        if self.preprocess {
            Ok(self.preprocessor.enhance(&image))
        } else {
            Ok(image)
        }
    }

    /// Run the full pipeline, returning typed errors.
    pub fn recognize_input(&self, input: ImageInput) -> Result<RecognitionResult, OcrError> {
        let image = self.prepare(input)?;
        self.backend.recognize(&image)
    }

    /// Extract text, folding every error into the report.
    pub fn extract_text(&self, input: ImageInput) -> ExtractionReport {
        match self.recognize_input(input) {
            Ok(result) => self.report(&result),
            Err(e) => {
                error!("Error extracting text from image: {}", e);
                ExtractionReport::failure(&e, &self.language)
            }
        }
    }

    /// Extract text, folding per-image errors into the report but returning
    /// fatal engine errors.
    pub fn try_extract_text(&self, input: ImageInput) -> Result<ExtractionReport, OcrError> {
        match self.recognize_input(input) {
            Ok(result) => Ok(self.report(&result)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!("Error extracting text from image: {}", e);
                Ok(ExtractionReport::failure(&e, &self.language))
            }
        }
    }

    fn report(&self, result: &RecognitionResult) -> ExtractionReport {
        let report = ExtractionReport::from_result(result, &self.language);
        info!(
            "Extracted text from image with {} characters, confidence: {:.2}%",
            report.text.chars().count(),
            report.confidence
        );
        report
    }

    /// Extract rows of cell text.
    pub fn extract_table(&self, input: ImageInput) -> TableReport {
        match self.recognize_input(input) {
            Ok(result) => {
                let rows = reconstruct_table(&result);
                info!("Extracted table with {} rows", rows.len());
                TableReport {
                    row_count: rows.len(),
                    rows,
                    success: true,
                    error: None,
                }
            }
            Err(e) => {
                error!("Error extracting table data: {}", e);
                TableReport {
                    rows: Vec::new(),
                    row_count: 0,
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Extract text from several inputs, one after another.
    ///
    /// Sleeps `pace` between items to respect the target's rate limits.
    /// Stops at the first fatal engine error. Blocks the calling thread, so
    /// async callers should run it through `spawn_blocking`.
    pub fn batch_extract<I>(&self, inputs: I, pace: Duration) -> Result<BatchReport, OcrError>
    where
        I: IntoIterator<Item = ImageInput>,
        I::IntoIter: ExactSizeIterator,
    {
        let inputs = inputs.into_iter();
        let total = inputs.len();
        let mut results = Vec::with_capacity(total);

        for (idx, input) in inputs.enumerate() {
            if idx > 0 && !pace.is_zero() {
                thread::sleep(pace);
            }
            info!("Processing image {}/{}", idx + 1, total);
            results.push(self.try_extract_text(input)?);
        }

        Ok(BatchReport::from_results(results))
    }
}
