//! OCR and text extraction module.
//!
//! The pipeline runs in four stages:
//! - `image_source` turns bytes, base64 text, paths or decoded pixels into an [`Image`]
//! - `preprocess` binarizes, denoises and upscales small images
//! - a [`OcrBackend`] (Tesseract by default) produces positioned tokens
//! - `confidence` and `table` turn tokens into scores and rows
//!
//! [`OcrProcessor`] ties the stages together and is what most callers want.

mod backend;
mod confidence;
mod image_source;
mod preprocess;
mod processor;
mod table;
mod tesseract;
mod util;

pub use backend::{
    BoundingBox, OcrBackend, OcrBackendType, OcrConfig, OcrError, RecognitionResult, Token,
};
pub use confidence::{mean_confidence, score, BatchSummary};
pub use image_source::{normalize, ColorMode, DecodeError, Image, ImageInput};
pub use preprocess::{PreprocessError, Preprocessor};
pub use processor::{BatchReport, ExtractionReport, OcrProcessor, TableReport};
pub use table::{reconstruct_rows, reconstruct_table, row_key, TableRow, ROW_QUANTUM};
pub use tesseract::{parse_language_list, parse_tsv, TesseractBackend};
pub use util::{check_binary, missing_binary_hint};
