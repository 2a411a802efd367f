//! OCR backend abstraction.
//!
//! The recognition engine itself (glyph classification) lives outside this
//! crate. A backend receives a normalized [`Image`] and returns the
//! engine's full text plus per-word tokens with positions and confidences.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::confidence;
use super::image_source::{DecodeError, Image};

/// Errors from OCR backends and the pipeline around them.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image could not be decoded: {0}")]
    Decode(#[from] DecodeError),

    /// The engine is missing or misconfigured. Retrying will not help.
    #[error("Backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("OCR timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    ImageError(String),
}

impl OcrError {
    /// Whether this error should abort the whole pipeline instead of being retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, OcrError::BackendNotAvailable(_))
    }
}

/// Available OCR backend types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OcrBackendType {
    /// Tesseract OCR via command-line.
    Tesseract,
    /// A caller-supplied engine.
    Custom,
}

impl OcrBackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrBackendType::Tesseract => "tesseract",
            OcrBackendType::Custom => "custom",
        }
    }
}

impl std::fmt::Display for OcrBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Axis-aligned box in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// A recognized text fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    text: String,
    bbox: BoundingBox,
    confidence: u8,
}

impl Token {
    /// Build a token, clamping `confidence` into 0-100.
    pub fn new(text: impl Into<String>, bbox: BoundingBox, confidence: i32) -> Self {
        Self {
            text: text.into(),
            bbox,
            confidence: confidence.clamp(0, 100) as u8,
        }
    }

    /// Build a token from an engine-reported confidence.
    ///
    /// Engines report "no confidence" as a negative value (or garbage); such
    /// entries are not tokens and yield `None`.
    pub fn from_raw(text: impl Into<String>, bbox: BoundingBox, raw_confidence: f32) -> Option<Self> {
        if !raw_confidence.is_finite() || raw_confidence < 0.0 {
            return None;
        }
        Some(Self::new(text, bbox, raw_confidence.round() as i32))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn confidence(&self) -> u8 {
        self.confidence
    }
}

/// Output of one recognition call.
///
/// Token order is the engine's emission order and is never changed by later
/// stages. An empty result (no tokens, no text) is a valid outcome, not an
/// error.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    text: String,
    tokens: Vec<Token>,
    confidence: f64,
}

impl RecognitionResult {
    /// Combine the engine's assembled text with its token stream.
    ///
    /// The assembled text is kept (trimmed) when the engine produced one;
    /// otherwise the token texts are joined in emission order.
    pub fn new(full_text: &str, tokens: Vec<Token>) -> Self {
        let trimmed = full_text.trim();
        let text = if trimmed.is_empty() {
            join_tokens(&tokens)
        } else {
            trimmed.to_string()
        };
        let confidence = confidence::mean_confidence(&tokens);
        Self {
            text,
            tokens,
            confidence,
        }
    }

    /// Build a result whose text is the token texts joined in order.
    pub fn from_tokens(tokens: Vec<Token>) -> Self {
        Self::new("", tokens)
    }

    /// The result for an image in which the engine found nothing.
    pub fn empty() -> Self {
        Self::from_tokens(Vec::new())
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Mean confidence over tokens with confidence > 0 (0 when there are none).
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.text.is_empty()
    }
}

fn join_tokens(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|t| t.text().trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Trait for OCR backends.
///
/// Implementations take `&self` and must not keep per-call state, so one
/// backend can serve several threads. If the underlying engine is not
/// reentrant, callers are responsible for serializing access to it.
pub trait OcrBackend: Send + Sync {
    /// Get the backend type.
    fn backend_type(&self) -> OcrBackendType;

    /// Check if this backend is available (dependencies installed).
    fn is_available(&self) -> bool;

    /// Get a description of what's needed to make this backend available.
    fn availability_hint(&self) -> String;

    /// Recognize text in an image.
    fn recognize(&self, image: &Image) -> Result<RecognitionResult, OcrError>;
}

/// Configuration for OCR backends.
///
/// There is deliberately no `Default`: the language must be chosen by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrConfig {
    /// Language for OCR (e.g., "eng", "spa").
    pub language: String,
    /// Engine executable (for command-line backends).
    pub binary: PathBuf,
    /// Upper bound on one engine invocation.
    pub timeout: Duration,
    /// Page segmentation mode override.
    pub page_segmentation: Option<u8>,
}

impl OcrConfig {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            binary: PathBuf::from("tesseract"),
            timeout: Duration::from_secs(30),
            page_segmentation: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_page_segmentation(mut self, psm: Option<u8>) -> Self {
        self.page_segmentation = psm;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox() -> BoundingBox {
        BoundingBox::new(0, 0, 10, 10)
    }

    #[test]
    fn test_token_confidence_clamped() {
        assert_eq!(Token::new("a", bbox(), 250).confidence(), 100);
        assert_eq!(Token::new("a", bbox(), -4).confidence(), 0);
        assert_eq!(Token::new("a", bbox(), 57).confidence(), 57);
    }

    #[test]
    fn test_raw_negative_confidence_is_not_a_token() {
        assert!(Token::from_raw("", bbox(), -1.0).is_none());
        assert!(Token::from_raw("x", bbox(), f32::NAN).is_none());
        assert_eq!(Token::from_raw("x", bbox(), 96.4).unwrap().confidence(), 96);
    }

    #[test]
    fn test_result_prefers_engine_text() {
        let tokens = vec![Token::new("AB", bbox(), 90), Token::new("12", bbox(), 80)];
        let result = RecognitionResult::new("  AB12\n", tokens);
        assert_eq!(result.text(), "AB12");
        assert_eq!(result.token_count(), 2);
        assert!((result.confidence() - 85.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_result_falls_back_to_joined_tokens() {
        let tokens = vec![
            Token::new("Fecha", bbox(), 90),
            Token::new(" ", bbox(), 0),
            Token::new("Monto", bbox(), 70),
        ];
        let result = RecognitionResult::new("", tokens);
        assert_eq!(result.text(), "Fecha Monto");
        assert_eq!(result.tokens()[1].text(), " ");
    }

    #[test]
    fn test_empty_result() {
        let result = RecognitionResult::empty();
        assert!(result.is_empty());
        assert_eq!(result.confidence(), 0.0);
    }

    #[test]
    fn test_only_unavailable_is_fatal() {
        assert!(OcrError::BackendNotAvailable("x".into()).is_fatal());
        assert!(!OcrError::OcrFailed("x".into()).is_fatal());
        assert!(!OcrError::Timeout(Duration::from_secs(1)).is_fatal());
    }
}
