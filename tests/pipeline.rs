//! Pipeline Tests
//!
//! Drives the public API end to end with stub recognizers and pages, so no
//! tesseract installation or browser is needed.

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};

use glyphgrab::challenge::{
    AttemptOutcome, ChallengePage, ChallengeSolveSession, ChallengeSolver, FieldLocator,
    PageError, SolveSettings,
};
use glyphgrab::ocr::{
    normalize, reconstruct_table, score, BoundingBox, Image, ImageInput, OcrBackend,
    OcrBackendType, OcrError, OcrProcessor, Preprocessor, RecognitionResult, Token,
};

/// Recognizer that returns a fixed token set and remembers what it saw.
struct StubRecognizer {
    tokens: Vec<Token>,
    seen: Mutex<Vec<(u32, u32)>>,
}

impl StubRecognizer {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl OcrBackend for StubRecognizer {
    fn backend_type(&self) -> OcrBackendType {
        OcrBackendType::Custom
    }

    fn is_available(&self) -> bool {
        true
    }

    fn availability_hint(&self) -> String {
        "stub recognizer".to_string()
    }

    fn recognize(&self, image: &Image) -> Result<RecognitionResult, OcrError> {
        self.seen
            .lock()
            .unwrap()
            .push((image.width(), image.height()));
        Ok(RecognitionResult::from_tokens(self.tokens.clone()))
    }
}

/// 200x60 light-gray canvas with four dark blocks standing in for "AB12".
fn glyph_image() -> GrayImage {
    let mut img = GrayImage::from_pixel(200, 60, Luma([210]));
    for glyph in 0..4u32 {
        let left = 20 + glyph * 42;
        for x in left..left + 24 {
            for y in 15..45 {
                img.put_pixel(x, y, Luma([40]));
            }
        }
    }
    img
}

fn png(img: &GrayImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img.clone())
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn glyph_tokens() -> Vec<Token> {
    vec![
        Token::new("AB", BoundingBox::new(40, 30, 80, 60), 91),
        Token::new("12", BoundingBox::new(124, 31, 80, 60), 87),
    ]
}

#[test]
fn test_end_to_end_glyph_scenario() {
    let image = normalize(DynamicImage::ImageLuma8(glyph_image()).into()).unwrap();
    let enhanced = Preprocessor::new().enhance(&image);
    assert_eq!((enhanced.width(), enhanced.height()), (400, 120));

    let stub = StubRecognizer::new(vec![Token::new(
        "AB12",
        BoundingBox::new(40, 30, 320, 60),
        89,
    )]);
    let result = stub.recognize(&enhanced).unwrap();

    assert_eq!(result.text(), "AB12");
    assert!(score(&result) > 0.0);
}

#[test]
fn test_processor_feeds_enhanced_image_to_recognizer() {
    let stub = Arc::new(StubRecognizer::new(glyph_tokens()));
    let processor = OcrProcessor::with_backend(stub.clone(), "eng");

    let report = processor.extract_text(ImageInput::Bytes(png(&glyph_image())));

    assert!(report.success);
    assert_eq!(report.text, "AB 12");
    assert_eq!(report.confidence, 89.0);
    assert_eq!(stub.seen.lock().unwrap().as_slice(), &[(400, 120)]);
}

#[test]
fn test_base64_matches_raw_bytes() {
    let bytes = png(&glyph_image());
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);

    let from_text = normalize(ImageInput::Text(encoded)).unwrap();
    let from_bytes = normalize(ImageInput::Bytes(bytes)).unwrap();
    assert_eq!(from_text, from_bytes);
}

#[test]
fn test_table_rows_ordered() {
    let result = RecognitionResult::from_tokens(vec![
        Token::new("$4.500", BoundingBox::new(300, 52, 60, 14), 80),
        Token::new("Total", BoundingBox::new(10, 49, 60, 14), 85),
        Token::new("Monto", BoundingBox::new(300, 11, 60, 14), 90),
        Token::new("Item", BoundingBox::new(10, 9, 60, 14), 92),
        Token::new("|", BoundingBox::new(150, 10, 4, 14), 0),
    ]);

    let rows = reconstruct_table(&result);
    assert_eq!(rows, vec![vec!["Item", "Monto"], vec!["Total", "$4.500"]]);
}

/// Page that always shows the same image and accepts any input.
struct StaticPage {
    image: Vec<u8>,
    filled: Mutex<Vec<String>>,
}

#[async_trait]
impl ChallengePage for StaticPage {
    async fn fetch_challenge_image(&self) -> Result<Option<Vec<u8>>, PageError> {
        Ok(Some(self.image.clone()))
    }

    async fn fill_field(&self, _locator: &FieldLocator, text: &str) -> Result<(), PageError> {
        self.filled.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

fn page() -> StaticPage {
    StaticPage {
        image: png(&glyph_image()),
        filled: Mutex::new(Vec::new()),
    }
}

#[tokio::test]
async fn test_session_exhausts_on_empty_text() {
    let empty = Token::new("", BoundingBox::default(), 0);
    let processor =
        OcrProcessor::with_backend(Arc::new(StubRecognizer::new(vec![empty])), "spa");
    let solver = ChallengeSolver::new(processor, SolveSettings::default());
    let page = page();

    let report = ChallengeSolveSession::new(3, Duration::ZERO)
        .run(&solver, &page)
        .await
        .unwrap();

    assert!(!report.solved);
    assert_eq!(report.outcome, AttemptOutcome::Exhausted);
    assert_eq!(report.attempts.len(), 3);
    assert!(page.filled.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_session_solves_and_fills() {
    let processor =
        OcrProcessor::with_backend(Arc::new(StubRecognizer::new(glyph_tokens())), "spa");
    let solver = ChallengeSolver::new(processor, SolveSettings::default());
    let page = page();

    let report = ChallengeSolveSession::default()
        .run(&solver, &page)
        .await
        .unwrap();

    assert!(report.solved);
    assert_eq!(report.final_text.as_deref(), Some("AB 12"));
    assert_eq!(page.filled.lock().unwrap().as_slice(), &["AB 12".to_string()]);
}
