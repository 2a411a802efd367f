//! glyphgrab - OCR for challenge glyphs and document snapshots.
//!
//! Images from files, bytes, base64 text or decoded pixels are normalized,
//! cleaned up for recognition, passed to an OCR engine, and turned into
//! text, confidence scores and table rows. The `challenge` module wraps the
//! same pipeline in a bounded solve-and-retry loop for visual challenges on
//! live pages.

pub mod challenge;
pub mod cli;
pub mod config;
pub mod ocr;

pub use config::Config;
