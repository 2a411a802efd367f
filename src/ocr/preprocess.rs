//! Pixel transforms applied before recognition.
//!
//! Small, noisy, anti-aliased renders (CAPTCHAs in particular) segment poorly
//! in a classical OCR engine. The pipeline here is fixed:
//!
//! 1. grayscale (luminance weighted) when the image has color channels
//! 2. global binary threshold at 150
//! 3. non-local-means denoise
//! 4. 2x cubic upscale when the image is shorter than 300 px
//!
//! [`Preprocessor::enhance`] never fails: on any internal error it logs a
//! warning and hands back the input unchanged.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use thiserror::Error;
use tracing::{debug, warn};

use super::image_source::{DecodeError, Image};

/// Threshold on a 0-255 scale; samples strictly above become white.
pub const BINARY_THRESHOLD: u8 = 150;

/// Filter strength `h` for the denoise pass.
pub const DENOISE_STRENGTH: f32 = 10.0;

/// Images shorter than this are upscaled.
pub const MIN_HEIGHT: u32 = 300;

/// Integer upscale factor for short images.
pub const UPSCALE_FACTOR: u32 = 2;

/// Half-width of the square patch compared by the denoise pass.
const PATCH_RADIUS: i64 = 1;

/// Half-width of the square search window of the denoise pass.
const SEARCH_RADIUS: i64 = 3;

/// Default upper bound on the upscaled pixel count.
pub const MAX_OUTPUT_PIXELS: u64 = 100_000_000;

/// Internal preprocessing failures. These never escape [`Preprocessor::enhance`].
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Upscaled image would be {width}x{height}, which exceeds the pixel limit")]
    TooLarge { width: u64, height: u64 },

    #[error("Preprocessing produced an unusable image: {0}")]
    Image(#[from] DecodeError),
}

/// Fixed preprocessing pipeline. Holds no mutable state; cheap to copy.
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    max_output_pixels: u64,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor {
    pub fn new() -> Self {
        Self {
            max_output_pixels: MAX_OUTPUT_PIXELS,
        }
    }

    /// Cap the pixel count the upscale step may produce.
    pub fn with_max_output_pixels(mut self, limit: u64) -> Self {
        self.max_output_pixels = limit;
        self
    }

    /// Run the pipeline, falling back to a copy of `image` on failure.
    pub fn enhance(&self, image: &Image) -> Image {
        self.enhance_reporting(image).0
    }

    /// Like [`enhance`](Self::enhance) but also returns the recovered error, if any.
    pub fn enhance_reporting(&self, image: &Image) -> (Image, Option<PreprocessError>) {
        match self.try_enhance(image) {
            Ok(enhanced) => (enhanced, None),
            Err(e) => {
                warn!("Error preprocessing image: {}. Using original image.", e);
                (image.clone(), Some(e))
            }
        }
    }

    /// Run the pipeline, surfacing internal errors.
    pub fn try_enhance(&self, image: &Image) -> Result<Image, PreprocessError> {
        let gray = image.to_luma();
        let binary = threshold(&gray, BINARY_THRESHOLD);
        let denoised = denoise(&binary, DENOISE_STRENGTH);
        let scaled = upscale_if_small(denoised, self.max_output_pixels)?;

        debug!(
            "Preprocessed {}x{} image to {}x{}",
            image.width(),
            image.height(),
            scaled.width(),
            scaled.height()
        );

        Ok(Image::from_gray(scaled)?)
    }
}

/// Two-level threshold: `> level` becomes 255, everything else 0.
pub fn threshold(gray: &GrayImage, level: u8) -> GrayImage {
    let mut out = gray.clone();
    for pixel in out.pixels_mut() {
        pixel.0[0] = if pixel.0[0] > level { 255 } else { 0 };
    }
    out
}

/// Non-local-means denoise over a small search window.
///
/// Each output sample is a weighted mean of the samples in the search
/// window, weighted by `exp(-d / h^2)` where `d` is the mean squared
/// difference between the patches around the two samples. Borders are
/// handled by clamping coordinates.
pub fn denoise(gray: &GrayImage, h: f32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let h2 = (h * h).max(f32::EPSILON);
    let patch_area = ((2 * PATCH_RADIUS + 1) * (2 * PATCH_RADIUS + 1)) as f32;

    let sample = |x: i64, y: i64| -> f32 {
        let cx = x.clamp(0, width as i64 - 1) as u32;
        let cy = y.clamp(0, height as i64 - 1) as u32;
        gray.get_pixel(cx, cy).0[0] as f32
    };

    GrayImage::from_fn(width, height, |x, y| {
        let (x, y) = (x as i64, y as i64);
        let mut weighted = 0.0f32;
        let mut total = 0.0f32;

        for sy in -SEARCH_RADIUS..=SEARCH_RADIUS {
            for sx in -SEARCH_RADIUS..=SEARCH_RADIUS {
                let mut distance = 0.0f32;
                for py in -PATCH_RADIUS..=PATCH_RADIUS {
                    for px in -PATCH_RADIUS..=PATCH_RADIUS {
                        let diff = sample(x + px, y + py) - sample(x + sx + px, y + sy + py);
                        distance += diff * diff;
                    }
                }
                let weight = (-(distance / patch_area) / h2).exp();
                weighted += weight * sample(x + sx, y + sy);
                total += weight;
            }
        }

        Luma([(weighted / total).round().clamp(0.0, 255.0) as u8])
    })
}

fn upscale_if_small(gray: GrayImage, max_pixels: u64) -> Result<GrayImage, PreprocessError> {
    if gray.height() >= MIN_HEIGHT {
        return Ok(gray);
    }

    let width = gray.width() as u64 * UPSCALE_FACTOR as u64;
    let height = gray.height() as u64 * UPSCALE_FACTOR as u64;
    if width * height > max_pixels || width > u32::MAX as u64 {
        return Err(PreprocessError::TooLarge { width, height });
    }

    Ok(imageops::resize(
        &gray,
        width as u32,
        height as u32,
        FilterType::CatmullRom,
    ))
}
