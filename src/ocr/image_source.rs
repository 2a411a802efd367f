//! Input normalization for the OCR pipeline.
//!
//! Every supported input (encoded bytes, base64 text, a path on disk, or an
//! already-decoded pixel buffer) is turned into one canonical [`Image`]:
//! either 8-bit grayscale or 8-bit RGB, never empty.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::Engine;
use image::{imageops, DynamicImage, GrayImage, ImageFormat, RgbImage};
use thiserror::Error;

/// Errors produced while turning an input into an [`Image`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Could not decode image data: {0}")]
    Container(#[from] image::ImageError),

    #[error("Invalid base64 image text: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Could not read image file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Input is neither decodable base64 ({encoded}) nor a readable image path ({path})")]
    Unresolvable { encoded: String, path: String },

    #[error("Image has zero width or height")]
    EmptyImage,
}

/// Color layout of a normalized image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Grayscale,
    Rgb,
}

impl ColorMode {
    pub fn channels(&self) -> u8 {
        match self {
            ColorMode::Grayscale => 1,
            ColorMode::Rgb => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pixels {
    Gray(GrayImage),
    Rgb(RgbImage),
}

/// An owned, immutable, non-empty 8-bit pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pixels: Pixels,
}

impl Image {
    /// Wrap a decoded image, collapsing it to grayscale or RGB.
    ///
    /// Alpha channels are dropped and 16/32-bit samples are reduced to 8 bits.
    pub fn from_dynamic(img: DynamicImage) -> Result<Self, DecodeError> {
        if img.width() == 0 || img.height() == 0 {
            return Err(DecodeError::EmptyImage);
        }

        let pixels = match img {
            DynamicImage::ImageLuma8(gray) => Pixels::Gray(gray),
            DynamicImage::ImageRgb8(rgb) => Pixels::Rgb(rgb),
            DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA16(_) => Pixels::Gray(img.to_luma8()),
            other => Pixels::Rgb(other.to_rgb8()),
        };

        Ok(Self { pixels })
    }

    /// Wrap a grayscale buffer.
    pub fn from_gray(gray: GrayImage) -> Result<Self, DecodeError> {
        Self::from_dynamic(DynamicImage::ImageLuma8(gray))
    }

    pub fn width(&self) -> u32 {
        match &self.pixels {
            Pixels::Gray(img) => img.width(),
            Pixels::Rgb(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match &self.pixels {
            Pixels::Gray(img) => img.height(),
            Pixels::Rgb(img) => img.height(),
        }
    }

    pub fn color_mode(&self) -> ColorMode {
        match &self.pixels {
            Pixels::Gray(_) => ColorMode::Grayscale,
            Pixels::Rgb(_) => ColorMode::Rgb,
        }
    }

    pub fn channels(&self) -> u8 {
        self.color_mode().channels()
    }

    /// Raw interleaved samples, row-major.
    pub fn as_raw(&self) -> &[u8] {
        match &self.pixels {
            Pixels::Gray(img) => img.as_raw(),
            Pixels::Rgb(img) => img.as_raw(),
        }
    }

    /// The grayscale buffer, if this image is single-channel.
    pub fn as_gray(&self) -> Option<&GrayImage> {
        match &self.pixels {
            Pixels::Gray(img) => Some(img),
            Pixels::Rgb(_) => None,
        }
    }

    /// The RGB buffer, if this image has three channels.
    pub fn as_rgb(&self) -> Option<&RgbImage> {
        match &self.pixels {
            Pixels::Gray(_) => None,
            Pixels::Rgb(img) => Some(img),
        }
    }

    /// Luminance-weighted single-channel copy.
    pub fn to_luma(&self) -> GrayImage {
        match &self.pixels {
            Pixels::Gray(img) => img.clone(),
            Pixels::Rgb(img) => imageops::grayscale(img),
        }
    }

    pub fn to_dynamic(&self) -> DynamicImage {
        match &self.pixels {
            Pixels::Gray(img) => DynamicImage::ImageLuma8(img.clone()),
            Pixels::Rgb(img) => DynamicImage::ImageRgb8(img.clone()),
        }
    }

    /// Encode as PNG (lossless, so decoding yields identical samples).
    pub fn encode_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut buf = Cursor::new(Vec::new());
        self.to_dynamic().write_to(&mut buf, ImageFormat::Png)?;
        Ok(buf.into_inner())
    }

    /// Write as a PNG file.
    pub fn save_png(&self, path: &Path) -> Result<(), image::ImageError> {
        self.to_dynamic().save_with_format(path, ImageFormat::Png)
    }
}

/// The input shapes accepted by [`normalize`].
#[derive(Debug, Clone)]
pub enum ImageInput {
    /// An already-decoded pixel buffer.
    Pixels(DynamicImage),
    /// Encoded image container bytes (PNG, JPEG, GIF, ...).
    Bytes(Vec<u8>),
    /// Either a path (when it starts with `/` or `.`) or base64-encoded bytes.
    Text(String),
    /// A path to an image file.
    Path(PathBuf),
}

impl From<DynamicImage> for ImageInput {
    fn from(img: DynamicImage) -> Self {
        ImageInput::Pixels(img)
    }
}

impl From<Vec<u8>> for ImageInput {
    fn from(bytes: Vec<u8>) -> Self {
        ImageInput::Bytes(bytes)
    }
}

impl From<String> for ImageInput {
    fn from(text: String) -> Self {
        ImageInput::Text(text)
    }
}

impl From<&str> for ImageInput {
    fn from(text: &str) -> Self {
        ImageInput::Text(text.to_string())
    }
}

impl From<PathBuf> for ImageInput {
    fn from(path: PathBuf) -> Self {
        ImageInput::Path(path)
    }
}

/// Turn any supported input into a canonical [`Image`].
pub fn normalize(input: ImageInput) -> Result<Image, DecodeError> {
    match input {
        ImageInput::Pixels(img) => Image::from_dynamic(img),
        ImageInput::Bytes(bytes) => decode_bytes(&bytes),
        ImageInput::Path(path) => load_path(&path),
        ImageInput::Text(text) => decode_text(&text),
    }
}

fn decode_bytes(bytes: &[u8]) -> Result<Image, DecodeError> {
    let img = image::load_from_memory(bytes)?;
    Image::from_dynamic(img)
}

fn load_path(path: &Path) -> Result<Image, DecodeError> {
    let bytes = std::fs::read(path).map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_bytes(&bytes)
}

fn looks_like_path(text: &str) -> bool {
    text.starts_with('/') || text.starts_with('.')
}

fn decode_text(text: &str) -> Result<Image, DecodeError> {
    if looks_like_path(text) {
        return load_path(Path::new(text));
    }

    let encoded = base64::engine::general_purpose::STANDARD
        .decode(text.trim())
        .map_err(DecodeError::from)
        .and_then(|bytes| decode_bytes(&bytes));

    match encoded {
        Ok(img) => Ok(img),
        Err(encoded_err) => {
            tracing::debug!("Text input is not base64 image data ({}), trying as path", encoded_err);
            load_path(Path::new(text)).map_err(|path_err| DecodeError::Unresolvable {
                encoded: encoded_err.to_string(),
                path: path_err.to_string(),
            })
        }
    }
}
