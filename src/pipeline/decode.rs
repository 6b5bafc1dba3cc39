//! Raster decoding: `SourceImage` payload → RGBA pixel buffer.
//!
//! Decoding is CPU-bound and proportional to pixel count, so it runs on the
//! blocking pool. The decoded buffer is converted to RGBA8 exactly once and
//! shared behind an `Arc`; every search attempt blits from that buffer
//! instead of decoding the payload again.

use crate::error::ImageHorseError;
use crate::pipeline::run_blocking;
use crate::source::SourceImage;
use image::{ImageReader, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

/// A decoded source, ready to blit.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pixels: Arc<RgbaImage>,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub(crate) fn shared(&self) -> Arc<RgbaImage> {
        Arc::clone(&self.pixels)
    }
}

impl From<RgbaImage> for DecodedImage {
    fn from(pixels: RgbaImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }
}

/// Decode a source image and resolve its dimensions.
///
/// Fails with [`ImageHorseError::DecodeFailed`] for unsupported, truncated or
/// corrupt payloads. Never retried.
pub async fn decode(source: &SourceImage) -> Result<DecodedImage, ImageHorseError> {
    let payload = source.payload();
    let name = source.name().to_string();

    let decoded = run_blocking(move || decode_blocking(&name, &payload)).await?;

    source.resolve_dimensions(decoded.width(), decoded.height());
    debug!(
        "Decoded '{}' → {}x{} px",
        source.name(),
        decoded.width(),
        decoded.height()
    );
    Ok(decoded)
}

/// Read the dimensions from the image header without decoding pixels.
pub async fn probe(source: &SourceImage) -> Result<(u32, u32), ImageHorseError> {
    let payload = source.payload();
    let name = source.name().to_string();

    let (width, height) = run_blocking(move || {
        let fail = |detail: String| ImageHorseError::DecodeFailed {
            name: name.clone(),
            detail,
        };
        let reader = ImageReader::new(Cursor::new(&payload[..]))
            .with_guessed_format()
            .map_err(|e| fail(e.to_string()))?;
        if reader.format().is_none() {
            return Err(fail("unrecognised image format".into()));
        }
        let dims = reader.into_dimensions().map_err(|e| fail(e.to_string()))?;
        if dims.0 == 0 || dims.1 == 0 {
            return Err(fail("image has zero area".into()));
        }
        Ok(dims)
    })
    .await?;

    Ok(source.resolve_dimensions(width, height))
}

/// Blocking implementation of [`decode`].
pub fn decode_blocking(name: &str, bytes: &[u8]) -> Result<DecodedImage, ImageHorseError> {
    let fail = |detail: String| ImageHorseError::DecodeFailed {
        name: name.to_string(),
        detail,
    };

    if bytes.is_empty() {
        return Err(fail("payload is empty".into()));
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| fail(e.to_string()))?;

    if reader.format().is_none() {
        return Err(fail("unrecognised image format".into()));
    }

    let image = reader.decode().map_err(|e| fail(e.to_string()))?;
    if image.width() == 0 || image.height() == 0 {
        return Err(fail("image has zero area".into()));
    }

    Ok(DecodedImage::from(image.into_rgba8()))
}
