//! Off-screen render surface reused across search attempts.
//!
//! The search loop owns exactly one surface per invocation. Each attempt
//! reconfigures it to the candidate dimensions, blits the decoded source into
//! it and encodes the result; the source is never decoded twice. The canvas
//! buffer is only reallocated when the candidate dimensions change.
//!
//! ## Progressive downscaling
//!
//! A single resampling pass over a large reduction skips source pixels and
//! produces aliasing. When an axis must shrink by more than 1.5× the blit
//! halves that axis repeatedly (never below the target), then a final
//! Lanczos3 pass lands exactly on the requested size.

use crate::config::OutputFormat;
use crate::error::ImageHorseError;
use crate::pipeline::encode::encode_pixels;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use std::borrow::Cow;

/// Reduction ratio above which an axis is halved before the final pass.
pub const HALVING_THRESHOLD: f64 = 1.5;

/// Luminance at or above which a pixel becomes white in black & white mode.
pub const BW_THRESHOLD: u8 = 128;

/// A mutable RGBA drawing area.
///
/// Starts with zero area; encoding before the first `resize`/`blit` fails
/// with [`ImageHorseError::EncodeFailed`].
#[derive(Debug, Clone, Default)]
pub struct RenderSurface {
    canvas: RgbaImage,
}

impl RenderSurface {
    /// A surface of the given size, cleared to transparent black.
    pub fn new(width: u32, height: u32) -> Result<Self, ImageHorseError> {
        let mut surface = Self::default();
        surface.resize(width, height)?;
        Ok(surface)
    }

    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.canvas
    }

    /// Reconfigure backing storage for `width × height`.
    ///
    /// A size change reallocates and clears the canvas; the same size keeps
    /// the existing buffer and its content.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), ImageHorseError> {
        if width == 0 || height == 0 {
            return Err(ImageHorseError::Validation(format!(
                "surface dimensions must be ≥ 1, got {width}x{height}"
            )));
        }
        if self.canvas.dimensions() != (width, height) {
            self.canvas = RgbaImage::new(width, height);
        }
        Ok(())
    }

    /// Draw `source` scaled to fill `dest_width × dest_height`.
    ///
    /// The surface takes the destination size.
    pub fn blit(
        &mut self,
        source: &RgbaImage,
        dest_width: u32,
        dest_height: u32,
    ) -> Result<(), ImageHorseError> {
        if source.width() == 0 || source.height() == 0 {
            return Err(ImageHorseError::Validation(
                "cannot blit an empty source".into(),
            ));
        }
        self.resize(dest_width, dest_height)?;
        let scaled = scale_progressive(source, dest_width, dest_height);
        self.canvas.copy_from_slice(scaled.as_raw());
        Ok(())
    }

    /// Convert every pixel to pure black or pure white by luminance.
    ///
    /// Uses Rec. 601 weights; alpha is left as is.
    pub fn grayscale_threshold(&mut self) {
        for pixel in self.canvas.pixels_mut() {
            let [r, g, b, _] = pixel.0;
            let luma = 0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b);
            let v = if luma >= f64::from(BW_THRESHOLD) {
                255
            } else {
                0
            };
            pixel.0[0] = v;
            pixel.0[1] = v;
            pixel.0[2] = v;
        }
    }

    /// Serialise the current content. Allocates a fresh buffer per call.
    pub fn encode(&self, format: OutputFormat, quality: f64) -> Result<Vec<u8>, ImageHorseError> {
        encode_pixels(&self.canvas, format, quality)
    }
}

/// Resample `source` to exactly `w × h`, halving oversized axes first.
fn scale_progressive(source: &RgbaImage, w: u32, h: u32) -> Cow<'_, RgbaImage> {
    let mut current: Cow<'_, RgbaImage> = Cow::Borrowed(source);

    loop {
        let (cw, ch) = current.dimensions();
        let (nw, nh) = (halve_toward(cw, w), halve_toward(ch, h));
        if (nw, nh) == (cw, ch) {
            break;
        }
        current = Cow::Owned(imageops::resize(current.as_ref(), nw, nh, FilterType::Triangle));
    }

    if current.dimensions() == (w, h) {
        return current;
    }
    Cow::Owned(imageops::resize(current.as_ref(), w, h, FilterType::Lanczos3))
}

/// Next halving step for one axis, or `current` when no halving is needed.
fn halve_toward(current: u32, target: u32) -> u32 {
    if f64::from(current) / f64::from(target) > HALVING_THRESHOLD {
        current.div_ceil(2).max(target)
    } else {
        current
    }
}
