//! Recommendation engine and size estimator.
//!
//! Both are pure: they look at the original's size, byte count and format
//! and propose a starting point for the search loop without encoding
//! anything.

use crate::config::{
    CompressionLevel, CompressionRequest, CompressionTarget, DimensionLimits, OutputFormat,
};
use crate::error::ImageHorseError;
use crate::pipeline::dimensions::{clamp_to_limits, plan_dimensions};
use serde::{Deserialize, Serialize};

/// Pixel count above which a large source is downscaled.
pub const LARGE_PIXELS: u64 = 2_000_000;
/// Byte size above which a large source is downscaled.
pub const LARGE_BYTES: u64 = 1024 * 1024;
/// Byte size above which a photographic source is recompressed at `medium`.
pub const HEAVY_PHOTO_BYTES: u64 = 500 * 1024;
/// Bounding box for downscaled large sources.
pub const RECOMMENDED_MAX: (u32, u32) = (1920, 1080);

const PHOTOGRAPHIC_MIMES: [&str; 3] = ["image/jpeg", "image/jpg", "image/webp"];

/// Suggested starting settings for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub format: OutputFormat,
    pub level: CompressionLevel,
    pub target_width: u32,
    pub target_height: u32,
}

impl Recommendation {
    /// A size-targeted request for these settings.
    pub fn to_request(&self) -> CompressionRequest {
        CompressionRequest {
            width: self.target_width,
            height: self.target_height,
            format: self.format,
            level: self.level,
            lock_aspect: true,
            target: CompressionTarget::SizeKb(self.level.target_kb()),
        }
    }
}

/// Whether `mime` names a lossy photographic format.
pub fn is_photographic(mime: &str) -> bool {
    PHOTOGRAPHIC_MIMES
        .iter()
        .any(|m| m.eq_ignore_ascii_case(mime.trim()))
}

/// Propose format, level and dimensions for an original.
///
/// | condition | level | format | dimensions |
/// |---|---|---|---|
/// | > 2 MP and > 1 MB | high | jpeg if photographic, else webp | fit 1920×1080 |
/// | photographic and > 500 KB | medium | jpeg | unchanged |
/// | not photographic | low | png | unchanged |
/// | otherwise | medium | webp | unchanged |
pub fn recommended_settings(
    width: u32,
    height: u32,
    byte_size: u64,
    mime: &str,
) -> Result<Recommendation, ImageHorseError> {
    if width == 0 || height == 0 {
        return Err(ImageHorseError::Validation(format!(
            "original dimensions must be positive, got {width}x{height}"
        )));
    }

    let photographic = is_photographic(mime);
    let pixels = u64::from(width) * u64::from(height);

    if pixels > LARGE_PIXELS && byte_size > LARGE_BYTES {
        let (max_w, max_h) = RECOMMENDED_MAX;
        let (w, h) = plan_dimensions(width, height, max_w, max_h, true)?;
        let (w, h) = clamp_to_limits(w, h, width, height, &DimensionLimits::default())?;
        return Ok(Recommendation {
            format: if photographic {
                OutputFormat::Jpeg
            } else {
                OutputFormat::Webp
            },
            level: CompressionLevel::High,
            target_width: w,
            target_height: h,
        });
    }

    let (format, level) = if photographic && byte_size > HEAVY_PHOTO_BYTES {
        (OutputFormat::Jpeg, CompressionLevel::Medium)
    } else if !photographic {
        (OutputFormat::Png, CompressionLevel::Low)
    } else {
        (OutputFormat::Webp, CompressionLevel::Medium)
    };

    Ok(Recommendation {
        format,
        level,
        target_width: width,
        target_height: height,
    })
}

/// Estimate the encoded size of a resized original without encoding it.
///
/// `orig_size × (new_w × new_h) / (orig_w × orig_h) × quality% / 100 × format factor`.
/// Returns 0 for a zero-area original.
pub fn estimate_compressed_size(
    orig_width: u32,
    orig_height: u32,
    orig_size: u64,
    new_width: u32,
    new_height: u32,
    format: OutputFormat,
    level: CompressionLevel,
) -> u64 {
    let orig_area = f64::from(orig_width) * f64::from(orig_height);
    if orig_area == 0.0 {
        return 0;
    }
    let area_ratio = f64::from(new_width) * f64::from(new_height) / orig_area;
    let estimate = orig_size as f64 * area_ratio * level.quality_fraction() * format.size_factor();
    estimate.round().max(0.0) as u64
}
