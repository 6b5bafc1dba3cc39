//! Per-format encoders: RGBA surface pixels → compressed bytes.
//!
//! JPEG honours the quality fraction directly. PNG is lossless and ignores
//! it. WebP goes through the pure-Rust lossless encoder; below full quality
//! the RGB channels are first snapped to a coarser palette so that lower
//! quality still buys a smaller file.

use crate::config::OutputFormat;
use crate::error::ImageHorseError;
use image::buffer::ConvertBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage, RgbaImage};
use std::borrow::Cow;
use std::io::Cursor;
use tracing::debug;

/// Encode `pixels` as `format` at `quality` (fraction in [0, 1]).
pub fn encode_pixels(
    pixels: &RgbaImage,
    format: OutputFormat,
    quality: f64,
) -> Result<Vec<u8>, ImageHorseError> {
    let (width, height) = pixels.dimensions();
    if width == 0 || height == 0 {
        return Err(ImageHorseError::EncodeFailed {
            format: format.to_string(),
            detail: "surface has zero area".into(),
        });
    }
    if !(0.0..=1.0).contains(&quality) {
        return Err(ImageHorseError::EncodeFailed {
            format: format.to_string(),
            detail: format!("quality {quality} outside [0, 1]"),
        });
    }

    let fail = |e: image::ImageError| ImageHorseError::EncodeFailed {
        format: format.to_string(),
        detail: e.to_string(),
    };

    let mut buf = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            let rgb: RgbImage = pixels.convert();
            let encoder =
                JpegEncoder::new_with_quality(Cursor::new(&mut buf), jpeg_quality(quality));
            encoder
                .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
                .map_err(fail)?;
        }
        OutputFormat::Png => {
            let encoder = PngEncoder::new_with_quality(
                Cursor::new(&mut buf),
                CompressionType::Best,
                FilterType::Adaptive,
            );
            encoder
                .write_image(pixels.as_raw(), width, height, ExtendedColorType::Rgba8)
                .map_err(fail)?;
        }
        OutputFormat::Webp => {
            let levels = webp_levels(quality);
            let rgba: Cow<'_, RgbaImage> = if levels < 256 {
                let mut owned = pixels.clone();
                quantize_rgb(&mut owned, levels);
                Cow::Owned(owned)
            } else {
                Cow::Borrowed(pixels)
            };
            let encoder = WebPEncoder::new_lossless(Cursor::new(&mut buf));
            encoder
                .encode(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)
                .map_err(fail)?;
        }
    }

    debug!(
        "Encoded {}x{} {} @ q={:.3} → {} bytes",
        width,
        height,
        format,
        quality,
        buf.len()
    );
    Ok(buf)
}

/// Map a quality fraction onto the JPEG encoder's 1..=100 scale.
pub fn jpeg_quality(quality: f64) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Palette levels per RGB channel for a WebP quality fraction.
///
/// Quadratic so high qualities stay close to lossless while low qualities
/// collapse quickly to a few levels.
fn webp_levels(quality: f64) -> u16 {
    if quality >= 1.0 {
        return 256;
    }
    let q = quality.clamp(0.01, 1.0);
    (2.0 + q * q * 254.0).round().clamp(2.0, 256.0) as u16
}

/// Snap each RGB channel to `levels` evenly spaced values; alpha untouched.
fn quantize_rgb(pixels: &mut RgbaImage, levels: u16) {
    let step = 255.0 / (f32::from(levels) - 1.0);
    for pixel in pixels.pixels_mut() {
        for channel in pixel.0.iter_mut().take(3) {
            let bucket = (f32::from(*channel) / step).round();
            *channel = (bucket * step).round().clamp(0.0, 255.0) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn noisy(w: u32, h: u32) -> RgbaImage {
        let mut state = 0x2545_f491_u32;
        RgbaImage::from_fn(w, h, |x, y| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let n = (state & 0x3f) as u8;
            Rgba([
                (x * 255 / w.max(1)) as u8 ^ n,
                (y * 255 / h.max(1)) as u8 ^ n,
                n.wrapping_mul(3),
                255,
            ])
        })
    }

    #[test]
    fn jpeg_quality_mapping() {
        assert_eq!(jpeg_quality(0.0), 1);
        assert_eq!(jpeg_quality(0.754), 75);
        assert_eq!(jpeg_quality(1.0), 100);
    }

    #[test]
    fn zero_area_is_encode_error() {
        let empty = RgbaImage::new(0, 0);
        for format in [OutputFormat::Jpeg, OutputFormat::Png, OutputFormat::Webp] {
            let err = encode_pixels(&empty, format, 0.8).unwrap_err();
            assert!(matches!(err, ImageHorseError::EncodeFailed { .. }), "{format}: {err:?}");
        }
    }

    #[test]
    fn out_of_range_quality_is_encode_error() {
        let img = noisy(8, 8);
        assert!(encode_pixels(&img, OutputFormat::Jpeg, 1.5).is_err());
    }

    #[test]
    fn outputs_carry_magic_bytes() {
        let img = noisy(16, 16);
        let jpeg = encode_pixels(&img, OutputFormat::Jpeg, 0.8).unwrap();
        assert_eq!(&jpeg[..3], &[0xFF, 0xD8, 0xFF]);
        let png = encode_pixels(&img, OutputFormat::Png, 0.8).unwrap();
        assert_eq!(&png[1..4], b"PNG");
        let webp = encode_pixels(&img, OutputFormat::Webp, 0.8).unwrap();
        assert_eq!(&webp[..4], b"RIFF");
        assert_eq!(&webp[8..12], b"WEBP");
    }

    #[test]
    fn lower_jpeg_quality_is_smaller() {
        let img = noisy(96, 96);
        let high = encode_pixels(&img, OutputFormat::Jpeg, 0.95).unwrap();
        let low = encode_pixels(&img, OutputFormat::Jpeg, 0.2).unwrap();
        assert!(low.len() < high.len(), "{} !< {}", low.len(), high.len());
    }

    #[test]
    fn lower_webp_quality_is_smaller() {
        let img = noisy(96, 96);
        let high = encode_pixels(&img, OutputFormat::Webp, 1.0).unwrap();
        let low = encode_pixels(&img, OutputFormat::Webp, 0.1).unwrap();
        assert!(low.len() < high.len(), "{} !< {}", low.len(), high.len());
    }

    #[test]
    fn quantize_keeps_alpha() {
        let mut img = RgbaImage::from_pixel(2, 2, Rgba([100, 150, 200, 77]));
        quantize_rgb(&mut img, 2);
        for p in img.pixels() {
            assert_eq!(p.0[3], 77);
            assert!(p.0[..3].iter().all(|&c| c == 0 || c == 255));
        }
    }
}
