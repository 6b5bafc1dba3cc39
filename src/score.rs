//! Core-Web-Vitals-style rating of an image's page-load impact.
//!
//! Two independent ratings are computed: one from pixel count, one from
//! byte size. The worse of the two is reported. Pixel thresholds carry
//! a ±20 000 px buffer so an image just above 1200×900 still rates
//! "almost there" rather than jumping straight to "needs improvement".

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pixel count rated "good": 1200 × 900.
pub const GOOD_PIXELS: u64 = 1200 * 900;
/// Pixel count above which an image rates "poor": 1800 × 1200.
pub const POOR_PIXELS: u64 = 1800 * 1200;
/// Tolerance around the pixel thresholds.
pub const PIXEL_BUFFER: u64 = 20_000;
/// Byte size rated "good": 100 KB.
pub const GOOD_BYTES: u64 = 100 * 1024;
/// Byte size above which an image rates "poor": 500 KB.
pub const POOR_BYTES: u64 = 500 * 1024;

/// Four-level rating, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WebVitalsScore {
    Good,
    AlmostThere,
    NeedsImprovement,
    Poor,
}

impl fmt::Display for WebVitalsScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WebVitalsScore::Good => "good",
            WebVitalsScore::AlmostThere => "almost-there",
            WebVitalsScore::NeedsImprovement => "needs-improvement",
            WebVitalsScore::Poor => "poor",
        })
    }
}

/// Rate an image by its dimensions and, optionally, its encoded size.
pub fn calculate_core_web_vitals_score(
    width: u32,
    height: u32,
    byte_size: Option<u64>,
) -> WebVitalsScore {
    let by_pixels = pixel_score(u64::from(width) * u64::from(height));
    match byte_size {
        Some(bytes) => by_pixels.max(size_score(bytes)),
        None => by_pixels,
    }
}

fn pixel_score(pixels: u64) -> WebVitalsScore {
    if pixels <= GOOD_PIXELS - PIXEL_BUFFER {
        WebVitalsScore::Good
    } else if pixels <= GOOD_PIXELS + PIXEL_BUFFER {
        WebVitalsScore::AlmostThere
    } else if pixels <= POOR_PIXELS - PIXEL_BUFFER {
        WebVitalsScore::NeedsImprovement
    } else {
        WebVitalsScore::Poor
    }
}

fn size_score(bytes: u64) -> WebVitalsScore {
    if bytes <= GOOD_BYTES {
        WebVitalsScore::Good
    } else if bytes > POOR_BYTES {
        WebVitalsScore::Poor
    } else {
        WebVitalsScore::NeedsImprovement
    }
}
