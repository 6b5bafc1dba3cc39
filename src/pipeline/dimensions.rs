//! Dimension planning: original size + constraints → validated target size.
//!
//! Pure functions, no I/O. Planning never upscales when the aspect ratio is
//! locked; clamping then forces each axis into the configured scale band and
//! absolute pixel limits.

use crate::config::DimensionLimits;
use crate::error::ImageHorseError;

/// Fit `orig_w × orig_h` inside `max_w × max_h`.
///
/// With `lock_aspect`, both axes share the scale factor
/// `min(max_w / orig_w, max_h / orig_h, 1)`. Without it each axis is clamped
/// to its own maximum independently.
pub fn plan_dimensions(
    orig_w: u32,
    orig_h: u32,
    max_w: u32,
    max_h: u32,
    lock_aspect: bool,
) -> Result<(u32, u32), ImageHorseError> {
    if orig_w == 0 || orig_h == 0 {
        return Err(ImageHorseError::Validation(format!(
            "original dimensions must be positive, got {orig_w}x{orig_h}"
        )));
    }
    if max_w == 0 || max_h == 0 {
        return Err(ImageHorseError::Validation(format!(
            "maximum dimensions must be positive, got {max_w}x{max_h}"
        )));
    }

    if !lock_aspect {
        return Ok((orig_w.min(max_w), orig_h.min(max_h)));
    }

    let scale = (f64::from(max_w) / f64::from(orig_w))
        .min(f64::from(max_h) / f64::from(orig_h))
        .min(1.0);

    Ok((scale_axis(orig_w, scale), scale_axis(orig_h, scale)))
}

/// Clamp a requested size into the limits derived from the original size.
///
/// Each axis lands in
/// `[max(min_dimension, orig × min_scale), min(max_dimension, orig × max_scale)]`.
/// For originals so small or so large that this band is empty, the absolute
/// pixel limits win.
pub fn clamp_to_limits(
    w: u32,
    h: u32,
    orig_w: u32,
    orig_h: u32,
    limits: &DimensionLimits,
) -> Result<(u32, u32), ImageHorseError> {
    if orig_w == 0 || orig_h == 0 {
        return Err(ImageHorseError::Validation(format!(
            "original dimensions must be positive, got {orig_w}x{orig_h}"
        )));
    }

    let w = clamp_axis(w, orig_w, limits);
    let h = clamp_axis(h, orig_h, limits);

    if w == 0 || h == 0 {
        return Err(ImageHorseError::Validation(format!(
            "dimensions collapsed to {w}x{h} after clamping"
        )));
    }
    Ok((w, h))
}

/// Multiply and round, never below one pixel.
pub(crate) fn scale_axis(v: u32, factor: f64) -> u32 {
    (f64::from(v) * factor).round().max(1.0) as u32
}

fn clamp_axis(v: u32, orig: u32, limits: &DimensionLimits) -> u32 {
    let floor = f64::from(limits.min_dimension);
    let ceiling = f64::from(limits.max_dimension);
    let scaled_min = f64::from(orig) * limits.min_scale;
    let scaled_max = f64::from(orig) * limits.max_scale;

    let lo = floor.max(scaled_min).ceil();
    let hi = ceiling.min(scaled_max).floor();

    let (lo, hi) = if lo <= hi {
        (lo, hi)
    } else if scaled_max < floor {
        (floor, floor)
    } else {
        (ceiling, ceiling)
    };

    f64::from(v).clamp(lo, hi) as u32
}
