//! Human-readable byte sizes: `"300KB"`, `"1.5 MB"`, `"2048"`.
//!
//! Sizes use binary multiples throughout the crate: 1 KB = 1024 bytes.

use crate::error::ImageHorseError;
use once_cell::sync::Lazy;
use regex::Regex;

static SIZE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(\d+(?:\.\d+)?)\s*(b|kb?|kib|mb?|mib|gb?|gib)?\s*$")
        .expect("static regex is valid")
});

/// Parse a size string into bytes.
///
/// A bare number is bytes. Units are case-insensitive.
pub fn parse_size(s: &str) -> Result<u64, ImageHorseError> {
    let caps = SIZE_RE
        .captures(s)
        .ok_or_else(|| ImageHorseError::Validation(format!("invalid size '{s}'")))?;

    let value: f64 = caps[1]
        .parse()
        .map_err(|_| ImageHorseError::Validation(format!("invalid size '{s}'")))?;

    let multiplier = match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        None => 1.0,
        Some(unit) => match unit.as_str() {
            "b" => 1.0,
            "k" | "kb" | "kib" => 1024.0,
            "m" | "mb" | "mib" => 1024.0 * 1024.0,
            _ => 1024.0 * 1024.0 * 1024.0,
        },
    };

    Ok((value * multiplier).round() as u64)
}

/// Format a byte count with two decimals: `"1.50 MB"`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log(THRESHOLD) as usize).min(UNITS.len() - 1);
    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    format!("{:.2} {}", size, UNITS[unit_index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_units() {
        assert_eq!(parse_size("2048").unwrap(), 2048);
        assert_eq!(parse_size("300KB").unwrap(), 300 * 1024);
        assert_eq!(parse_size("300 kb").unwrap(), 300 * 1024);
        assert_eq!(parse_size("1.5MB").unwrap(), 1_572_864);
        assert_eq!(parse_size("1g").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_size("12B").unwrap(), 12);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("fast").is_err());
        assert!(parse_size("-3KB").is_err());
        assert!(parse_size("3 parsecs").is_err());
    }

    #[test]
    fn formats_sizes() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512.00 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }
}
