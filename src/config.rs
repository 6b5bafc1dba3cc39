//! Configuration types for adaptive image compression.
//!
//! All engine behaviour is controlled through [`CompressionConfig`], built
//! via its [`CompressionConfigBuilder`]. The per-call knobs (what size, which
//! format) live in [`CompressionRequest`] or in the entry-point arguments;
//! the config holds everything that stays fixed across a session: planner
//! bounds, clamp limits, the attempt budget and the quality floor.

use crate::error::ImageHorseError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Configuration shared by every compression entry point.
///
/// Built via [`CompressionConfig::builder()`] or using
/// [`CompressionConfig::default()`].
///
/// # Example
/// ```rust
/// use imagehorse::CompressionConfig;
///
/// let config = CompressionConfig::builder()
///     .max_dimensions(1280, 720)
///     .max_attempts(6)
///     .quality_floor(0.2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct CompressionConfig {
    /// Dimension Planner width bound for planned searches. Default: 1920.
    pub max_width: u32,

    /// Dimension Planner height bound for planned searches. Default: 1080.
    pub max_height: u32,

    /// Preserve the source aspect ratio when planning. Default: true.
    pub lock_aspect: bool,

    /// Scale and absolute pixel limits applied after planning.
    pub limits: DimensionLimits,

    /// Maximum render+encode cycles per search. Default: 8.
    ///
    /// This budget, not wall-clock time, bounds a search. A source that is
    /// still oversized after the last attempt yields the smallest result
    /// seen so far.
    pub max_attempts: u32,

    /// Lowest quality fraction the multiplicative backoff may reach. Default: 0.1.
    pub quality_floor: f64,

    /// Starting level for [`crate::compress::compress_aggressively`]. Default: medium.
    pub default_level: CompressionLevel,

    /// Images compressed at the same time by [`crate::stream::compress_stream`]. Default: 1.
    ///
    /// Each image is still searched strictly sequentially; concurrency only
    /// spans different images.
    pub concurrency: usize,

    /// Pause between items of a sequential batch, in milliseconds. Default: 10.
    pub batch_yield_ms: u64,

    /// Largest accepted source payload in bytes. Default: 50 MiB.
    pub max_source_bytes: usize,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives batch, item and attempt events.
    pub progress_callback: Option<ProgressCallback>,

    /// Checked before every search attempt.
    pub cancel_token: Option<CancellationToken>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
            lock_aspect: true,
            limits: DimensionLimits::default(),
            max_attempts: 8,
            quality_floor: 0.1,
            default_level: CompressionLevel::default(),
            concurrency: 1,
            batch_yield_ms: 10,
            max_source_bytes: 50 * 1024 * 1024,
            download_timeout_secs: 120,
            progress_callback: None,
            cancel_token: None,
        }
    }
}

impl fmt::Debug for CompressionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressionConfig")
            .field("max_width", &self.max_width)
            .field("max_height", &self.max_height)
            .field("lock_aspect", &self.lock_aspect)
            .field("limits", &self.limits)
            .field("max_attempts", &self.max_attempts)
            .field("quality_floor", &self.quality_floor)
            .field("default_level", &self.default_level)
            .field("concurrency", &self.concurrency)
            .field("batch_yield_ms", &self.batch_yield_ms)
            .field("max_source_bytes", &self.max_source_bytes)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn CompressionProgressCallback>"),
            )
            .field("cancel_token", &self.cancel_token.is_some())
            .finish()
    }
}

impl CompressionConfig {
    /// Create a new builder for `CompressionConfig`.
    pub fn builder() -> CompressionConfigBuilder {
        CompressionConfigBuilder {
            config: Self::default(),
        }
    }

    /// `true` once the configured cancellation token has fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

/// Builder for [`CompressionConfig`].
#[derive(Debug)]
pub struct CompressionConfigBuilder {
    config: CompressionConfig,
}

impl CompressionConfigBuilder {
    pub fn max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.config.max_width = width.max(1);
        self.config.max_height = height.max(1);
        self
    }

    pub fn lock_aspect(mut self, v: bool) -> Self {
        self.config.lock_aspect = v;
        self
    }

    pub fn limits(mut self, limits: DimensionLimits) -> Self {
        self.config.limits = limits;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn quality_floor(mut self, floor: f64) -> Self {
        self.config.quality_floor = floor.clamp(0.0, 1.0);
        self
    }

    pub fn default_level(mut self, level: CompressionLevel) -> Self {
        self.config.default_level = level;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn batch_yield_ms(mut self, ms: u64) -> Self {
        self.config.batch_yield_ms = ms;
        self
    }

    pub fn max_source_bytes(mut self, n: usize) -> Self {
        self.config.max_source_bytes = n;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.config.cancel_token = Some(token);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CompressionConfig, ImageHorseError> {
        let c = &self.config;
        c.limits.validate()?;
        if c.max_width > c.limits.max_dimension || c.max_height > c.limits.max_dimension {
            return Err(ImageHorseError::InvalidConfig(format!(
                "max dimensions {}x{} exceed the {}px ceiling",
                c.max_width, c.max_height, c.limits.max_dimension
            )));
        }
        if c.max_source_bytes == 0 {
            return Err(ImageHorseError::InvalidConfig(
                "max_source_bytes must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Limits ───────────────────────────────────────────────────────────────

/// Bounds applied by [`crate::pipeline::dimensions::clamp_to_limits`].
///
/// Each output dimension lands in
/// `[max(min_dimension, orig × min_scale), min(max_dimension, orig × max_scale)]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionLimits {
    pub min_scale: f64,
    pub max_scale: f64,
    pub min_dimension: u32,
    pub max_dimension: u32,
}

impl Default for DimensionLimits {
    fn default() -> Self {
        Self {
            min_scale: 0.1,
            max_scale: 2.0,
            min_dimension: 10,
            max_dimension: 4096,
        }
    }
}

impl DimensionLimits {
    fn validate(&self) -> Result<(), ImageHorseError> {
        if !(self.min_scale > 0.0 && self.min_scale <= self.max_scale) {
            return Err(ImageHorseError::InvalidConfig(format!(
                "scale bounds must satisfy 0 < min ≤ max, got {}..{}",
                self.min_scale, self.max_scale
            )));
        }
        if self.min_dimension == 0 || self.min_dimension > self.max_dimension {
            return Err(ImageHorseError::InvalidConfig(format!(
                "dimension limits must satisfy 1 ≤ floor ≤ ceiling, got {}..{}",
                self.min_dimension, self.max_dimension
            )));
        }
        Ok(())
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// User-facing preset bundling a starting quality and a target size hint.
///
/// | level | quality | target |
/// |-------|---------|--------|
/// | low | 95% | 1000 KB |
/// | medium | 85% | 500 KB |
/// | high | 75% | 300 KB |
/// | extremeSmall | 60% | 150 KB |
/// | extremeBW | 30% | 100 KB, black & white threshold |
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum CompressionLevel {
    Low,
    #[default]
    Medium,
    High,
    ExtremeSmall,
    /// Pure black & white output. A JPEG request is encoded as PNG.
    #[serde(rename = "extremeBW")]
    ExtremeBw,
}

impl CompressionLevel {
    pub const ALL: [CompressionLevel; 5] = [
        CompressionLevel::Low,
        CompressionLevel::Medium,
        CompressionLevel::High,
        CompressionLevel::ExtremeSmall,
        CompressionLevel::ExtremeBw,
    ];

    /// Starting quality in percent.
    pub fn quality_percent(self) -> u8 {
        match self {
            CompressionLevel::Low => 95,
            CompressionLevel::Medium => 85,
            CompressionLevel::High => 75,
            CompressionLevel::ExtremeSmall => 60,
            CompressionLevel::ExtremeBw => 30,
        }
    }

    /// Starting quality as a fraction in [0, 1].
    pub fn quality_fraction(self) -> f64 {
        f64::from(self.quality_percent()) / 100.0
    }

    /// Target size hint in kilobytes.
    pub fn target_kb(self) -> f64 {
        match self {
            CompressionLevel::Low => 1000.0,
            CompressionLevel::Medium => 500.0,
            CompressionLevel::High => 300.0,
            CompressionLevel::ExtremeSmall => 150.0,
            CompressionLevel::ExtremeBw => 100.0,
        }
    }

    /// Whether this level forces the grayscale-threshold transform.
    pub fn is_black_and_white(self) -> bool {
        matches!(self, CompressionLevel::ExtremeBw)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompressionLevel::Low => "low",
            CompressionLevel::Medium => "medium",
            CompressionLevel::High => "high",
            CompressionLevel::ExtremeSmall => "extremeSmall",
            CompressionLevel::ExtremeBw => "extremeBW",
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output encodings the engine can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Lossy, photographic default.
    #[default]
    Jpeg,
    /// Lossless, alpha-capable. Quality is accepted but ignored.
    Png,
    /// Modern format, typically the smallest output.
    Webp,
}

impl OutputFormat {
    /// Relative size factor used by [`crate::recommend::estimate_compressed_size`].
    pub fn size_factor(self) -> f64 {
        match self {
            OutputFormat::Jpeg => 1.0,
            OutputFormat::Webp => 0.7,
            OutputFormat::Png => 1.2,
        }
    }

    /// Whether pure black and pure white pixels survive encoding unchanged.
    ///
    /// JPEG's block transform rings around hard edges; PNG is lossless and
    /// the WebP palette always keeps 0 and 255.
    pub fn keeps_pure_tones(self) -> bool {
        !matches!(self, OutputFormat::Jpeg)
    }

    pub fn mime(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
        })
    }
}

// ── Requests ─────────────────────────────────────────────────────────────

/// What a [`CompressionRequest`] optimises for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CompressionTarget {
    /// Search until the output is at most this many kilobytes.
    SizeKb(f64),
    /// Encode exactly once at this quality fraction.
    Quality(f64),
}

/// Parameters for one compression pass or search with explicit dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionRequest {
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    pub level: CompressionLevel,
    /// Fit inside `width × height` keeping the source aspect ratio.
    pub lock_aspect: bool,
    pub target: CompressionTarget,
}

impl CompressionRequest {
    /// Check the request against the configured limits.
    pub fn validate(&self, limits: &DimensionLimits) -> Result<(), ImageHorseError> {
        for (axis, v) in [("width", self.width), ("height", self.height)] {
            if v == 0 {
                return Err(ImageHorseError::Validation(format!("{axis} must be > 0")));
            }
            if v < limits.min_dimension || v > limits.max_dimension {
                return Err(ImageHorseError::Validation(format!(
                    "{axis} {v} outside {}..={} px",
                    limits.min_dimension, limits.max_dimension
                )));
            }
        }
        match self.target {
            CompressionTarget::SizeKb(kb) if !(kb > 0.0) => Err(ImageHorseError::Validation(
                format!("target size must be > 0 KB, got {kb}"),
            )),
            CompressionTarget::Quality(q) if !(0.0..=1.0).contains(&q) => Err(
                ImageHorseError::Validation(format!("quality must be within [0, 1], got {q}")),
            ),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_table_matches_presets() {
        let table: Vec<(u8, f64)> = CompressionLevel::ALL
            .iter()
            .map(|l| (l.quality_percent(), l.target_kb()))
            .collect();
        assert_eq!(
            table,
            vec![(95, 1000.0), (85, 500.0), (75, 300.0), (60, 150.0), (30, 100.0)]
        );
        assert!(CompressionLevel::ExtremeBw.is_black_and_white());
        assert!(!CompressionLevel::ExtremeSmall.is_black_and_white());
    }

    #[test]
    fn level_serde_names() {
        let json = serde_json::to_string(&CompressionLevel::ExtremeBw).unwrap();
        assert_eq!(json, "\"extremeBW\"");
        let level: CompressionLevel = serde_json::from_str("\"extremeSmall\"").unwrap();
        assert_eq!(level, CompressionLevel::ExtremeSmall);
    }

    #[test]
    fn builder_clamps() {
        let c = CompressionConfig::builder()
            .max_attempts(0)
            .quality_floor(3.0)
            .concurrency(0)
            .build()
            .unwrap();
        assert_eq!(c.max_attempts, 1);
        assert_eq!(c.quality_floor, 1.0);
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn builder_rejects_bad_limits() {
        let err = CompressionConfig::builder()
            .limits(DimensionLimits {
                min_dimension: 0,
                ..DimensionLimits::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, ImageHorseError::InvalidConfig(_)));

        let err = CompressionConfig::builder()
            .max_dimensions(8000, 8000)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("ceiling"));
    }

    #[test]
    fn request_validation() {
        let limits = DimensionLimits::default();
        let mut req = CompressionRequest {
            width: 800,
            height: 600,
            format: OutputFormat::Jpeg,
            level: CompressionLevel::High,
            lock_aspect: false,
            target: CompressionTarget::SizeKb(300.0),
        };
        assert!(req.validate(&limits).is_ok());

        req.target = CompressionTarget::SizeKb(0.0);
        assert!(matches!(
            req.validate(&limits),
            Err(ImageHorseError::Validation(_))
        ));

        req.target = CompressionTarget::Quality(1.5);
        assert!(req.validate(&limits).is_err());

        req.target = CompressionTarget::Quality(0.0);
        assert!(req.validate(&limits).is_ok());

        req.width = 5000;
        assert!(req.validate(&limits).is_err());
    }

    #[test]
    fn format_factors() {
        assert_eq!(OutputFormat::Jpeg.size_factor(), 1.0);
        assert_eq!(OutputFormat::Webp.size_factor(), 0.7);
        assert_eq!(OutputFormat::Png.size_factor(), 1.2);
        assert!(OutputFormat::Png.keeps_pure_tones());
        assert!(OutputFormat::Webp.keeps_pure_tones());
        assert!(!OutputFormat::Jpeg.keeps_pure_tones());
        assert_eq!(OutputFormat::Webp.to_string(), "webp");
    }
}
