//! Bounded quality/size search: the core of the engine.
//!
//! ## State machine
//!
//! ```text
//! Init ──▶ Rendering ──▶ Measuring ──┬──▶ Accepted   (size ≤ target)
//!              ▲                     ├──▶ Exhausted  (attempt budget spent)
//!              └───── Adjusting ◀────┘
//! ```
//!
//! Every adjustment multiplies the quality by 0.8 (never below the floor).
//! From the second attempt on, a result still more than 1.5× over target
//! also shrinks both axes by 20%, so stubborn sources lose pixels as well as
//! quality. Quality and dimensions therefore never increase within a search.
//!
//! Exhaustion is a normal exit: the smallest result seen is returned with
//! `met_target = false`. Decode and encode failures abort immediately and
//! are never retried; only the quality/dimension parameters are.

use crate::config::{CompressionConfig, OutputFormat};
use crate::error::ImageHorseError;
use crate::output::{savings_percentage, AttemptRecord, CompressionResult};
use crate::pipeline::decode::DecodedImage;
use crate::pipeline::dimensions::scale_axis;
use crate::pipeline::run_blocking;
use crate::pipeline::surface::RenderSurface;
use std::sync::Arc;
use tracing::{debug, info};

/// Multiplier applied to the quality on every adjustment.
pub const QUALITY_DECAY: f64 = 0.8;
/// Multiplier applied to both axes when a result is far over target.
pub const DIMENSION_DECAY: f64 = 0.8;
/// Size/target ratio above which dimensions shrink too.
pub const OVERSIZE_RATIO: f64 = 1.5;
/// Attempts completed before dimension shrinking may start.
pub const SHRINK_AFTER_ATTEMPTS: u32 = 2;
/// Lowest quality handed to an encoder unless the caller's floor is zero.
pub const MIN_ENCODE_QUALITY: f64 = 0.1;

/// Fully resolved starting point of a search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    /// Source name, used in logs and progress events.
    pub label: String,
    pub target_kb: f64,
    pub format: OutputFormat,
    pub start_quality: f64,
    pub width: u32,
    pub height: u32,
    pub max_attempts: u32,
    pub quality_floor: f64,
    /// Apply the grayscale threshold before every encode.
    pub black_and_white: bool,
}

impl SearchParams {
    fn validate(&self) -> Result<(), ImageHorseError> {
        if !(self.target_kb > 0.0) {
            return Err(ImageHorseError::Validation(format!(
                "target size must be > 0 KB, got {}",
                self.target_kb
            )));
        }
        if self.max_attempts == 0 {
            return Err(ImageHorseError::Validation(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ImageHorseError::Validation(format!(
                "start dimensions must be ≥ 1, got {}x{}",
                self.width, self.height
            )));
        }
        if !(0.0..=1.0).contains(&self.start_quality) || !(0.0..=1.0).contains(&self.quality_floor)
        {
            return Err(ImageHorseError::Validation(format!(
                "quality {} / floor {} must lie within [0, 1]",
                self.start_quality, self.quality_floor
            )));
        }
        Ok(())
    }

    /// Format actually produced.
    ///
    /// Black & white output needs an encoder that keeps pure tones, so a
    /// JPEG request is written as PNG.
    fn output_format(&self) -> OutputFormat {
        if self.black_and_white && !self.format.keeps_pure_tones() {
            OutputFormat::Png
        } else {
            self.format
        }
    }

    /// Quality actually handed to the encoder.
    fn encode_quality(&self, quality: f64) -> f64 {
        let lower = if self.quality_floor <= 0.0 {
            0.0
        } else {
            MIN_ENCODE_QUALITY
        };
        quality.clamp(lower, 1.0)
    }
}

/// What the loop does after measuring an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Accepted,
    Exhausted,
    Adjust,
}

/// An attempt kept as the current best, with its payload.
struct Candidate {
    record: AttemptRecord,
    data: Vec<u8>,
}

/// Ephemeral loop state; dropped (with every buffer it holds) on exit.
struct SearchState {
    quality: f64,
    width: u32,
    height: u32,
    attempts: u32,
    best: Option<Candidate>,
    history: Vec<AttemptRecord>,
}

impl SearchState {
    fn new(params: &SearchParams) -> Self {
        Self {
            quality: params.start_quality,
            width: params.width,
            height: params.height,
            attempts: 0,
            best: None,
            history: Vec::new(),
        }
    }

    /// Record an attempt and decide the next step.
    ///
    /// Best = the attempt that met the target; otherwise the smallest seen
    /// (earliest wins ties).
    fn measure(&mut self, record: AttemptRecord, data: Vec<u8>, params: &SearchParams) -> Step {
        self.history.push(record);

        if record.size_kb() <= params.target_kb {
            self.best = Some(Candidate { record, data });
            return Step::Accepted;
        }

        let improves = self
            .best
            .as_ref()
            .is_none_or(|best| record.size < best.record.size);
        if improves {
            self.best = Some(Candidate { record, data });
        }

        if self.attempts >= params.max_attempts {
            Step::Exhausted
        } else {
            Step::Adjust
        }
    }

    /// Lower quality and, for far-oversized results, dimensions.
    fn adjust(&mut self, last_size_kb: f64, params: &SearchParams) {
        self.quality = (self.quality * QUALITY_DECAY)
            .max(params.quality_floor)
            .min(self.quality);

        if self.attempts >= SHRINK_AFTER_ATTEMPTS && last_size_kb > params.target_kb * OVERSIZE_RATIO
        {
            self.width = scale_axis(self.width, DIMENSION_DECAY).min(self.width);
            self.height = scale_axis(self.height, DIMENSION_DECAY).min(self.height);
            debug!(
                "'{}': still {:.1} KB over a {:.1} KB target, shrinking to {}x{}",
                params.label, last_size_kb, params.target_kb, self.width, self.height
            );
        }
    }

    fn finish(
        self,
        params: &SearchParams,
        original_size: usize,
        met_target: bool,
    ) -> Result<CompressionResult, ImageHorseError> {
        let best = self.best.ok_or_else(|| {
            ImageHorseError::Internal(format!("search for '{}' ended with no attempt", params.label))
        })?;

        Ok(CompressionResult {
            size: best.data.len(),
            data: best.data,
            format: params.output_format(),
            width: best.record.width,
            height: best.record.height,
            quality: best.record.quality,
            original_size,
            savings_percent: savings_percentage(original_size, best.record.size),
            attempts: self.attempts,
            met_target,
            history: self.history,
        })
    }
}

/// Search for the highest-quality encoding of `decoded` that fits the target.
///
/// Runs at most `params.max_attempts` render+encode cycles, strictly one
/// after another. The cancellation token in `config` is checked before each
/// attempt; a cancelled search returns [`ImageHorseError::Cancelled`] and
/// drops every buffer it produced.
pub async fn run_search(
    decoded: &DecodedImage,
    original_size: usize,
    params: &SearchParams,
    config: &CompressionConfig,
) -> Result<CompressionResult, ImageHorseError> {
    params.validate()?;

    info!(
        "Searching '{}': {} ≤ {:.1} KB from {}x{} @ q={:.2}, ≤{} attempts",
        params.label,
        params.format,
        params.target_kb,
        params.width,
        params.height,
        params.start_quality,
        params.max_attempts
    );

    let format = params.output_format();
    if format != params.format {
        debug!(
            "'{}': black & white output written as {} instead of {}",
            params.label, format, params.format
        );
    }

    let mut state = SearchState::new(params);
    let mut surface = RenderSurface::new(params.width, params.height)?;
    let pixels = decoded.shared();

    loop {
        if config.is_cancelled() {
            info!(
                "'{}': cancelled after {} attempts",
                params.label, state.attempts
            );
            return Err(ImageHorseError::Cancelled {
                name: params.label.clone(),
            });
        }

        state.attempts += 1;
        let (width, height) = (state.width, state.height);
        let quality = params.encode_quality(state.quality);
        let black_and_white = params.black_and_white;

        // ── Rendering ────────────────────────────────────────────────────
        let source = Arc::clone(&pixels);
        surface = run_blocking(move || {
            surface.blit(&source, width, height)?;
            if black_and_white {
                surface.grayscale_threshold();
            }
            Ok(surface)
        })
        .await?;

        // ── Measuring ────────────────────────────────────────────────────
        let (returned, data) = run_blocking(move || {
            let data = surface.encode(format, quality)?;
            Ok((surface, data))
        })
        .await?;
        surface = returned;

        let record = AttemptRecord {
            attempt: state.attempts,
            width,
            height,
            quality,
            size: data.len(),
        };
        debug!(
            "'{}' attempt {}/{}: {}x{} q={:.3} → {:.1} KB",
            params.label,
            record.attempt,
            params.max_attempts,
            width,
            height,
            quality,
            record.size_kb()
        );
        if let Some(ref cb) = config.progress_callback {
            cb.on_attempt(&params.label, &record);
        }

        match state.measure(record, data, params) {
            Step::Accepted => {
                info!(
                    "'{}': {:.1} KB after {} attempts",
                    params.label,
                    record.size_kb(),
                    state.attempts
                );
                return state.finish(params, original_size, true);
            }
            Step::Exhausted => {
                info!(
                    "'{}': target {:.1} KB not reached in {} attempts, returning best effort",
                    params.label, params.target_kb, state.attempts
                );
                return state.finish(params, original_size, false);
            }
            Step::Adjust => state.adjust(record.size_kb(), params),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tokio_util::sync::CancellationToken;

    fn noisy(w: u32, h: u32) -> DecodedImage {
        let mut state = 0x9e37_79b9_u32;
        DecodedImage::from(RgbaImage::from_fn(w, h, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let [a, b, c, _] = state.to_le_bytes();
            Rgba([a, b, c, 255])
        }))
    }

    fn gradient(w: u32, h: u32) -> DecodedImage {
        DecodedImage::from(RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x * 255 / w) as u8, (y * 255 / h) as u8, 90, 255])
        }))
    }

    fn params(w: u32, h: u32, format: OutputFormat, target_kb: f64) -> SearchParams {
        SearchParams {
            label: "test".into(),
            target_kb,
            format,
            start_quality: 0.75,
            width: w,
            height: h,
            max_attempts: 6,
            quality_floor: 0.1,
            black_and_white: false,
        }
    }

    #[tokio::test]
    async fn generous_target_accepts_first_attempt() {
        let img = gradient(200, 150);
        let mut p = params(200, 150, OutputFormat::Png, 1000.0);
        p.start_quality = 0.95;
        let r = run_search(&img, 50_000, &p, &CompressionConfig::default())
            .await
            .unwrap();
        assert_eq!(r.attempts, 1);
        assert_eq!(r.history.len(), 1);
        assert!(r.met_target);
        assert_eq!(r.quality, 0.95);
        assert_eq!((r.width, r.height), (200, 150));
        assert_eq!(r.size, r.data.len());
    }

    #[tokio::test]
    async fn unreachable_target_spends_budget_monotonically() {
        let img = noisy(300, 200);
        // No JPEG fits in 200 bytes: headers alone are larger.
        let p = params(300, 200, OutputFormat::Jpeg, 0.2);
        let r = run_search(&img, 200_000, &p, &CompressionConfig::default())
            .await
            .unwrap();

        assert!(!r.met_target);
        assert_eq!(r.attempts, 6);
        assert_eq!(r.history.len(), 6);

        for pair in r.history.windows(2) {
            assert!(pair[1].quality <= pair[0].quality, "{:?}", pair);
            assert!(pair[1].width <= pair[0].width, "{:?}", pair);
            assert!(pair[1].height <= pair[0].height, "{:?}", pair);
        }

        // Dimensions hold for two attempts, then shrink by 20%.
        assert_eq!(r.history[1].width, 300);
        assert_eq!((r.history[2].width, r.history[2].height), (240, 160));

        let smallest = r.history.iter().map(|a| a.size).min().unwrap();
        assert_eq!(r.size, smallest);
        assert_eq!(r.size, r.data.len());
    }

    #[tokio::test]
    async fn quality_respects_floor() {
        let img = noisy(64, 64);
        let mut p = params(64, 64, OutputFormat::Jpeg, 0.2);
        p.start_quality = 0.3;
        p.quality_floor = 0.25;
        p.max_attempts = 4;
        let r = run_search(&img, 10_000, &p, &CompressionConfig::default())
            .await
            .unwrap();
        let qualities: Vec<f64> = r.history.iter().map(|a| a.quality).collect();
        assert_eq!(qualities, vec![0.3, 0.25, 0.25, 0.25]);
    }

    #[tokio::test]
    async fn start_below_floor_never_rises() {
        let img = noisy(32, 32);
        let mut p = params(32, 32, OutputFormat::Jpeg, 0.2);
        p.start_quality = 0.2;
        p.quality_floor = 0.5;
        p.max_attempts = 3;
        let r = run_search(&img, 10_000, &p, &CompressionConfig::default())
            .await
            .unwrap();
        assert!(r.history.iter().all(|a| a.quality <= 0.2 + 1e-12));
    }

    #[tokio::test]
    async fn zero_floor_allows_quality_below_tenth() {
        let img = noisy(32, 32);
        let mut p = params(32, 32, OutputFormat::Jpeg, 0.2);
        p.start_quality = 0.2;
        p.quality_floor = 0.0;
        p.max_attempts = 5;
        let r = run_search(&img, 10_000, &p, &CompressionConfig::default())
            .await
            .unwrap();
        let last = r.history.last().unwrap().quality;
        assert!(last < MIN_ENCODE_QUALITY, "last quality {last}");
    }

    #[tokio::test]
    async fn invalid_params_fail_before_rendering() {
        let img = gradient(10, 10);
        let config = CompressionConfig::default();

        let mut p = params(10, 10, OutputFormat::Png, 0.0);
        assert!(matches!(
            run_search(&img, 1, &p, &config).await,
            Err(ImageHorseError::Validation(_))
        ));

        p.target_kb = -5.0;
        assert!(run_search(&img, 1, &p, &config).await.is_err());

        p.target_kb = 10.0;
        p.max_attempts = 0;
        assert!(matches!(
            run_search(&img, 1, &p, &config).await,
            Err(ImageHorseError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn cancelled_search_returns_no_result() {
        let img = gradient(50, 50);
        let token = CancellationToken::new();
        token.cancel();
        let config = CompressionConfig::builder()
            .cancel_token(token)
            .build()
            .unwrap();
        let err = run_search(&img, 1, &params(50, 50, OutputFormat::Png, 10.0), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, ImageHorseError::Cancelled { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn black_and_white_output_is_binary() {
        let img = gradient(80, 60);
        let mut p = params(80, 60, OutputFormat::Png, 100.0);
        p.black_and_white = true;
        let r = run_search(&img, 1, &p, &CompressionConfig::default())
            .await
            .unwrap();
        let out = image::load_from_memory(&r.data).unwrap().into_rgba8();
        for px in out.pixels() {
            let [red, green, blue, _] = px.0;
            assert!(red == green && green == blue);
            assert!(red == 0 || red == 255);
        }
    }

    #[tokio::test]
    async fn black_and_white_jpeg_request_stays_binary() {
        let img = gradient(160, 120);
        let mut p = params(160, 120, OutputFormat::Jpeg, 100.0);
        p.black_and_white = true;
        let r = run_search(&img, 1, &p, &CompressionConfig::default())
            .await
            .unwrap();
        assert_eq!(r.format, OutputFormat::Png);
        let out = image::load_from_memory(&r.data).unwrap().into_rgba8();
        let impure = out
            .pixels()
            .filter(|px| {
                let [red, green, blue, _] = px.0;
                !(red == green && green == blue && (red == 0 || red == 255))
            })
            .count();
        assert_eq!(impure, 0);
    }

    #[tokio::test]
    async fn huge_attempt_budget_is_not_preallocated() {
        let img = gradient(16, 16);
        let mut p = params(16, 16, OutputFormat::Png, 1000.0);
        p.max_attempts = u32::MAX;
        let r = run_search(&img, 1, &p, &CompressionConfig::default())
            .await
            .unwrap();
        assert_eq!(r.attempts, 1);
        assert!(r.met_target);
    }

    #[test]
    fn only_jpeg_is_rerouted_for_black_and_white() {
        let mut p = params(1, 1, OutputFormat::Jpeg, 1.0);
        assert_eq!(p.output_format(), OutputFormat::Jpeg);
        p.black_and_white = true;
        assert_eq!(p.output_format(), OutputFormat::Png);
        p.format = OutputFormat::Webp;
        assert_eq!(p.output_format(), OutputFormat::Webp);
    }

    #[test]
    fn encode_quality_clamps() {
        let mut p = params(1, 1, OutputFormat::Jpeg, 1.0);
        assert_eq!(p.encode_quality(0.05), MIN_ENCODE_QUALITY);
        assert_eq!(p.encode_quality(1.0), 1.0);
        p.quality_floor = 0.0;
        assert_eq!(p.encode_quality(0.05), 0.05);
    }
}
