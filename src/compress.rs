//! Eager compression entry points.
//!
//! Every function here takes an already-loaded [`SourceImage`] (see
//! [`crate::pipeline::input::load_source`] for paths and URLs), decodes it
//! once and returns when the search has finished. Use
//! [`crate::stream::compress_stream`] to receive batch results as they
//! complete.

use crate::config::{
    CompressionConfig, CompressionLevel, CompressionRequest, CompressionTarget, OutputFormat,
};
use crate::error::{ImageHorseError, ItemError};
use crate::output::{BatchItem, BatchOutput, CompressionResult, ImageReport};
use crate::pipeline::decode::{self, DecodedImage};
use crate::pipeline::dimensions::{clamp_to_limits, plan_dimensions};
use crate::pipeline::run_blocking;
use crate::pipeline::search::{run_search, SearchParams};
use crate::recommend::{estimate_compressed_size, recommended_settings};
use crate::score::calculate_core_web_vitals_score;
use crate::source::SourceImage;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Search for an encoding of `source` no larger than `target_kb`.
///
/// This is the primary entry point. The starting quality (and the black &
/// white transform) come from `config.default_level`; the starting
/// dimensions come from the planner bounds in `config`.
///
/// # Returns
/// `Ok(CompressionResult)` whenever at least one attempt encoded, even if
/// the target was not met (check `result.met_target`).
///
/// # Errors
/// - `Validation` for `target_kb ≤ 0`, `max_attempts == 0` or an oversized
///   payload, before any decoding happens
/// - `DecodeFailed` / `EncodeFailed`, never retried
/// - `Cancelled` when the config's token fires between attempts
pub async fn compress_aggressively(
    source: &SourceImage,
    target_kb: f64,
    format: OutputFormat,
    max_attempts: u32,
    config: &CompressionConfig,
) -> Result<CompressionResult, ImageHorseError> {
    let level = config.default_level;
    search_planned(source, level, format, target_kb, max_attempts, config).await
}

/// Compress at a level's starting quality and size hint.
pub async fn compress_level(
    source: &SourceImage,
    level: CompressionLevel,
    format: OutputFormat,
    config: &CompressionConfig,
) -> Result<CompressionResult, ImageHorseError> {
    search_planned(
        source,
        level,
        format,
        level.target_kb(),
        config.max_attempts,
        config,
    )
    .await
}

/// Execute an explicit [`CompressionRequest`].
///
/// Aspect-locked requests fit the source inside `width × height`; unlocked
/// requests use the dimensions as given. Both are then clamped to
/// `config.limits`. A [`CompressionTarget::Quality`] target encodes exactly
/// once at that quality.
pub async fn compress(
    source: &SourceImage,
    request: &CompressionRequest,
    config: &CompressionConfig,
) -> Result<CompressionResult, ImageHorseError> {
    request.validate(&config.limits)?;
    check_source_size(source, config)?;

    let decoded = decode::decode(source).await?;
    let (orig_w, orig_h) = (decoded.width(), decoded.height());
    let (w, h) = if request.lock_aspect {
        plan_dimensions(orig_w, orig_h, request.width, request.height, true)?
    } else {
        (request.width, request.height)
    };
    let (width, height) = clamp_to_limits(w, h, orig_w, orig_h, &config.limits)?;

    let params = match request.target {
        CompressionTarget::SizeKb(target_kb) => SearchParams {
            label: source.name().to_string(),
            target_kb,
            format: request.format,
            start_quality: request.level.quality_fraction(),
            width,
            height,
            max_attempts: config.max_attempts,
            quality_floor: config.quality_floor,
            black_and_white: request.level.is_black_and_white(),
        },
        CompressionTarget::Quality(quality) => single_pass(
            source,
            request.format,
            quality,
            (width, height),
            request.level.is_black_and_white(),
        ),
    };

    run_search(&decoded, source.byte_len(), &params, config).await
}

/// Encode once at an explicit quality fraction, at the planned dimensions.
///
/// The quick-compress path: no search, no shared state.
pub async fn compress_with_quality(
    source: &SourceImage,
    quality: f64,
    format: OutputFormat,
    config: &CompressionConfig,
) -> Result<CompressionResult, ImageHorseError> {
    if !(0.0..=1.0).contains(&quality) {
        return Err(ImageHorseError::Validation(format!(
            "quality must be within [0, 1], got {quality}"
        )));
    }
    check_source_size(source, config)?;

    let decoded = decode::decode(source).await?;
    let dims = planned_dimensions(&decoded, config)?;
    let params = single_pass(source, format, quality, dims, false);
    run_search(&decoded, source.byte_len(), &params, config).await
}

/// Compress every source at `level`, one after another, in input order.
///
/// A failed image is recorded in its [`BatchItem`] and the batch moves on.
/// Once the config's token fires, the remaining images are marked cancelled.
pub async fn compress_all(
    sources: &[SourceImage],
    level: CompressionLevel,
    format: OutputFormat,
    config: &CompressionConfig,
) -> BatchOutput {
    let start = Instant::now();
    let total = sources.len();
    info!("Compressing batch of {} images at {} as {}", total, level, format);

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let mut items = Vec::with_capacity(total);
    for (index, source) in sources.iter().enumerate() {
        if index > 0 && config.batch_yield_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.batch_yield_ms)).await;
        }
        items.push(compress_item(index, total, source, level, format, config).await);
    }

    let output = BatchOutput::from_items(items, start.elapsed().as_millis() as u64);
    info!(
        "Batch complete: {}/{} compressed, {} failed, {} cancelled, {}ms",
        output.stats.compressed_items,
        total,
        output.stats.failed_items,
        output.stats.cancelled_items,
        output.stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, output.stats.compressed_items);
    }
    output
}

/// Compress at `level` and write the result to `output_path`.
///
/// Writes to a temporary file in the destination directory and renames it
/// into place, so readers never see a partial file.
pub async fn compress_to_file(
    source: &SourceImage,
    level: CompressionLevel,
    format: OutputFormat,
    output_path: impl AsRef<Path>,
    config: &CompressionConfig,
) -> Result<CompressionResult, ImageHorseError> {
    let result = compress_level(source, level, format, config).await?;
    save_result(result, output_path).await
}

/// Write a result's payload to `output_path` atomically and hand it back.
///
/// Missing parent directories are created.
pub async fn save_result(
    result: CompressionResult,
    output_path: impl AsRef<Path>,
) -> Result<CompressionResult, ImageHorseError> {
    let path = output_path.as_ref().to_path_buf();
    run_blocking(move || {
        write_atomic(&path, &result.data)?;
        info!("Wrote {} bytes to {}", result.size, path.display());
        Ok(result)
    })
    .await
}

/// Synchronous wrapper around [`compress_level`].
///
/// Creates a temporary tokio runtime internally; do not call from async code.
pub fn compress_sync(
    source: &SourceImage,
    level: CompressionLevel,
    format: OutputFormat,
    config: &CompressionConfig,
) -> Result<CompressionResult, ImageHorseError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ImageHorseError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(compress_level(source, level, format, config))
}

/// Score a source and recommend settings without encoding anything.
///
/// Only the image header is read.
pub async fn inspect(source: &SourceImage) -> Result<ImageReport, ImageHorseError> {
    let (width, height) = decode::probe(source).await?;
    let size = source.byte_len();
    let recommendation = recommended_settings(width, height, size as u64, source.mime())?;
    let estimated_size = estimate_compressed_size(
        width,
        height,
        size as u64,
        recommendation.target_width,
        recommendation.target_height,
        recommendation.format,
        recommendation.level,
    );

    Ok(ImageReport {
        name: source.name().to_string(),
        mime: source.mime().to_string(),
        width,
        height,
        size,
        score: calculate_core_web_vitals_score(width, height, Some(size as u64)),
        recommendation,
        estimated_size,
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Compress one batch entry, reporting through the progress callback.
///
/// Shared by [`compress_all`] and [`crate::stream::compress_stream`].
pub(crate) async fn compress_item(
    index: usize,
    total: usize,
    source: &SourceImage,
    level: CompressionLevel,
    format: OutputFormat,
    config: &CompressionConfig,
) -> BatchItem {
    let name = source.name().to_string();

    let outcome = if config.is_cancelled() {
        Err(ImageHorseError::Cancelled { name: name.clone() })
    } else {
        if let Some(ref cb) = config.progress_callback {
            cb.on_item_start(index, total, &name);
        }
        compress_level(source, level, format, config).await
    };

    match outcome {
        Ok(result) => {
            debug!(
                "Image {}/{} '{}': {} → {} bytes ({}%)",
                index + 1,
                total,
                name,
                result.original_size,
                result.size,
                result.savings_percent
            );
            if let Some(ref cb) = config.progress_callback {
                cb.on_item_complete(index, total, &result);
            }
            BatchItem {
                index,
                name,
                result: Some(Arc::new(result)),
                error: None,
            }
        }
        Err(e) => {
            warn!("Image {}/{} '{}' failed: {}", index + 1, total, name, e);
            if let Some(ref cb) = config.progress_callback {
                cb.on_item_error(index, total, &e.to_string());
            }
            BatchItem {
                index,
                error: Some(ItemError::from_fatal(index, &name, &e)),
                name,
                result: None,
            }
        }
    }
}

/// Level-driven search at the planner's dimensions.
async fn search_planned(
    source: &SourceImage,
    level: CompressionLevel,
    format: OutputFormat,
    target_kb: f64,
    max_attempts: u32,
    config: &CompressionConfig,
) -> Result<CompressionResult, ImageHorseError> {
    if !(target_kb > 0.0) {
        return Err(ImageHorseError::Validation(format!(
            "target size must be > 0 KB, got {target_kb}"
        )));
    }
    if max_attempts == 0 {
        return Err(ImageHorseError::Validation(
            "max_attempts must be ≥ 1".into(),
        ));
    }
    check_source_size(source, config)?;

    let decoded = decode::decode(source).await?;
    let (width, height) = planned_dimensions(&decoded, config)?;

    let params = SearchParams {
        label: source.name().to_string(),
        target_kb,
        format,
        start_quality: level.quality_fraction(),
        width,
        height,
        max_attempts,
        quality_floor: config.quality_floor,
        black_and_white: level.is_black_and_white(),
    };
    run_search(&decoded, source.byte_len(), &params, config).await
}

/// Parameters for a single encode at `quality`, whatever the size.
fn single_pass(
    source: &SourceImage,
    format: OutputFormat,
    quality: f64,
    (width, height): (u32, u32),
    black_and_white: bool,
) -> SearchParams {
    SearchParams {
        label: source.name().to_string(),
        target_kb: f64::INFINITY,
        format,
        start_quality: quality,
        width,
        height,
        max_attempts: 1,
        // A zero floor hands the caller's quality to the encoder unclamped.
        quality_floor: 0.0,
        black_and_white,
    }
}

fn planned_dimensions(
    decoded: &DecodedImage,
    config: &CompressionConfig,
) -> Result<(u32, u32), ImageHorseError> {
    let (orig_w, orig_h) = (decoded.width(), decoded.height());
    let (w, h) = plan_dimensions(
        orig_w,
        orig_h,
        config.max_width,
        config.max_height,
        config.lock_aspect,
    )?;
    clamp_to_limits(w, h, orig_w, orig_h, &config.limits)
}

fn check_source_size(
    source: &SourceImage,
    config: &CompressionConfig,
) -> Result<(), ImageHorseError> {
    if source.byte_len() > config.max_source_bytes {
        return Err(ImageHorseError::Validation(format!(
            "'{}' is {} bytes, limit is {}",
            source.name(),
            source.byte_len(),
            config.max_source_bytes
        )));
    }
    Ok(())
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), ImageHorseError> {
    let write_err = |source: std::io::Error| ImageHorseError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir: PathBuf = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
    tmp.write_all(data).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_source(name: &str, w: u32, h: u32) -> SourceImage {
        let img = RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x * 255 / w) as u8, (y * 255 / h) as u8, 60, 255])
        });
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        SourceImage::from_bytes(name, buf)
    }

    fn fast_config() -> CompressionConfig {
        CompressionConfig::builder().batch_yield_ms(0).build().unwrap()
    }

    #[tokio::test]
    async fn non_positive_target_is_rejected_before_decode() {
        let junk = SourceImage::from_bytes("junk", b"not an image".to_vec());
        let err = compress_aggressively(&junk, 0.0, OutputFormat::Jpeg, 5, &fast_config())
            .await
            .unwrap_err();
        assert!(matches!(err, ImageHorseError::Validation(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn huge_attempt_budget_stops_at_first_fit() {
        let src = png_source("tiny.png", 16, 16);
        let r = compress_aggressively(&src, 1000.0, OutputFormat::Png, u32::MAX, &fast_config())
            .await
            .unwrap();
        assert_eq!(r.attempts, 1);
        assert!(r.met_target);
    }

    #[tokio::test]
    async fn planner_bounds_apply() {
        let src = png_source("wide.png", 400, 200);
        let config = CompressionConfig::builder()
            .max_dimensions(100, 100)
            .build()
            .unwrap();
        let r = compress_aggressively(&src, 500.0, OutputFormat::Png, 3, &config)
            .await
            .unwrap();
        assert_eq!((r.width, r.height), (100, 50));
        assert_eq!(r.quality, CompressionLevel::Medium.quality_fraction());
    }

    #[tokio::test]
    async fn explicit_quality_request_encodes_once() {
        let src = png_source("q.png", 120, 80);
        let req = CompressionRequest {
            width: 60,
            height: 60,
            format: OutputFormat::Jpeg,
            level: CompressionLevel::Medium,
            lock_aspect: true,
            target: CompressionTarget::Quality(0.05),
        };
        let r = compress(&src, &req, &fast_config()).await.unwrap();
        assert_eq!(r.attempts, 1);
        assert_eq!(r.quality, 0.05);
        assert_eq!((r.width, r.height), (60, 40));
    }

    #[tokio::test]
    async fn unlocked_request_uses_given_box() {
        let src = png_source("box.png", 120, 80);
        let req = CompressionRequest {
            width: 50,
            height: 50,
            format: OutputFormat::Webp,
            level: CompressionLevel::High,
            lock_aspect: false,
            target: CompressionTarget::SizeKb(100.0),
        };
        let r = compress(&src, &req, &fast_config()).await.unwrap();
        assert_eq!((r.width, r.height), (50, 50));
        assert!(r.met_target);
    }

    #[tokio::test]
    async fn quick_compress_rejects_bad_quality() {
        let src = png_source("a.png", 20, 20);
        assert!(matches!(
            compress_with_quality(&src, 1.2, OutputFormat::Jpeg, &fast_config()).await,
            Err(ImageHorseError::Validation(_))
        ));
        let r = compress_with_quality(&src, 0.4, OutputFormat::Jpeg, &fast_config())
            .await
            .unwrap();
        assert_eq!(r.quality, 0.4);
        assert_eq!(r.attempts, 1);
    }

    #[tokio::test]
    async fn oversized_source_is_rejected() {
        let src = png_source("big.png", 64, 64);
        let config = CompressionConfig::builder()
            .max_source_bytes(16)
            .build()
            .unwrap();
        let err = compress_level(&src, CompressionLevel::Low, OutputFormat::Png, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, ImageHorseError::Validation(_)));
    }

    #[tokio::test]
    async fn inspect_reports_without_encoding() {
        let src = png_source("graphic.png", 64, 48);
        let report = inspect(&src).await.unwrap();
        assert_eq!((report.width, report.height), (64, 48));
        assert_eq!(report.mime, "image/png");
        assert_eq!(report.recommendation.format, OutputFormat::Png);
        assert_eq!(report.recommendation.level, CompressionLevel::Low);
        assert_eq!(report.score, crate::score::WebVitalsScore::Good);
    }

    #[tokio::test]
    async fn to_file_writes_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.webp");
        let src = png_source("a.png", 40, 30);
        let r = compress_to_file(
            &src,
            CompressionLevel::Medium,
            OutputFormat::Webp,
            &path,
            &fast_config(),
        )
        .await
        .unwrap();
        let written = std::fs::read(&path).unwrap();
        assert_eq!(written, r.data);
        assert_eq!(&written[..4], b"RIFF");
    }

    #[test]
    fn sync_wrapper_runs_its_own_runtime() {
        let src = png_source("s.png", 30, 30);
        let r = compress_sync(&src, CompressionLevel::Low, OutputFormat::Png, &fast_config())
            .unwrap();
        assert_eq!(r.attempts, 1);
        assert!(r.met_target);
    }
}
