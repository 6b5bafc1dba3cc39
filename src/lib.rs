//! # imagehorse
//!
//! Adaptive image compression: find the highest-quality encoding of an image
//! that fits a byte-size target, within a bounded number of attempts.
//!
//! ## Pipeline Overview
//!
//! ```text
//! path / URL / bytes
//!  │
//!  ├─ 1. Input    read a local file or download a URL, sniff the MIME type
//!  ├─ 2. Decode   payload → shared RGBA buffer (spawn_blocking, once)
//!  ├─ 3. Plan     fit the planner box, clamp to scale and pixel limits
//!  ├─ 4. Search   blit → (B&W threshold) → encode → measure, ≤ max_attempts
//!  │              quality × 0.8 per retry, dimensions × 0.8 when far over
//!  └─ 5. Output   smallest passing (or best-effort) result + attempt history
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imagehorse::{compress_level, load_source, CompressionConfig, CompressionLevel, OutputFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CompressionConfig::default();
//!     let source = load_source("holiday.jpg", 120, config.max_source_bytes).await?;
//!     let result = compress_level(&source, CompressionLevel::High, OutputFormat::Webp, &config).await?;
//!     eprintln!(
//!         "{}x{} q={:.2}: {} → {} bytes ({}% saved, target met: {})",
//!         result.width,
//!         result.height,
//!         result.quality,
//!         result.original_size,
//!         result.size,
//!         result.savings_percent,
//!         result.met_target,
//!     );
//!     std::fs::write(result.file_name(source.name()), &result.data)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `imagehorse` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! imagehorse = { version = "0.1", default-features = false }
//! ```
//!
//! ## Compression Levels
//!
//! | Level | Start quality | Target |
//! |-------|---------------|--------|
//! | `low` | 95% | 1000 KB |
//! | `medium` | 85% | 500 KB |
//! | `high` | 75% | 300 KB |
//! | `extremeSmall` | 60% | 150 KB |
//! | `extremeBW` | 30% | 100 KB, pure black & white |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod compress;
pub mod config;
pub mod error;
pub mod gallery;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod recommend;
pub mod score;
pub mod source;
pub mod stream;
pub mod units;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use compress::{
    compress, compress_aggressively, compress_all, compress_level, compress_sync,
    compress_to_file, compress_with_quality, inspect, save_result,
};
pub use config::{
    CompressionConfig, CompressionConfigBuilder, CompressionLevel, CompressionRequest,
    CompressionTarget, DimensionLimits, OutputFormat,
};
pub use error::{ImageHorseError, ItemError};
pub use gallery::{Gallery, GalleryEntry, GallerySnapshot, ImageId};
pub use output::{
    savings_percentage, AttemptRecord, BatchItem, BatchOutput, BatchStats, CompressionResult,
    ImageReport,
};
pub use pipeline::dimensions::{clamp_to_limits, plan_dimensions};
pub use pipeline::input::load_source;
pub use progress::{CompressionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use recommend::{estimate_compressed_size, recommended_settings, Recommendation};
pub use score::{calculate_core_web_vitals_score, WebVitalsScore};
pub use source::SourceImage;
pub use stream::{compress_inputs_stream, compress_stream, ItemStream};
