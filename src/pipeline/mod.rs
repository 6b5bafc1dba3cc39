//! Pipeline stages for adaptive image compression.
//!
//! Each submodule implements exactly one step. Keeping stages separate makes
//! each independently testable and keeps the search loop free of codec
//! details.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ decode ──▶ dimensions ──▶ search ⟲ (surface.blit ──▶ surface.encode)
//! (path/URL)  (RGBA)    (planner)      (quality/size loop)
//! ```
//!
//! 1. [`input`]     : resolve a path or URL into a [`crate::source::SourceImage`]
//! 2. [`decode`]    : payload → shared RGBA buffer; runs on the blocking pool
//! 3. [`dimensions`]: plan and clamp the target size (pure)
//! 4. [`surface`]   : reusable canvas: progressive blit, B&W threshold, encode
//! 5. [`encode`]    : per-format encoders behind `surface.encode`
//! 6. [`search`]    : the bounded quality/dimension search

pub mod decode;
pub mod dimensions;
pub mod encode;
pub mod input;
pub mod search;
pub mod surface;

use crate::error::ImageHorseError;

/// Run CPU-bound work on tokio's blocking pool and await it.
///
/// Decoding, resampling and encoding all scale with pixel count; running
/// them inline would stall the async workers.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, ImageHorseError>
where
    F: FnOnce() -> Result<T, ImageHorseError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ImageHorseError::Internal(format!("Blocking task panicked: {e}")))?
}
