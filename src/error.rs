//! Error types for the imagehorse library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ImageHorseError`]: **Fatal** for one operation: the image cannot be
//!   read, decoded or encoded, or the caller's constraints contradict each
//!   other. Returned as `Err(ImageHorseError)` from every `compress*` entry
//!   point.
//!
//! * [`ItemError`]: **Non-fatal**: one image of a batch failed but the rest
//!   of the batch is fine. Stored inside [`crate::output::BatchItem`] so a
//!   single corrupt upload never aborts "compress all".
//!
//! Missing the numeric size target is *not* an error. The search loop returns
//! its best-effort result and sets
//! [`crate::output::CompressionResult::met_target`] to `false`.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the imagehorse library.
#[derive(Debug, Error)]
pub enum ImageHorseError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Codec errors ──────────────────────────────────────────────────────
    /// Payload is not a supported raster format, or is truncated/corrupt.
    #[error("Failed to decode '{name}': {detail}")]
    DecodeFailed { name: String, detail: String },

    /// The encoder rejected the surface/format/quality combination.
    #[error("Failed to encode {format}: {detail}")]
    EncodeFailed { format: String, detail: String },

    // ── Caller errors ─────────────────────────────────────────────────────
    /// A caller-supplied constraint is self-contradictory.
    ///
    /// Always reported before any rendering work begins.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The request was cancelled between two search attempts.
    #[error("Compression of '{name}' was cancelled")]
    Cancelled { name: String },

    /// A search is already running against this image.
    #[error("Image {id} already has a compression in flight")]
    Busy { id: u64 },

    /// The gallery has no entry with this id.
    #[error("No image with id {id} in the gallery")]
    UnknownImage { id: u64 },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the compressed output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ImageHorseError {
    /// `true` for the decode/encode hard failures that abort a search.
    pub fn is_codec_failure(&self) -> bool {
        matches!(
            self,
            ImageHorseError::DecodeFailed { .. } | ImageHorseError::EncodeFailed { .. }
        )
    }
}

/// A non-fatal error for a single image of a batch.
///
/// Stored alongside [`crate::output::BatchItem`] when an image fails.
/// The batch continues with the next image.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// The image could not be compressed.
    #[error("Image {index} ('{name}'): {detail}")]
    Failed {
        index: usize,
        name: String,
        detail: String,
    },

    /// The batch was cancelled before this image finished.
    #[error("Image {index} ('{name}'): cancelled")]
    Cancelled { index: usize, name: String },
}

impl ItemError {
    /// Wrap a fatal per-image error for storage in a batch item.
    pub fn from_fatal(index: usize, name: &str, err: &ImageHorseError) -> Self {
        match err {
            ImageHorseError::Cancelled { .. } => ItemError::Cancelled {
                index,
                name: name.to_string(),
            },
            other => ItemError::Failed {
                index,
                name: name.to_string(),
                detail: other.to_string(),
            },
        }
    }
}
