//! Input resolution: normalise a user-supplied path or URL to a `SourceImage`.
//!
//! Local files are read with `tokio::fs`; URLs are downloaded with `reqwest`
//! under the configured timeout. In both cases the MIME type is sniffed from
//! the payload's magic bytes, not trusted from the extension or the server's
//! `Content-Type`.

use crate::error::ImageHorseError;
use crate::source::SourceImage;
use std::path::Path;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to an in-memory source image.
///
/// `max_bytes` bounds the payload; larger inputs are a validation error.
pub async fn load_source(
    input: &str,
    timeout_secs: u64,
    max_bytes: usize,
) -> Result<SourceImage, ImageHorseError> {
    if input.trim().is_empty() {
        return Err(ImageHorseError::InvalidInput {
            input: input.to_string(),
        });
    }

    let source = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        read_local(Path::new(input)).await?
    };

    if source.byte_len() > max_bytes {
        return Err(ImageHorseError::Validation(format!(
            "'{}' is {} bytes, limit is {}",
            source.name(),
            source.byte_len(),
            max_bytes
        )));
    }
    Ok(source)
}

/// Read a local file, mapping the common I/O failures to typed errors.
async fn read_local(path: &Path) -> Result<SourceImage, ImageHorseError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ImageHorseError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ImageHorseError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    debug!("Read local image: {} ({} bytes)", path.display(), bytes.len());
    Ok(SourceImage::from_bytes(name, bytes))
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<SourceImage, ImageHorseError> {
    info!("Downloading image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ImageHorseError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ImageHorseError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ImageHorseError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ImageHorseError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ImageHorseError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes from {}", bytes.len(), url);
    Ok(SourceImage::from_bytes(extract_filename(url), bytes.to_vec()))
}

/// Extract a reasonable filename from the URL path.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded-image".to_string()
}
