//! The originally ingested image.

use std::fmt;
use std::sync::{Arc, OnceLock};

/// An uploaded image: payload, declared MIME type and lazily resolved size.
///
/// The payload is shared (`Arc<[u8]>`) and never mutated, so cloning a
/// `SourceImage` is cheap and the compression core can hold it read-only
/// while the session layer keeps ownership. Width and height are resolved on
/// first decode and are immutable from then on.
#[derive(Clone)]
pub struct SourceImage {
    name: String,
    mime: String,
    bytes: Arc<[u8]>,
    dimensions: Arc<OnceLock<(u32, u32)>>,
}

impl SourceImage {
    /// Wrap a payload, sniffing the MIME type from its magic bytes.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        let mime = sniff_mime(&bytes);
        Self::with_mime(name, mime, bytes)
    }

    /// Wrap a payload with a MIME type supplied by the ingestion layer.
    pub fn with_mime(
        name: impl Into<String>,
        mime: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes: bytes.into(),
            dimensions: Arc::new(OnceLock::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the payload, for moving into blocking tasks.
    pub fn payload(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    /// Always the payload's actual length.
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// `(width, height)` once a decode has resolved them.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions.get().copied()
    }

    /// Record decoded dimensions. The first call wins; later calls are ignored.
    pub(crate) fn resolve_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        *self.dimensions.get_or_init(|| (width, height))
    }
}

impl fmt::Debug for SourceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceImage")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("byte_len", &self.bytes.len())
            .field("dimensions", &self.dimensions())
            .finish()
    }
}

/// MIME type from magic bytes, `application/octet-stream` when unknown.
pub fn sniff_mime(bytes: &[u8]) -> String {
    image::guess_format(bytes)
        .map(|f| f.to_mime_type().to_string())
        .unwrap_or_else(|_| "application/octet-stream".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn sniffs_png_and_jpeg() {
        assert_eq!(sniff_mime(&PNG_MAGIC), "image/png");
        assert_eq!(sniff_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(sniff_mime(b"hello"), "application/octet-stream");
    }

    #[test]
    fn byte_len_matches_payload() {
        let src = SourceImage::from_bytes("x.png", PNG_MAGIC.to_vec());
        assert_eq!(src.byte_len(), 8);
        assert_eq!(src.mime(), "image/png");
    }

    #[test]
    fn dimensions_resolve_once() {
        let src = SourceImage::with_mime("x", "image/png", vec![1u8, 2, 3]);
        assert_eq!(src.dimensions(), None);
        assert_eq!(src.resolve_dimensions(10, 20), (10, 20));
        assert_eq!(src.resolve_dimensions(99, 99), (10, 20));

        // Clones share the resolved size.
        let clone = src.clone();
        assert_eq!(clone.dimensions(), Some((10, 20)));
    }
}
