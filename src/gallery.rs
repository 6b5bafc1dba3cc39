//! Owned gallery of uploaded images and their latest compression results.
//!
//! The gallery is the only owner of its entries. Consumers never get a
//! mutable view: they read immutable [`GallerySnapshot`]s, either on demand
//! or pushed through a `tokio::sync::watch` channel after every change.
//!
//! Each entry is either [`GalleryEntry::Uncompressed`] or
//! [`GalleryEntry::Compressed`], so callers pattern-match instead of probing
//! optional fields. Payloads are shared through `Arc`s; the bytes of a
//! removed entry are freed when the last snapshot holding it is dropped.
//!
//! At most one compression runs per image. A second request for an image
//! whose search is still in flight fails with [`ImageHorseError::Busy`].

use crate::compress::{self, compress_item};
use crate::config::{CompressionConfig, CompressionLevel, CompressionRequest, OutputFormat};
use crate::error::{ImageHorseError, ItemError};
use crate::output::{BatchItem, BatchOutput, CompressionResult};
use crate::source::SourceImage;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info};

/// Stable identifier of a gallery entry. Never reused within a gallery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ImageId(u64);

impl ImageId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One image in the gallery.
#[derive(Debug, Clone)]
pub enum GalleryEntry {
    Uncompressed {
        id: ImageId,
        source: Arc<SourceImage>,
    },
    Compressed {
        id: ImageId,
        source: Arc<SourceImage>,
        result: Arc<CompressionResult>,
    },
}

impl GalleryEntry {
    pub fn id(&self) -> ImageId {
        match self {
            GalleryEntry::Uncompressed { id, .. } | GalleryEntry::Compressed { id, .. } => *id,
        }
    }

    pub fn source(&self) -> &Arc<SourceImage> {
        match self {
            GalleryEntry::Uncompressed { source, .. } | GalleryEntry::Compressed { source, .. } => {
                source
            }
        }
    }

    /// The most recent result, if the image has been compressed.
    pub fn result(&self) -> Option<&Arc<CompressionResult>> {
        match self {
            GalleryEntry::Uncompressed { .. } => None,
            GalleryEntry::Compressed { result, .. } => Some(result),
        }
    }
}

/// Immutable view of the gallery at one point in time.
pub type GallerySnapshot = Arc<Vec<GalleryEntry>>;

/// What a gallery compression should do.
enum Job<'a> {
    Level(CompressionLevel, OutputFormat),
    Request(&'a CompressionRequest),
    Quality(f64, OutputFormat),
}

/// Ordered, owned collection of images.
pub struct Gallery {
    entries: Mutex<Vec<GalleryEntry>>,
    next_id: AtomicU64,
    in_flight: Mutex<HashSet<ImageId>>,
    snapshots: watch::Sender<GallerySnapshot>,
}

impl Default for Gallery {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Gallery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gallery")
            .field("len", &self.len())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}

impl Gallery {
    pub fn new() -> Self {
        let (snapshots, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            in_flight: Mutex::new(HashSet::new()),
            snapshots,
        }
    }

    // ── Collection ───────────────────────────────────────────────────────

    /// Append an uncompressed image and return its id.
    pub fn add(&self, source: SourceImage) -> ImageId {
        let id = ImageId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut entries = self.lock_entries();
        debug!("Gallery: add {} '{}'", id, source.name());
        entries.push(GalleryEntry::Uncompressed {
            id,
            source: Arc::new(source),
        });
        self.publish(&entries);
        id
    }

    /// Remove an entry and hand it back.
    ///
    /// Dropping the returned entry releases its payload and result unless a
    /// snapshot still holds them.
    pub fn remove(&self, id: ImageId) -> Result<GalleryEntry, ImageHorseError> {
        let mut entries = self.lock_entries();
        let pos = entries
            .iter()
            .position(|e| e.id() == id)
            .ok_or(ImageHorseError::UnknownImage { id: id.get() })?;
        let removed = entries.remove(pos);
        self.publish(&entries);
        debug!("Gallery: removed {}", id);
        Ok(removed)
    }

    /// Remove every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut entries = self.lock_entries();
        let n = entries.len();
        entries.clear();
        self.publish(&entries);
        n
    }

    pub fn get(&self, id: ImageId) -> Option<GalleryEntry> {
        self.lock_entries().iter().find(|e| e.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The current contents.
    pub fn snapshot(&self) -> GallerySnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receive a fresh snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<GallerySnapshot> {
        self.snapshots.subscribe()
    }

    // ── Compression ──────────────────────────────────────────────────────

    /// Compress one image at `level` and record the result.
    pub async fn compress(
        &self,
        id: ImageId,
        level: CompressionLevel,
        format: OutputFormat,
        config: &CompressionConfig,
    ) -> Result<Arc<CompressionResult>, ImageHorseError> {
        self.run(id, Job::Level(level, format), config).await
    }

    /// Compress one image with an explicit request and record the result.
    pub async fn compress_request(
        &self,
        id: ImageId,
        request: &CompressionRequest,
        config: &CompressionConfig,
    ) -> Result<Arc<CompressionResult>, ImageHorseError> {
        self.run(id, Job::Request(request), config).await
    }

    /// Encode one image once at `quality` and record the result.
    pub async fn compress_with_quality(
        &self,
        id: ImageId,
        quality: f64,
        format: OutputFormat,
        config: &CompressionConfig,
    ) -> Result<Arc<CompressionResult>, ImageHorseError> {
        self.run(id, Job::Quality(quality, format), config).await
    }

    /// Compress every image present when the call starts, in gallery order.
    ///
    /// Failures are recorded per item; the entry keeps its previous state.
    pub async fn compress_all(
        &self,
        level: CompressionLevel,
        format: OutputFormat,
        config: &CompressionConfig,
    ) -> BatchOutput {
        let start = Instant::now();
        let snapshot = self.snapshot();
        let total = snapshot.len();
        info!("Gallery: compressing {} images at {}", total, level);

        if let Some(ref cb) = config.progress_callback {
            cb.on_batch_start(total);
        }

        let mut items = Vec::with_capacity(total);
        for (index, entry) in snapshot.iter().enumerate() {
            if index > 0 && config.batch_yield_ms > 0 {
                tokio::time::sleep(Duration::from_millis(config.batch_yield_ms)).await;
            }
            let id = entry.id();
            let source = entry.source();

            let item = match InFlightGuard::acquire(&self.in_flight, id) {
                Ok(_guard) => {
                    let item = compress_item(index, total, source, level, format, config).await;
                    if let Some(ref result) = item.result {
                        self.record(id, Arc::clone(result));
                    }
                    item
                }
                Err(e) => {
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_item_error(index, total, &e.to_string());
                    }
                    BatchItem {
                        index,
                        name: source.name().to_string(),
                        result: None,
                        error: Some(ItemError::from_fatal(index, source.name(), &e)),
                    }
                }
            };
            items.push(item);
        }

        let output = BatchOutput::from_items(items, start.elapsed().as_millis() as u64);
        if let Some(ref cb) = config.progress_callback {
            cb.on_batch_complete(total, output.stats.compressed_items);
        }
        output
    }

    /// Metadata of every entry as pretty JSON, keyed by image id.
    ///
    /// Holds what a key/value store needs to restore the gallery: the
    /// original's name, type and size plus the latest result's metadata.
    /// Payload bytes are not included.
    pub fn metadata_json(&self) -> Result<String, ImageHorseError> {
        #[derive(Serialize)]
        struct Record<'a> {
            id: ImageId,
            name: &'a str,
            mime: &'a str,
            original_size: usize,
            dimensions: Option<(u32, u32)>,
            result: Option<&'a CompressionResult>,
        }

        let snapshot = self.snapshot();
        let records: Vec<Record<'_>> = snapshot
            .iter()
            .map(|e| Record {
                id: e.id(),
                name: e.source().name(),
                mime: e.source().mime(),
                original_size: e.source().byte_len(),
                dimensions: e.source().dimensions(),
                result: e.result().map(|r| r.as_ref()),
            })
            .collect();

        serde_json::to_string_pretty(&records)
            .map_err(|e| ImageHorseError::Internal(format!("metadata serialisation: {e}")))
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    async fn run(
        &self,
        id: ImageId,
        job: Job<'_>,
        config: &CompressionConfig,
    ) -> Result<Arc<CompressionResult>, ImageHorseError> {
        let source = self
            .get(id)
            .map(|e| Arc::clone(e.source()))
            .ok_or(ImageHorseError::UnknownImage { id: id.get() })?;
        let _guard = InFlightGuard::acquire(&self.in_flight, id)?;

        let result = match job {
            Job::Level(level, format) => {
                compress::compress_level(&source, level, format, config).await?
            }
            Job::Request(request) => compress::compress(&source, request, config).await?,
            Job::Quality(quality, format) => {
                compress::compress_with_quality(&source, quality, format, config).await?
            }
        };

        let result = Arc::new(result);
        self.record(id, Arc::clone(&result));
        Ok(result)
    }

    /// Replace an entry's state with a fresh result.
    fn record(&self, id: ImageId, result: Arc<CompressionResult>) {
        let mut entries = self.lock_entries();
        let Some(entry) = entries.iter_mut().find(|e| e.id() == id) else {
            debug!("Gallery: {} was removed during compression, dropping result", id);
            return;
        };
        *entry = GalleryEntry::Compressed {
            id,
            source: Arc::clone(entry.source()),
            result,
        };
        self.publish(&entries);
    }

    fn publish(&self, entries: &[GalleryEntry]) {
        self.snapshots.send_replace(Arc::new(entries.to_vec()));
    }

    fn lock_entries(&self) -> MutexGuard<'_, Vec<GalleryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks an image as having a search in flight until dropped.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<ImageId>>,
    id: ImageId,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<ImageId>>, id: ImageId) -> Result<Self, ImageHorseError> {
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
        if !inserted {
            return Err(ImageHorseError::Busy { id: id.get() });
        }
        Ok(Self { set, id })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}
