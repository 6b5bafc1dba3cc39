//! Progress-callback trait for batch, item and attempt events.
//!
//! Inject an [`Arc<dyn CompressionProgressCallback>`] via
//! [`crate::config::CompressionConfigBuilder::progress_callback`] to receive
//! events while the engine works. Callers can forward them to a channel, a
//! UI gallery or a terminal progress bar; the library never knows how.
//!
//! # Example
//!
//! ```rust
//! use imagehorse::{CompressionConfig, CompressionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     attempts: AtomicUsize,
//! }
//!
//! impl CompressionProgressCallback for CountingCallback {
//!     fn on_attempt(&self, name: &str, record: &imagehorse::AttemptRecord) {
//!         self.attempts.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{name}: attempt {} → {} bytes", record.attempt, record.size);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { attempts: AtomicUsize::new(0) });
//!
//! let config = CompressionConfig::builder()
//!     .progress_callback(counter as Arc<dyn CompressionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{AttemptRecord, CompressionResult};
use std::sync::Arc;

/// Called by the engine as it processes images.
///
/// Implementations must be `Send + Sync`: with `concurrency > 1` the
/// streaming entry point reports different images from different tasks.
/// Events for a single image always arrive in order. All methods default to
/// no-ops so callers only override what they care about.
pub trait CompressionProgressCallback: Send + Sync {
    /// Called once before the first image of a batch.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called before an image is decoded.
    ///
    /// # Arguments
    /// * `index`: 0-based position in the batch
    /// * `total`: batch size
    /// * `name` : source name
    fn on_item_start(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called after every render+encode cycle of a search.
    fn on_attempt(&self, name: &str, record: &AttemptRecord) {
        let _ = (name, record);
    }

    /// Called when an image produced a result, whether or not it met its target.
    fn on_item_complete(&self, index: usize, total: usize, result: &CompressionResult) {
        let _ = (index, total, result);
    }

    /// Called when an image failed or was cancelled.
    fn on_item_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every image of a batch has been handled.
    ///
    /// # Arguments
    /// * `total`        : batch size
    /// * `success_count`: images that produced a result
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl CompressionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::CompressionConfig`].
pub type ProgressCallback = Arc<dyn CompressionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        attempts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        batch_total: AtomicUsize,
        batch_success: AtomicUsize,
    }

    impl CompressionProgressCallback for TrackingCallback {
        fn on_batch_start(&self, total: usize) {
            self.batch_total.store(total, Ordering::SeqCst);
        }

        fn on_item_start(&self, _index: usize, _total: usize, _name: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_attempt(&self, _name: &str, _record: &AttemptRecord) {
            self.attempts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_complete(&self, _index: usize, _total: usize, _result: &CompressionResult) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_error(&self, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _total: usize, success_count: usize) {
            self.batch_success.store(success_count, Ordering::SeqCst);
        }
    }

    fn record(attempt: u32) -> AttemptRecord {
        AttemptRecord {
            attempt,
            width: 10,
            height: 10,
            quality: 0.5,
            size: 100,
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_item_start(0, 2, "a.png");
        cb.on_attempt("a.png", &record(1));
        cb.on_item_error(1, 2, "decode failed");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_batch_start(2);
        assert_eq!(tracker.batch_total.load(Ordering::SeqCst), 2);

        tracker.on_item_start(0, 2, "a.png");
        tracker.on_attempt("a.png", &record(1));
        tracker.on_attempt("a.png", &record(2));
        tracker.on_item_complete(0, 2, &CompressionResult::default());
        tracker.on_item_start(1, 2, "b.png");
        tracker.on_item_error(1, 2, "unsupported format");
        tracker.on_batch_complete(2, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.batch_success.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(10);
        cb.on_item_start(0, 10, "x.jpg");
    }
}
