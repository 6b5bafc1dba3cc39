//! Streaming batch API: emit images as they complete.
//!
//! Unlike the eager [`crate::compress::compress_all`], which returns only
//! after every image has been handled, [`compress_stream`] yields one
//! [`BatchItem`] per source through a `Stream`. Up to `config.concurrency`
//! images are searched at the same time, yet items are always emitted in
//! input order. Each individual search stays strictly sequential.

use crate::compress::compress_item;
use crate::config::{CompressionConfig, CompressionLevel, OutputFormat};
use crate::error::ItemError;
use crate::output::BatchItem;
use crate::pipeline::input;
use crate::source::SourceImage;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::{info, warn};

/// A boxed stream of batch items.
pub type ItemStream = Pin<Box<dyn Stream<Item = BatchItem> + Send>>;

/// Compress `sources` at `level`, streaming items in input order.
///
/// Batch start/complete callbacks are not fired; item and attempt callbacks
/// are. Dropping the stream abandons the images not yet started.
pub fn compress_stream(
    sources: Vec<SourceImage>,
    level: CompressionLevel,
    format: OutputFormat,
    config: &CompressionConfig,
) -> ItemStream {
    let total = sources.len();
    info!(
        "Streaming {} images at {} as {} (concurrency {})",
        total, level, format, config.concurrency
    );

    let concurrency = config.concurrency.max(1);
    let config = config.clone();

    let s = stream::iter(sources.into_iter().enumerate().map(move |(index, source)| {
        let cfg = config.clone();
        async move { compress_item(index, total, &source, level, format, &cfg).await }
    }))
    .buffered(concurrency);

    Box::pin(s)
}

/// Load each path or URL, then compress it, streaming items in input order.
///
/// An input that cannot be loaded becomes a failed item; the rest continue.
pub fn compress_inputs_stream(
    inputs: Vec<String>,
    level: CompressionLevel,
    format: OutputFormat,
    config: &CompressionConfig,
) -> ItemStream {
    let total = inputs.len();
    let concurrency = config.concurrency.max(1);
    let config = config.clone();

    let s = stream::iter(inputs.into_iter().enumerate().map(move |(index, input_str)| {
        let cfg = config.clone();
        async move {
            let loaded = input::load_source(
                &input_str,
                cfg.download_timeout_secs,
                cfg.max_source_bytes,
            )
            .await;
            match loaded {
                Ok(source) => compress_item(index, total, &source, level, format, &cfg).await,
                Err(e) => {
                    warn!("Could not load '{}': {}", input_str, e);
                    if let Some(ref cb) = cfg.progress_callback {
                        cb.on_item_error(index, total, &e.to_string());
                    }
                    BatchItem {
                        index,
                        error: Some(ItemError::from_fatal(index, &input_str, &e)),
                        name: input_str,
                        result: None,
                    }
                }
            }
        }
    }))
    .buffered(concurrency);

    Box::pin(s)
}
