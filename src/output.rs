//! Result types returned by the compression entry points.

use crate::config::OutputFormat;
use crate::error::ItemError;
use crate::recommend::Recommendation;
use crate::score::{calculate_core_web_vitals_score, WebVitalsScore};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Savings of `result_size` relative to `original_size`, in whole percent.
///
/// `round(100 × (1 − result/original))`. Negative when the output grew.
/// Returns 0 for an empty original.
pub fn savings_percentage(original_size: usize, result_size: usize) -> i32 {
    if original_size == 0 {
        return 0;
    }
    (100.0 * (1.0 - result_size as f64 / original_size as f64)).round() as i32
}

/// One render+encode cycle of a search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-indexed attempt number.
    pub attempt: u32,
    pub width: u32,
    pub height: u32,
    /// Quality fraction handed to the encoder.
    pub quality: f64,
    /// Encoded payload length in bytes.
    pub size: usize,
}

impl AttemptRecord {
    pub fn size_kb(&self) -> f64 {
        self.size as f64 / 1024.0
    }
}

/// The outcome of a compression pass or search.
///
/// Owns its encoded payload; the engine keeps no reference to it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompressionResult {
    /// Encoded bytes. Not serialised; use [`Self::to_data_url`] to embed.
    #[serde(skip)]
    pub data: Vec<u8>,
    pub format: OutputFormat,
    /// Literal length of `data`.
    pub size: usize,
    pub width: u32,
    pub height: u32,
    /// Quality fraction actually used for the returned payload.
    pub quality: f64,
    pub original_size: usize,
    pub savings_percent: i32,
    /// Render+encode cycles executed.
    pub attempts: u32,
    /// `false` when the search stopped at its budget without meeting the target.
    pub met_target: bool,
    /// Every attempt in execution order.
    pub history: Vec<AttemptRecord>,
}

impl CompressionResult {
    pub fn size_kb(&self) -> f64 {
        self.size as f64 / 1024.0
    }

    /// `data:` URL suitable for an `<img src>` preview or a download link.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.format.mime(), STANDARD.encode(&self.data))
    }

    /// Web-vitals score of the output dimensions and size.
    pub fn score(&self) -> WebVitalsScore {
        calculate_core_web_vitals_score(self.width, self.height, Some(self.size as u64))
    }

    /// Suggested file name: `stem.ext` with the output format's extension.
    pub fn file_name(&self, source_name: &str) -> String {
        let stem = source_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .filter(|s| !s.is_empty())
            .unwrap_or(source_name);
        format!("{}.{}", stem, self.format.extension())
    }
}

/// One image of a batch: either a result or a non-fatal error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    /// Position in the input.
    pub index: usize,
    pub name: String,
    /// Shared with whatever else keeps the result, e.g. a gallery entry.
    pub result: Option<Arc<CompressionResult>>,
    pub error: Option<ItemError>,
}

/// Aggregate numbers for a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_items: usize,
    pub compressed_items: usize,
    pub failed_items: usize,
    pub cancelled_items: usize,
    pub total_original_bytes: u64,
    pub total_compressed_bytes: u64,
    pub total_duration_ms: u64,
}

impl BatchStats {
    /// Savings over the images that compressed successfully.
    pub fn savings_percent(&self) -> i32 {
        savings_percentage(
            self.total_original_bytes as usize,
            self.total_compressed_bytes as usize,
        )
    }
}

/// Items in input order plus stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    pub items: Vec<BatchItem>,
    pub stats: BatchStats,
}

impl BatchOutput {
    pub(crate) fn from_items(items: Vec<BatchItem>, total_duration_ms: u64) -> Self {
        let mut stats = BatchStats {
            total_items: items.len(),
            total_duration_ms,
            ..BatchStats::default()
        };
        for item in &items {
            match (&item.result, &item.error) {
                (Some(r), _) => {
                    stats.compressed_items += 1;
                    stats.total_original_bytes += r.original_size as u64;
                    stats.total_compressed_bytes += r.size as u64;
                }
                (None, Some(ItemError::Cancelled { .. })) => stats.cancelled_items += 1,
                (None, _) => stats.failed_items += 1,
            }
        }
        Self { items, stats }
    }
}

/// What [`crate::compress::inspect`] learns about a source without encoding it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageReport {
    pub name: String,
    pub mime: String,
    pub width: u32,
    pub height: u32,
    /// Payload length in bytes.
    pub size: usize,
    pub score: WebVitalsScore,
    pub recommendation: Recommendation,
    /// Estimated output bytes for the recommendation.
    pub estimated_size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(size: usize) -> CompressionResult {
        CompressionResult {
            data: vec![0; size],
            format: OutputFormat::Webp,
            size,
            width: 4,
            height: 4,
            quality: 0.85,
            original_size: 1000,
            savings_percent: savings_percentage(1000, size),
            attempts: 1,
            met_target: true,
            history: Vec::new(),
        }
    }

    #[test]
    fn savings_of_identical_size_is_zero() {
        assert_eq!(savings_percentage(4096, 4096), 0);
        assert_eq!(savings_percentage(0, 10), 0);
    }

    #[test]
    fn savings_increase_as_result_shrinks() {
        let mut last = i32::MIN;
        for size in (0..=2000).rev().step_by(37) {
            let s = savings_percentage(1000, size);
            assert!(s >= last, "size {size}: {s} < {last}");
            last = s;
        }
        assert_eq!(savings_percentage(1000, 250), 75);
        assert_eq!(savings_percentage(1000, 1500), -50);
    }

    #[test]
    fn data_url_prefix() {
        let url = result(3).to_data_url();
        assert!(url.starts_with("data:image/webp;base64,"), "got: {url}");
    }

    #[test]
    fn file_name_swaps_extension() {
        let r = result(3);
        assert_eq!(r.file_name("holiday.jpeg"), "holiday.webp");
        assert_eq!(r.file_name("noext"), "noext.webp");
        assert_eq!(r.file_name(".hidden"), ".hidden.webp");
    }

    #[test]
    fn batch_stats_count_outcomes() {
        let items = vec![
            BatchItem {
                index: 0,
                name: "a".into(),
                result: Some(Arc::new(result(500))),
                error: None,
            },
            BatchItem {
                index: 1,
                name: "b".into(),
                result: None,
                error: Some(ItemError::Failed {
                    index: 1,
                    name: "b".into(),
                    detail: "corrupt".into(),
                }),
            },
            BatchItem {
                index: 2,
                name: "c".into(),
                result: None,
                error: Some(ItemError::Cancelled {
                    index: 2,
                    name: "c".into(),
                }),
            },
        ];
        let out = BatchOutput::from_items(items, 12);
        assert_eq!(out.stats.compressed_items, 1);
        assert_eq!(out.stats.failed_items, 1);
        assert_eq!(out.stats.cancelled_items, 1);
        assert_eq!(out.stats.savings_percent(), 50);
    }

    #[test]
    fn payload_is_not_serialised() {
        let json = serde_json::to_value(result(8)).unwrap();
        assert!(json.get("data").is_none());
        assert_eq!(json["size"], 8);
        assert_eq!(json["format"], "webp");
    }
}
