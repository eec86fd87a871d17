//! Text normalization: cleaning, split-amount rejoining, span merging

pub mod clean;
pub mod join;
pub mod merge;

pub use merge::{merge_detections, merge_spans, MergeSettings};

use crate::config::ExtractOptions;
use crate::model::{CanonicalSpan, RawDetection};

impl MergeSettings {
    pub fn from_options(options: &ExtractOptions) -> Self {
        Self {
            iou_threshold: options.merge_iou_threshold,
            similarity_threshold: options.text_similarity_threshold,
        }
    }
}

/// Turn the collected detections into canonical spans
pub fn normalize(detections: Vec<RawDetection>, options: &ExtractOptions) -> Vec<CanonicalSpan> {
    let total = detections.len();
    let cleaned: Vec<RawDetection> = detections
        .into_iter()
        .filter_map(clean::clean_detection)
        .collect();
    let joined = join::rejoin_split_amounts(cleaned, options.amount_join_gap_chars);
    let spans = merge_detections(joined, MergeSettings::from_options(options));

    tracing::info!(
        "Normalized {} detections into {} spans",
        total,
        spans.len()
    );
    spans
}
