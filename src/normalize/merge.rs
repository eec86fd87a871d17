//! Cluster overlapping detections into canonical spans.
//!
//! Two spans are adjacent when their boxes overlap above the IoU threshold and
//! their case-folded texts are near-identical. Connected components of that
//! relation (union-find) become one span each, represented by the
//! highest-scoring detection. Spans carry the representative's box and text,
//! so merging an already merged set finds no new edges.

use crate::model::{CanonicalSpan, RawDetection};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Thresholds of the adjacency relation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeSettings {
    pub iou_threshold: f32,
    pub similarity_threshold: f32,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            iou_threshold: 0.5,
            similarity_threshold: 0.8,
        }
    }
}

/// Lowercased text with whitespace removed, the form texts are compared in
pub fn comparison_key(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Normalized Levenshtein similarity of two texts' comparison keys
pub fn text_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&comparison_key(a), &comparison_key(b))
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Keeps the smaller index as root so clusters are labelled by their first member
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

/// Merge raw detections into spans
pub fn merge_detections(
    detections: Vec<RawDetection>,
    settings: MergeSettings,
) -> Vec<CanonicalSpan> {
    merge_spans(
        detections.into_iter().map(CanonicalSpan::from_detection).collect(),
        settings,
    )
}

/// Merge spans whose boxes overlap and whose texts agree. Output is in
/// reading order (top to bottom, then left to right).
pub fn merge_spans(spans: Vec<CanonicalSpan>, settings: MergeSettings) -> Vec<CanonicalSpan> {
    let keys: Vec<String> = spans.iter().map(|s| comparison_key(&s.text)).collect();
    let mut sets = DisjointSet::new(spans.len());

    for i in 0..spans.len() {
        for j in (i + 1)..spans.len() {
            if spans[i].bbox.iou(&spans[j].bbox) < settings.iou_threshold {
                continue;
            }
            let similarity = strsim::normalized_levenshtein(&keys[i], &keys[j]);
            if similarity >= settings.similarity_threshold as f64 {
                sets.union(i, j);
            }
        }
    }

    let mut clusters: BTreeMap<usize, Vec<CanonicalSpan>> = BTreeMap::new();
    for (i, span) in spans.into_iter().enumerate() {
        let root = sets.find(i);
        clusters.entry(root).or_default().push(span);
    }

    let mut merged: Vec<CanonicalSpan> = clusters.into_values().filter_map(combine).collect();
    merged.sort_by(|a, b| {
        a.bbox
            .y0
            .total_cmp(&b.bbox.y0)
            .then(a.bbox.x0.total_cmp(&b.bbox.x0))
            .then_with(|| a.text.cmp(&b.text))
    });

    tracing::debug!("Merged into {} canonical spans", merged.len());
    merged
}

/// Higher score first, then earlier variant, then engine id
fn representative_order(a: &RawDetection, b: &RawDetection) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then(a.source_variant.cmp(&b.source_variant))
        .then_with(|| a.source_engine.cmp(&b.source_engine))
        .then_with(|| a.text.cmp(&b.text))
}

fn combine(members: Vec<CanonicalSpan>) -> Option<CanonicalSpan> {
    let original_text = members.iter().find_map(|m| m.original_text.clone());
    let mut detections: Vec<RawDetection> = members
        .into_iter()
        .flat_map(|m| m.contributing_detections)
        .collect();
    detections.sort_by(representative_order);

    let representative = detections.first()?.clone();
    let support_count = detections
        .iter()
        .map(|d| d.source_key())
        .collect::<BTreeSet<_>>()
        .len();

    Some(CanonicalSpan {
        text: representative.text.clone(),
        original_text,
        bbox: representative.bbox,
        support_count,
        max_score: representative.score,
        contributing_detections: detections,
    })
}
