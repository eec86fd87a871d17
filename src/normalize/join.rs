//! Rejoin monetary amounts an engine split across two boxes.
//!
//! Engines break "$265,400" into "$265," and "400" when the separator or a
//! kerning gap looks like a word break. Joining only happens within one
//! (variant, engine) call, where the two pieces share a segmentation.

use crate::model::RawDetection;
use crate::preprocessing::VariantKind;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// A currency symbol, optionally followed by digit groups, at the end of the text
static AMOUNT_HEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[$¥€£₩₹](?:\d{1,3}(?:[,.]\d{3})*(?:\d+)?)?[,.]?$").expect("static regex")
});

/// Three-digit groups forming the whole leading token of the continuation
static GROUP_TAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{3}(?:[,.]\d{3})*(?:\.\d{1,2})?[,.]?(?:\s|$)").expect("static regex")
});

/// Any digit run forming the whole leading token, for a bare currency head
static NUMBER_TAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d+(?:[,.]\d{3})*(?:\.\d{1,2})?[,.]?(?:\s|$)").expect("static regex")
});

/// Continuation opening with the separator the head stopped before
static SEPARATOR_TAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[,.]\d{3}(?:[,.]\d{3})*(?:\.\d{1,2})?(?:\s|$)").expect("static regex")
});

/// Trailing digit run of the head and whether a separator group precedes it
static HEAD_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([,.]\d{3}|\d+)$").expect("static regex"));

/// Rejoin split amounts within every (variant, engine) source.
///
/// `gap_chars` is the widest bridgeable gap in character widths of the left piece.
pub fn rejoin_split_amounts(detections: Vec<RawDetection>, gap_chars: f32) -> Vec<RawDetection> {
    let mut by_source: BTreeMap<(VariantKind, String), Vec<RawDetection>> = BTreeMap::new();
    for detection in detections {
        by_source
            .entry((detection.source_variant, detection.source_engine.clone()))
            .or_default()
            .push(detection);
    }

    by_source
        .into_values()
        .flat_map(|group| join_within_source(group, gap_chars))
        .collect()
}

fn join_within_source(mut items: Vec<RawDetection>, gap_chars: f32) -> Vec<RawDetection> {
    items.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));

    let mut i = 0;
    while i < items.len() {
        match find_continuation(&items, i, gap_chars) {
            Some((j, joined)) => {
                let tail = items.remove(j);
                let head = &mut items[i];
                tracing::debug!("Rejoined '{}' + '{}' -> '{}'", head.text, tail.text, joined);
                head.text = joined;
                head.bbox = head.bbox.union(&tail.bbox);
                head.score = head.score.min(tail.score);
                // the joined piece may continue again ("$1," "234," "567")
            }
            None => i += 1,
        }
    }
    items
}

/// Nearest right-hand piece continuing the amount that `items[i]` ends with
fn find_continuation(items: &[RawDetection], i: usize, gap_chars: f32) -> Option<(usize, String)> {
    let head = &items[i];
    if !AMOUNT_HEAD.is_match(&head.text) {
        return None;
    }

    let char_width = head.bbox.width() / head.text.chars().count().max(1) as f32;
    let max_gap = gap_chars * char_width;

    items
        .iter()
        .enumerate()
        .skip(i + 1)
        .filter(|(_, tail)| head.bbox.same_line(&tail.bbox))
        .filter_map(|(j, tail)| {
            let gap = head.bbox.horizontal_gap_to(&tail.bbox);
            if gap < -char_width || gap > max_gap {
                return None;
            }
            join_text(&head.text, &tail.text).map(|joined| (j, gap, joined))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(j, _, joined)| (j, joined))
}

/// Concatenate an amount head and its digit continuation, restoring a
/// thousands separator the engine dropped. `None` when the pieces don't fit.
///
/// The continuation's whole leading token must be digit groups, so a
/// neighbouring "150%" or "4000" never extends a finished amount.
pub fn join_text(head: &str, tail: &str) -> Option<String> {
    let last = head.chars().last()?;

    let fits = match last {
        ',' | '.' => GROUP_TAIL.is_match(tail),
        '$' | '¥' | '€' | '£' | '₩' | '₹' => NUMBER_TAIL.is_match(tail),
        _ if last.is_ascii_digit() => {
            if SEPARATOR_TAIL.is_match(tail) {
                true
            } else {
                let trailing = HEAD_NUMBER.captures(head)?.get(1)?.as_str();
                // "$1,500" is already grouped; only "$265" can take a bare "400"
                let grouped = trailing.starts_with([',', '.']);
                if !grouped && trailing.len() <= 3 && GROUP_TAIL.is_match(tail) {
                    return Some(format!("{},{}", head, tail));
                }
                false
            }
        }
        _ => false,
    };
    fits.then(|| format!("{}{}", head, tail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    fn detection(text: &str, bbox: Rect, engine: &str) -> RawDetection {
        RawDetection {
            text: text.to_string(),
            bbox,
            score: 0.9,
            source_variant: VariantKind::Original,
            source_engine: engine.to_string(),
        }
    }

    #[test]
    fn test_join_text_rules() {
        assert_eq!(join_text("$265,", "400"), Some("$265,400".to_string()));
        assert_eq!(join_text("$", "1,200"), Some("$1,200".to_string()));
        assert_eq!(join_text("$265", "400 raised"), Some("$265,400 raised".to_string()));
        assert_eq!(join_text("$265", "40"), None);
        assert_eq!(join_text("$265,", "backers"), None);
        assert_eq!(join_text("$1,", "234,"), Some("$1,234,".to_string()));
        assert_eq!(join_text("$1,500", ",000"), Some("$1,500,000".to_string()));
    }

    #[test]
    fn test_finished_amount_does_not_swallow_neighbours() {
        assert_eq!(join_text("$1,500", "150%"), None);
        assert_eq!(join_text("$1,500", "150"), None);
        assert_eq!(join_text("$265", "150%"), None);
        assert_eq!(join_text("$265,", "4000"), None);
        assert_eq!(join_text("$", "48% OFF"), None);

        let amount = detection("$1,500", Rect::new(10.0, 100.0, 70.0, 120.0), "a");
        let percent = detection("150%", Rect::new(76.0, 100.0, 116.0, 120.0), "a");
        let out = rejoin_split_amounts(vec![amount, percent], 1.5);
        let texts: Vec<&str> = out.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["$1,500", "150%"]);
    }

    #[test]
    fn test_chained_pieces_join_in_turn() {
        let a = detection("$1,", Rect::new(0.0, 0.0, 30.0, 20.0), "a");
        let b = detection("234,", Rect::new(33.0, 0.0, 73.0, 20.0), "a");
        let c = detection("567", Rect::new(76.0, 0.0, 106.0, 20.0), "a");
        let out = rejoin_split_amounts(vec![c, a, b], 1.5);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "$1,234,567");
    }

    #[test]
    fn test_split_amount_on_same_line_is_rejoined() {
        let head = detection("$265,", Rect::new(100.0, 50.0, 150.0, 70.0), "a");
        let tail = detection("400", Rect::new(155.0, 51.0, 185.0, 71.0), "a");
        let out = rejoin_split_amounts(vec![tail, head], 1.5);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "$265,400");
        assert_eq!(out[0].bbox, Rect::new(100.0, 50.0, 185.0, 71.0));
    }

    #[test]
    fn test_far_or_other_line_pieces_stay_apart() {
        let head = detection("$265,", Rect::new(100.0, 50.0, 150.0, 70.0), "a");
        let far = detection("400", Rect::new(300.0, 50.0, 330.0, 70.0), "a");
        let below = detection("400", Rect::new(152.0, 90.0, 182.0, 110.0), "a");
        assert_eq!(rejoin_split_amounts(vec![head, far, below], 1.5).len(), 3);
    }

    #[test]
    fn test_pieces_from_different_engines_are_not_joined() {
        let head = detection("$265,", Rect::new(100.0, 50.0, 150.0, 70.0), "a");
        let tail = detection("400", Rect::new(155.0, 50.0, 185.0, 70.0), "b");
        assert_eq!(rejoin_split_amounts(vec![head, tail], 1.5).len(), 2);
    }
}
