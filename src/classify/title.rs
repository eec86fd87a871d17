//! Campaign title selection.
//!
//! The title is the longest unclaimed span above the first amount, after
//! boilerplate, label-only and entity-only spans are filtered out.

use super::vocabulary::{fold_case, Vocabulary};
use crate::entities::EntityRecognizer;
use crate::error::ExtractError;
use crate::model::{CanonicalSpan, Diagnostic, FieldType, MatchStrength};
use crate::normalize::merge::comparison_key;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

const MIN_TITLE_CHARS: usize = 3;

/// Figures, symbols and separators only
static NON_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\d\s\p{P}\p{S}]+$").expect("static regex"));

pub struct TitleSelection {
    pub winner: Option<(usize, MatchStrength)>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct TitleSelector<'a> {
    pub vocabulary: &'a Vocabulary,
    pub recognizer: Option<&'a dyn EntityRecognizer>,
}

impl TitleSelector<'_> {
    /// `claimed` holds spans already used by a numeric, date or platform rule;
    /// `anchor` is the first span carrying an amount
    pub fn select(
        &self,
        spans: &[CanonicalSpan],
        claimed: &BTreeSet<usize>,
        anchor: Option<usize>,
    ) -> TitleSelection {
        let mut diagnostics = Vec::new();
        let mut eligible: Vec<usize> = Vec::new();

        for (i, span) in spans.iter().enumerate() {
            if claimed.contains(&i) {
                continue;
            }
            if let Some(a) = anchor {
                if span.bbox.center_y() >= spans[a].bbox.y0 {
                    continue;
                }
            }
            match self.rejection(span) {
                None => eligible.push(i),
                Some(Rejection::Silent) => {}
                Some(Rejection::Entity(reason)) => diagnostics.push(Diagnostic::CandidateRejected {
                    field_type: FieldType::Title,
                    value: span.text.clone(),
                    reason,
                }),
                Some(Rejection::RecognizerFailed(err)) => {
                    diagnostics.push(Diagnostic::Recovered(err));
                    eligible.push(i);
                }
            }
        }

        eligible.sort_by(|&a, &b| {
            let (sa, sb) = (&spans[a], &spans[b]);
            sb.text
                .chars()
                .count()
                .cmp(&sa.text.chars().count())
                .then(sa.variant().cmp(&sb.variant()))
                .then(sb.support_count.cmp(&sa.support_count))
                .then(a.cmp(&b))
        });

        let winner = eligible.first().copied();
        if let Some(w) = winner {
            for &loser in &eligible[1..] {
                diagnostics.push(Diagnostic::CandidateRejected {
                    field_type: FieldType::Title,
                    value: spans[loser].text.clone(),
                    reason: format!("shorter than '{}'", spans[w].text),
                });
            }
        }

        TitleSelection {
            winner: winner.map(|w| (w, title_strength(&spans[w].text))),
            diagnostics,
        }
    }

    fn rejection(&self, span: &CanonicalSpan) -> Option<Rejection> {
        let text = span.text.trim();
        if text.chars().count() < MIN_TITLE_CHARS || NON_TEXT.is_match(text) {
            return Some(Rejection::Silent);
        }

        let folded = fold_case(text.trim_end_matches(|c: char| c.is_ascii_punctuation()));
        let denied = self
            .vocabulary
            .title_denylist
            .iter()
            .any(|entry| fold_case(entry) == folded);
        let label_only = self
            .vocabulary
            .all_keywords()
            .chain(self.vocabulary.platforms.iter().map(|p| p.name.as_str()))
            .any(|kw| fold_case(kw) == folded);
        if denied || label_only {
            return Some(Rejection::Silent);
        }

        let recognizer = self.recognizer?;
        match recognizer.recognize_entities(text) {
            Ok(entities) => {
                let key = comparison_key(text);
                entities
                    .iter()
                    .find(|e| comparison_key(&e.span) == key)
                    .map(|e| Rejection::Entity(format!("pure {:?} name", e.entity_type).to_lowercase()))
            }
            Err(err) => Some(Rejection::RecognizerFailed(match err {
                ExtractError::RecognizerFailed(_) => err,
                other => ExtractError::RecognizerFailed(other.to_string()),
            })),
        }
    }
}

enum Rejection {
    Silent,
    Entity(String),
    RecognizerFailed(ExtractError),
}

/// Several words (or a CJK phrase) read as a real title; a lone word is weaker
fn title_strength(text: &str) -> MatchStrength {
    let words = text.split_whitespace().count();
    let cjk = text.chars().filter(|c| !c.is_ascii()).count();
    if words >= 2 || cjk >= 4 {
        MatchStrength::Exact
    } else {
        MatchStrength::Partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::OrganizationSuffixRecognizer;
    use crate::geometry::Rect;
    use crate::model::RawDetection;
    use crate::preprocessing::VariantKind;

    fn span(text: &str, y: f32, variant: VariantKind) -> CanonicalSpan {
        CanonicalSpan::from_detection(RawDetection {
            text: text.to_string(),
            bbox: Rect::new(10.0, y, 10.0 + 12.0 * text.chars().count() as f32, y + 20.0),
            score: 0.9,
            source_variant: variant,
            source_engine: "a".to_string(),
        })
    }

    fn select(spans: &[CanonicalSpan], anchor: Option<usize>, with_ner: bool) -> TitleSelection {
        let vocabulary = Vocabulary::default();
        let recognizer = OrganizationSuffixRecognizer::from_vocabulary(&vocabulary);
        let selector = TitleSelector {
            vocabulary: &vocabulary,
            recognizer: if with_ner {
                Some(&recognizer as &dyn EntityRecognizer)
            } else {
                None
            },
        };
        selector.select(spans, &BTreeSet::new(), anchor)
    }

    #[test]
    fn test_longest_span_above_first_amount() {
        let spans = vec![
            span("Back this project", 10.0, VariantKind::Original),
            span("Save The Ocean", 40.0, VariantKind::Original),
            span("by Blue", 70.0, VariantKind::Original),
            span("$265,400 raised", 100.0, VariantKind::Original),
            span("A much longer paragraph of story text below", 200.0, VariantKind::Original),
        ];
        let selection = select(&spans, Some(3), false);
        assert_eq!(selection.winner, Some((1, MatchStrength::Exact)));
        assert_eq!(selection.diagnostics.len(), 1);
    }

    #[test]
    fn test_equal_length_prefers_earlier_variant() {
        let spans = vec![
            span("Save The Ocean", 10.0, VariantKind::Binarized),
            span("Help The Beach", 40.0, VariantKind::Contrast),
        ];
        assert_eq!(select(&spans, None, false).winner.map(|w| w.0), Some(1));
    }

    #[test]
    fn test_pure_organization_is_not_a_title() {
        let spans = vec![
            span("Blue Ocean Laboratories Inc.", 10.0, VariantKind::Original),
            span("Save The Ocean", 40.0, VariantKind::Original),
        ];
        let selection = select(&spans, None, true);
        assert_eq!(selection.winner.map(|w| w.0), Some(1));
        assert!(selection.diagnostics[0].to_string().contains("organization"));

        // without a recognizer the longer organization name wins
        assert_eq!(select(&spans, None, false).winner.map(|w| w.0), Some(0));
    }

    #[test]
    fn test_keyword_and_numeric_spans_excluded() {
        let spans = vec![
            span("Kickstarter", 10.0, VariantKind::Original),
            span("2,000", 40.0, VariantKind::Original),
            span("raised", 70.0, VariantKind::Original),
        ];
        assert!(select(&spans, None, false).winner.is_none());
    }
}
