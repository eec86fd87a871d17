//! Field classification over canonical spans.
//!
//! Produces zero or more candidates per field type; conflict resolution and
//! scoring happen in the assembler. Every rule is a deterministic function of
//! the spans and the vocabulary.

pub mod dates;
pub mod patterns;
pub mod title;
pub mod vocabulary;

pub use vocabulary::Vocabulary;

use crate::entities::EntityRecognizer;
use crate::error::ExtractError;
use crate::geometry::Rect;
use crate::model::{CanonicalSpan, Diagnostic, FieldType, MatchStrength};
use patterns::{AmountMatch, Patterns};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use title::TitleSelector;
use vocabulary::{contains_keyword, fold_case, keyword_matches};

/// Similarity above which a misread token still names a platform
const PLATFORM_FUZZY_THRESHOLD: f64 = 0.85;
/// Shortest token considered for fuzzy platform matching
const PLATFORM_FUZZY_MIN_CHARS: usize = 5;
/// Same-line neighbours within this many line heights count as context
const LINE_NEIGHBOUR_HEIGHTS: f32 = 3.0;
/// Stacked neighbours within this many line heights count as context
const STACK_NEIGHBOUR_HEIGHTS: f32 = 1.5;

/// One proposed value for a field, backed by one span
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub field_type: FieldType,
    pub value: String,
    pub strength: MatchStrength,
    /// Index of the supporting span
    pub span: usize,
    /// ISO code and how sure the marker is, for amount candidates
    pub currency: Option<(String, MatchStrength)>,
}

impl Candidate {
    fn new(field_type: FieldType, value: impl Into<String>, strength: MatchStrength, span: usize) -> Self {
        Self {
            field_type,
            value: value.into(),
            strength,
            span,
            currency: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Classification {
    pub candidates: Vec<Candidate>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Classification {
    pub fn for_field(&self, field_type: FieldType) -> impl Iterator<Item = &Candidate> {
        self.candidates
            .iter()
            .filter(move |c| c.field_type == field_type)
    }

    pub fn by_field(&self) -> BTreeMap<FieldType, Vec<&Candidate>> {
        let mut map: BTreeMap<FieldType, Vec<&Candidate>> = BTreeMap::new();
        for candidate in &self.candidates {
            map.entry(candidate.field_type).or_default().push(candidate);
        }
        map
    }

    fn reject(&mut self, field_type: FieldType, value: impl Into<String>, reason: impl Into<String>) {
        self.diagnostics.push(Diagnostic::CandidateRejected {
            field_type,
            value: value.into(),
            reason: reason.into(),
        });
    }
}

pub struct Classifier {
    vocabulary: Arc<Vocabulary>,
    patterns: Patterns,
    recognizer: Option<Arc<dyn EntityRecognizer>>,
}

impl Classifier {
    pub fn new(vocabulary: Arc<Vocabulary>) -> Result<Self, ExtractError> {
        let patterns = Patterns::new(&vocabulary)?;
        Ok(Self {
            vocabulary,
            patterns,
            recognizer: None,
        })
    }

    /// Use `recognizer` to veto entity-only title candidates
    pub fn with_recognizer(mut self, recognizer: Arc<dyn EntityRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn classify(&self, spans: &[CanonicalSpan]) -> Classification {
        let mut out = Classification::default();
        let mut claimed: BTreeSet<usize> = BTreeSet::new();
        let texts: Vec<&str> = spans.iter().map(|s| self.matching_text(s)).collect();
        let folded: Vec<String> = texts.iter().map(|t| fold_case(t)).collect();

        let mut percent_spans = BTreeSet::new();
        for (i, text) in texts.iter().enumerate() {
            for p in self.patterns.percentages(text) {
                claimed.insert(i);
                percent_spans.insert(i);
                if p.discount {
                    out.reject(FieldType::Percentage, p.text, "discount, not an achievement rate");
                } else {
                    out.candidates
                        .push(Candidate::new(FieldType::Percentage, p.text, MatchStrength::Exact, i));
                }
            }
        }

        let amounts: Vec<(usize, AmountMatch)> = texts
            .iter()
            .enumerate()
            .flat_map(|(i, t)| self.patterns.amounts(t).into_iter().map(move |m| (i, m)))
            .collect();
        let amount_spans: BTreeSet<usize> = amounts.iter().map(|(i, _)| *i).collect();
        claimed.extend(&amount_spans);
        self.label_amounts(spans, &folded, &amounts, &amount_spans, &mut out);

        self.classify_supporters(spans, &texts, &folded, &amounts, &mut claimed, &mut out);
        self.classify_platforms(&folded, &mut claimed, &mut out);
        self.classify_statuses(&folded, &amount_spans, &percent_spans, &mut out);
        self.classify_deadlines(spans, &texts, &folded, &mut claimed, &mut out);

        let anchor = amount_spans.iter().copied().min_by(|&a, &b| {
            spans[a]
                .bbox
                .y0
                .total_cmp(&spans[b].bbox.y0)
                .then(spans[a].bbox.x0.total_cmp(&spans[b].bbox.x0))
        });
        let selector = TitleSelector {
            vocabulary: &self.vocabulary,
            recognizer: self.recognizer.as_deref(),
        };
        let selection = selector.select(spans, &claimed, anchor);
        out.diagnostics.extend(selection.diagnostics);
        if let Some((i, strength)) = selection.winner {
            out.candidates
                .push(Candidate::new(FieldType::Title, spans[i].text.clone(), strength, i));
        }

        tracing::debug!(
            "Classified {} spans into {} candidates",
            spans.len(),
            out.candidates.len()
        );
        out
    }

    /// Text the rules run on. A translation that lost every figure the
    /// original carried ("1,234,000円" rendered as "1.2 million yen") falls
    /// back to the original wording.
    fn matching_text<'a>(&self, span: &'a CanonicalSpan) -> &'a str {
        match &span.original_text {
            Some(original) if !self.has_figures(&span.text) && self.has_figures(original) => {
                tracing::debug!("Matching '{}' instead of its translation '{}'", original, span.text);
                original.as_str()
            }
            _ => span.text.as_str(),
        }
    }

    fn has_figures(&self, text: &str) -> bool {
        !self.patterns.amounts(text).is_empty()
            || !self.patterns.percentages(text).is_empty()
            || dates::find_date(text, &self.vocabulary).is_some()
            || dates::find_days_left(text).is_some()
    }

    /// Goal versus current: in-span keywords first, then neighbouring labels,
    /// then reading order (first unlabeled amount is current, the next is goal)
    fn label_amounts(
        &self,
        spans: &[CanonicalSpan],
        folded: &[String],
        amounts: &[(usize, AmountMatch)],
        amount_spans: &BTreeSet<usize>,
        out: &mut Classification,
    ) {
        let labels: Vec<Option<FieldType>> = amounts
            .iter()
            .map(|(i, m)| {
                self.label_in_span(&folded[*i], m)
                    .or_else(|| self.label_from_neighbours(spans, folded, *i, amount_spans))
            })
            .collect();

        let mut has_current = labels.contains(&Some(FieldType::CurrentAmount));
        let mut has_goal = labels.contains(&Some(FieldType::GoalAmount));

        for ((i, m), label) in amounts.iter().zip(labels) {
            let (field_type, strength) = match label {
                Some(field_type) => (field_type, m.strength),
                None if !has_current => {
                    has_current = true;
                    (FieldType::CurrentAmount, MatchStrength::Partial)
                }
                None if !has_goal => {
                    has_goal = true;
                    (FieldType::GoalAmount, MatchStrength::Partial)
                }
                None => {
                    out.reject(FieldType::CurrentAmount, m.text.clone(), "amount without goal or raised context");
                    continue;
                }
            };

            let currency = self.vocabulary.currency(&m.marker).map(|c| {
                let strength = if c.ambiguous {
                    MatchStrength::Partial
                } else {
                    MatchStrength::Exact
                };
                (c.code.clone(), strength)
            });
            out.candidates.push(Candidate {
                currency,
                ..Candidate::new(field_type, m.text.clone(), strength, *i)
            });
        }
    }

    fn label_in_span(&self, folded: &str, amount: &AmountMatch) -> Option<FieldType> {
        let before = folded[..amount.start].trim_end();
        if before == "of" || before.ends_with(" of") {
            return Some(FieldType::GoalAmount);
        }

        let mut best: Option<(usize, bool, FieldType)> = None;
        for (field_type, keywords) in [
            (FieldType::GoalAmount, &self.vocabulary.goal_keywords),
            (FieldType::CurrentAmount, &self.vocabulary.current_keywords),
        ] {
            for keyword in keywords {
                for (start, end) in keyword_matches(folded, keyword) {
                    if start < amount.end && amount.start < end {
                        continue;
                    }
                    let preceding = end <= amount.start;
                    let distance = if preceding {
                        folded[end..amount.start].chars().count()
                    } else {
                        folded[amount.end..start].chars().count()
                    };
                    let better = match best {
                        None => true,
                        Some((d, p, _)) => distance < d || (distance == d && preceding && !p),
                    };
                    if better {
                        best = Some((distance, preceding, field_type));
                    }
                }
            }
        }
        best.map(|(_, _, field_type)| field_type)
    }

    fn label_from_neighbours(
        &self,
        spans: &[CanonicalSpan],
        folded: &[String],
        i: usize,
        amount_spans: &BTreeSet<usize>,
    ) -> Option<FieldType> {
        spans
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i && !amount_spans.contains(j))
            .filter_map(|(j, s)| {
                let gap = neighbour_gap(&spans[i].bbox, &s.bbox)?;
                let label = self.keyword_label(&folded[j])?;
                Some((gap, j, label))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(_, _, label)| label)
    }

    fn keyword_label(&self, folded: &str) -> Option<FieldType> {
        let goal = self
            .vocabulary
            .goal_keywords
            .iter()
            .any(|k| contains_keyword(folded, k));
        let current = self
            .vocabulary
            .current_keywords
            .iter()
            .any(|k| contains_keyword(folded, k));
        match (goal, current) {
            (true, false) => Some(FieldType::GoalAmount),
            (false, true) => Some(FieldType::CurrentAmount),
            _ => None,
        }
    }

    fn classify_supporters(
        &self,
        spans: &[CanonicalSpan],
        texts: &[&str],
        folded: &[String],
        amounts: &[(usize, AmountMatch)],
        claimed: &mut BTreeSet<usize>,
        out: &mut Classification,
    ) {
        for (i, span) in spans.iter().enumerate() {
            if let Some((count, start, end)) = self.patterns.supporters(texts[i]) {
                let inside_amount = amounts
                    .iter()
                    .any(|(j, m)| *j == i && start < m.end && m.start < end);
                if !inside_amount {
                    claimed.insert(i);
                    out.candidates
                        .push(Candidate::new(FieldType::Supporters, count, MatchStrength::Exact, i));
                }
                continue;
            }

            if claimed.contains(&i) || !Patterns::is_bare_count(texts[i]) {
                continue;
            }
            let labelled = spans.iter().enumerate().any(|(j, s)| {
                j != i
                    && !texts[j].chars().any(|c| c.is_ascii_digit())
                    && neighbour_gap(&span.bbox, &s.bbox).is_some()
                    && self
                        .vocabulary
                        .supporter_keywords
                        .iter()
                        .any(|k| contains_keyword(&folded[j], k))
            });
            if labelled {
                claimed.insert(i);
                out.candidates.push(Candidate::new(
                    FieldType::Supporters,
                    texts[i].trim(),
                    MatchStrength::Partial,
                    i,
                ));
            }
        }
    }

    fn classify_platforms(&self, folded: &[String], claimed: &mut BTreeSet<usize>, out: &mut Classification) {
        for (i, text) in folded.iter().enumerate() {
            let exact = self.vocabulary.platforms.iter().find(|p| {
                std::iter::once(&p.name)
                    .chain(&p.aliases)
                    .any(|name| contains_keyword(text, name))
            });
            if let Some(platform) = exact {
                claimed.insert(i);
                out.candidates
                    .push(Candidate::new(FieldType::Platform, platform.name.clone(), MatchStrength::Exact, i));
                continue;
            }

            let fuzzy = self.vocabulary.platforms.iter().find(|p| {
                let name: String = fold_case(&p.name).split_whitespace().collect();
                name.chars().count() >= PLATFORM_FUZZY_MIN_CHARS
                    && text
                        .split(|c: char| !c.is_alphanumeric())
                        .filter(|t| t.chars().count() >= PLATFORM_FUZZY_MIN_CHARS)
                        .any(|t| strsim::normalized_levenshtein(t, &name) >= PLATFORM_FUZZY_THRESHOLD)
            });
            if let Some(platform) = fuzzy {
                claimed.insert(i);
                out.candidates.push(Candidate::new(
                    FieldType::Platform,
                    platform.name.clone(),
                    MatchStrength::Partial,
                    i,
                ));
            }
        }
    }

    /// Status badges stand alone; keywords inside figure spans ("150% funded")
    /// describe the figure, not the campaign state
    fn classify_statuses(
        &self,
        folded: &[String],
        amount_spans: &BTreeSet<usize>,
        percent_spans: &BTreeSet<usize>,
        out: &mut Classification,
    ) {
        for (i, text) in folded.iter().enumerate() {
            if amount_spans.contains(&i) || percent_spans.contains(&i) {
                continue;
            }
            let hit = self.vocabulary.statuses.iter().find_map(|status| {
                status
                    .keywords
                    .iter()
                    .find(|k| contains_keyword(text, k))
                    .map(|k| (status, k))
            });
            if let Some((status, keyword)) = hit {
                let badge = text.trim_matches(|c: char| !c.is_alphanumeric()) == fold_case(keyword);
                let strength = if badge {
                    MatchStrength::Exact
                } else {
                    MatchStrength::Partial
                };
                out.candidates
                    .push(Candidate::new(FieldType::Status, status.status.clone(), strength, i));
            }
        }
    }

    fn classify_deadlines(
        &self,
        spans: &[CanonicalSpan],
        texts: &[&str],
        folded: &[String],
        claimed: &mut BTreeSet<usize>,
        out: &mut Classification,
    ) {
        for (i, text) in texts.iter().enumerate() {
            if let Some(date) = dates::find_date(text, &self.vocabulary) {
                claimed.insert(i);
                if self.near_start_keyword(spans, folded, i) {
                    out.reject(FieldType::Deadline, date.text, "start date");
                    continue;
                }
                let keyworded = self
                    .vocabulary
                    .deadline_keywords
                    .iter()
                    .any(|k| contains_keyword(&folded[i], k));
                let strength = if keyworded {
                    MatchStrength::Exact
                } else {
                    MatchStrength::Partial
                };
                out.candidates
                    .push(Candidate::new(FieldType::Deadline, date.text, strength, i));
            } else if let Some(countdown) = dates::find_days_left(text) {
                claimed.insert(i);
                out.candidates.push(Candidate::new(
                    FieldType::Deadline,
                    countdown.text,
                    MatchStrength::Partial,
                    i,
                ));
            }
        }
    }

    /// A start keyword in the span itself or in the label just left of it
    fn near_start_keyword(&self, spans: &[CanonicalSpan], folded: &[String], i: usize) -> bool {
        let has_start = |text: &str| {
            self.vocabulary
                .start_keywords
                .iter()
                .any(|k| contains_keyword(text, k))
        };
        if has_start(&folded[i]) {
            return true;
        }
        let me = &spans[i].bbox;
        spans
            .iter()
            .enumerate()
            .filter(|(j, s)| *j != i && me.same_line(&s.bbox) && s.bbox.x1 <= me.x0 + 1.0)
            .max_by(|a, b| a.1.bbox.x1.total_cmp(&b.1.bbox.x1))
            .is_some_and(|(j, s)| {
                me.x0 - s.bbox.x1 <= LINE_NEIGHBOUR_HEIGHTS * me.height() && has_start(&folded[j])
            })
    }
}

/// Gap to a span that sits beside `a` on its line or directly above/below it;
/// `None` when `b` is too far away to be context
fn neighbour_gap(a: &Rect, b: &Rect) -> Option<f32> {
    let height = a.height().max(b.height());
    if a.same_line(b) {
        let gap = if b.x0 >= a.x1 {
            b.x0 - a.x1
        } else if a.x0 >= b.x1 {
            a.x0 - b.x1
        } else {
            0.0
        };
        return (gap <= LINE_NEIGHBOUR_HEIGHTS * height).then_some(gap);
    }

    let horizontal_overlap = a.x1.min(b.x1) - a.x0.max(b.x0);
    if horizontal_overlap <= 0.0 {
        return None;
    }
    let gap = if b.y0 >= a.y1 {
        b.y0 - a.y1
    } else if a.y0 >= b.y1 {
        a.y0 - b.y1
    } else {
        0.0
    };
    (gap <= STACK_NEIGHBOUR_HEIGHTS * height).then_some(gap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawDetection;
    use crate::preprocessing::VariantKind;
    use pretty_assertions::assert_eq;

    fn span(text: &str, x: f32, y: f32) -> CanonicalSpan {
        CanonicalSpan::from_detection(RawDetection {
            text: text.to_string(),
            bbox: Rect::new(x, y, x + 10.0 * text.chars().count() as f32, y + 20.0),
            score: 0.9,
            source_variant: VariantKind::Original,
            source_engine: "a".to_string(),
        })
    }

    fn classify(spans: &[CanonicalSpan]) -> Classification {
        Classifier::new(Arc::new(Vocabulary::default()))
            .unwrap()
            .classify(spans)
    }

    fn values(result: &Classification, field_type: FieldType) -> Vec<String> {
        result.for_field(field_type).map(|c| c.value.clone()).collect()
    }

    #[test]
    fn test_goal_and_raised_keywords() {
        let result = classify(&[span("Goal: $15,000", 10.0, 100.0), span("$265,400 raised", 10.0, 140.0)]);
        assert_eq!(values(&result, FieldType::GoalAmount), vec!["$15,000"]);
        assert_eq!(values(&result, FieldType::CurrentAmount), vec!["$265,400"]);
    }

    fn translated(original: &str, english: &str, x: f32, y: f32) -> CanonicalSpan {
        let mut span = span(english, x, y);
        span.original_text = Some(original.to_string());
        span
    }

    #[test]
    fn test_translation_without_figures_matches_original() {
        let result = classify(&[
            translated("目標金額 500,000円", "Target amount half a million yen", 10.0, 100.0),
            translated("残り12日", "12 days left", 10.0, 140.0),
        ]);
        assert_eq!(values(&result, FieldType::GoalAmount), vec!["500,000円"]);
        let goal = result.for_field(FieldType::GoalAmount).next().unwrap();
        assert_eq!(goal.currency, Some(("JPY".to_string(), MatchStrength::Exact)));
        // the translation kept its figure, so it is matched as translated
        assert_eq!(values(&result, FieldType::Deadline), vec!["12 days left"]);
    }

    #[test]
    fn test_of_marks_goal() {
        let result = classify(&[span("$265,400 pledged of $15,000", 10.0, 100.0)]);
        assert_eq!(values(&result, FieldType::CurrentAmount), vec!["$265,400"]);
        assert_eq!(values(&result, FieldType::GoalAmount), vec!["$15,000"]);
    }

    #[test]
    fn test_label_from_neighbour_span() {
        let result = classify(&[
            span("目標金額", 10.0, 100.0),
            span("¥500,000", 10.0, 125.0),
            span("¥1,234,000", 300.0, 300.0),
        ]);
        assert_eq!(values(&result, FieldType::GoalAmount), vec!["¥500,000"]);
        // no context at all: the remaining amount falls back to current
        let current: Vec<&Candidate> = result.for_field(FieldType::CurrentAmount).collect();
        assert_eq!(current[0].value, "¥1,234,000");
        assert_eq!(current[0].strength, MatchStrength::Partial);
        assert_eq!(current[0].currency, Some(("JPY".to_string(), MatchStrength::Partial)));
    }

    #[test]
    fn test_supporters() {
        let result = classify(&[span("1,036 backers", 10.0, 100.0)]);
        assert_eq!(values(&result, FieldType::Supporters), vec!["1,036"]);
        assert!(values(&result, FieldType::CurrentAmount).is_empty());

        let split = classify(&[span("1,036", 10.0, 100.0), span("backers", 70.0, 100.0)]);
        let found: Vec<&Candidate> = split.for_field(FieldType::Supporters).collect();
        assert_eq!(found[0].value, "1,036");
        assert_eq!(found[0].strength, MatchStrength::Partial);
    }

    #[test]
    fn test_percentage_is_not_an_amount() {
        let result = classify(&[span("$1,500", 10.0, 100.0), span("150%", 90.0, 100.0)]);
        assert_eq!(values(&result, FieldType::Percentage), vec!["150%"]);
        assert_eq!(values(&result, FieldType::CurrentAmount), vec!["$1,500"]);
        assert!(result.candidates.iter().filter(|c| c.field_type.is_amount()).all(|c| c.span == 0));
    }

    #[test]
    fn test_discount_rejected() {
        let result = classify(&[span("48% OFF", 10.0, 100.0)]);
        assert!(values(&result, FieldType::Percentage).is_empty());
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn test_platform_status_and_deadline() {
        let result = classify(&[
            span("Kickstarler", 10.0, 10.0),
            span("LIVE", 10.0, 40.0),
            span("Launched 2024/01/10", 10.0, 200.0),
            span("Ends March 12, 2024", 10.0, 230.0),
        ]);
        let platform: Vec<&Candidate> = result.for_field(FieldType::Platform).collect();
        assert_eq!(platform[0].value, "Kickstarter");
        assert_eq!(platform[0].strength, MatchStrength::Partial);
        assert_eq!(values(&result, FieldType::Status), vec!["live"]);
        assert_eq!(values(&result, FieldType::Deadline), vec!["March 12, 2024"]);
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.to_string().contains("start date")));
    }

    #[test]
    fn test_title_above_amounts() {
        let result = classify(&[
            span("Save The Ocean", 10.0, 10.0),
            span("Goal: $15,000", 10.0, 100.0),
            span("$265,400 raised", 10.0, 140.0),
        ]);
        assert_eq!(values(&result, FieldType::Title), vec!["Save The Ocean"]);
    }
}
