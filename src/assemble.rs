//! Conflict resolution, confidence scoring and result assembly.
//!
//! At most one value survives per field type. Fields are only ever built from
//! classifier candidates; a field with no candidate is absent from the result
//! and reported as missing in the diagnostics.

use crate::classify::{Candidate, Classification};
use crate::error::ExtractError;
use crate::model::{
    CanonicalSpan, Diagnostic, ExtractedField, ExtractionResult, FieldType, MatchStrength,
};
use std::collections::BTreeMap;

/// Weight of cross-method agreement in a field's confidence
pub const AGREEMENT_WEIGHT: f32 = 0.5;
/// Weight of the winning span's best detection score
pub const SCORE_WEIGHT: f32 = 0.3;
/// Weight of the rule's match strength
pub const STRENGTH_WEIGHT: f32 = 0.2;
/// Overall confidence multiplier per absent mandatory group
pub const MISSING_GROUP_PENALTY: f32 = 0.75;
/// Fields below this confidence are reported as unreliable
pub const UNRELIABLE_BELOW: f32 = 0.4;

/// Confidence of a field backed by `span` and matched with `strength`
pub fn field_confidence(span: &CanonicalSpan, strength: MatchStrength, engines_attempted: usize) -> f32 {
    let agreement = (span.support_count as f32 / engines_attempted.max(1) as f32).min(1.0);
    let bonus = match strength {
        MatchStrength::Exact => 1.0,
        MatchStrength::Partial => 0.5,
    };
    let score = if span.max_score.is_nan() { 0.0 } else { span.max_score };
    (AGREEMENT_WEIGHT * agreement + SCORE_WEIGHT * score + STRENGTH_WEIGHT * bonus).clamp(0.0, 1.0)
}

/// Mean field confidence, scaled down for each absent mandatory group
/// (title, any amount, status)
pub fn overall_confidence(fields: &BTreeMap<FieldType, ExtractedField>) -> f32 {
    if fields.is_empty() {
        return 0.0;
    }
    let mean = fields.values().map(|f| f.confidence).sum::<f32>() / fields.len() as f32;

    let groups = [
        fields.contains_key(&FieldType::Title),
        fields.keys().any(FieldType::is_amount),
        fields.contains_key(&FieldType::Status),
    ];
    let missing = groups.iter().filter(|present| !**present).count() as i32;
    (mean * MISSING_GROUP_PENALTY.powi(missing)).clamp(0.0, 1.0)
}

pub struct Assembler {
    pub engines_attempted: usize,
    pub total_detections: usize,
    pub return_diagnostics: bool,
}

impl Assembler {
    /// Resolve candidates into the final record. `upstream` carries the
    /// diagnostics of the earlier stages, in pipeline order.
    pub fn assemble(
        &self,
        spans: &[CanonicalSpan],
        classification: Classification,
        upstream: Vec<Diagnostic>,
    ) -> ExtractionResult {
        let mut diagnostics = upstream;
        diagnostics.extend(classification.diagnostics.iter().cloned());

        let mut fields: BTreeMap<FieldType, ExtractedField> = BTreeMap::new();
        let mut amount_winners: BTreeMap<FieldType, Candidate> = BTreeMap::new();

        for (field_type, candidates) in classification.by_field() {
            let Some((winner, field)) = self.resolve(spans, field_type, candidates, &mut diagnostics) else {
                continue;
            };
            if field_type.is_amount() {
                amount_winners.insert(field_type, winner);
            }
            fields.insert(field_type, field);
        }

        if let Some(currency) = self.currency_field(spans, &amount_winners) {
            fields.insert(FieldType::Currency, currency);
        }

        if self.total_detections == 0 {
            diagnostics.push(Diagnostic::Recovered(ExtractError::NoDetectionsFound));
        }
        for field_type in FieldType::ALL {
            diagnostics.push(match fields.get(&field_type) {
                Some(field) if field.confidence < UNRELIABLE_BELOW => Diagnostic::FieldUnreliable {
                    field_type,
                    confidence: field.confidence,
                },
                Some(field) => Diagnostic::FieldFound {
                    field_type,
                    confidence: field.confidence,
                },
                None => Diagnostic::FieldMissing { field_type },
            });
        }

        let overall_confidence = overall_confidence(&fields);
        tracing::info!(
            "Assembled {} fields (overall confidence {:.2})",
            fields.len(),
            overall_confidence
        );

        ExtractionResult {
            fields,
            overall_confidence,
            total_detections_considered: self.total_detections,
            diagnostics: if self.return_diagnostics {
                diagnostics.iter().map(|d| d.to_string()).collect()
            } else {
                Vec::new()
            },
        }
    }

    /// Pick the candidate whose span has the most support, then the best
    /// score, then the stronger match, then the earliest reading position
    fn resolve(
        &self,
        spans: &[CanonicalSpan],
        field_type: FieldType,
        mut candidates: Vec<&Candidate>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<(Candidate, ExtractedField)> {
        candidates.retain(|c| c.span < spans.len());
        candidates.sort_by(|a, b| {
            let (sa, sb) = (&spans[a.span], &spans[b.span]);
            sb.support_count
                .cmp(&sa.support_count)
                .then(sb.max_score.total_cmp(&sa.max_score))
                .then(b.strength.cmp(&a.strength))
                .then(a.span.cmp(&b.span))
        });
        let (&winner, losers) = candidates.split_first()?;
        let winning_span = &spans[winner.span];

        let mut evidence = vec![winning_span.clone()];
        for loser in losers {
            if loser.value == winner.value {
                if evidence.iter().all(|e| e != &spans[loser.span]) {
                    evidence.push(spans[loser.span].clone());
                }
                continue;
            }
            diagnostics.push(Diagnostic::CandidateRejected {
                field_type,
                value: loser.value.clone(),
                reason: format!(
                    "lost to '{}' (support {} vs {})",
                    winner.value, winning_span.support_count, spans[loser.span].support_count
                ),
            });
        }

        let field = ExtractedField {
            field_type,
            value: winner.value.clone(),
            confidence: field_confidence(winning_span, winner.strength, self.engines_attempted),
            evidence,
        };
        Some((winner.clone(), field))
    }

    /// ISO code of the raised amount's marker, else the goal's
    fn currency_field(
        &self,
        spans: &[CanonicalSpan],
        amounts: &BTreeMap<FieldType, Candidate>,
    ) -> Option<ExtractedField> {
        let source = amounts
            .get(&FieldType::CurrentAmount)
            .filter(|c| c.currency.is_some())
            .or_else(|| amounts.get(&FieldType::GoalAmount))?;
        let (code, marker_strength) = source.currency.as_ref()?;
        let strength = (*marker_strength).min(source.strength);
        let span = spans.get(source.span)?;

        tracing::debug!("Currency {} inferred from '{}'", code, source.value);
        Some(ExtractedField {
            field_type: FieldType::Currency,
            value: code.clone(),
            confidence: field_confidence(span, strength, self.engines_attempted),
            evidence: vec![span.clone()],
        })
    }
}
