//! Data carried between pipeline stages.
//!
//! Everything here lives for a single extraction: detections are produced by
//! the orchestrator, merged into spans, classified into fields and finally
//! owned by the caller as an [`ExtractionResult`].

use crate::error::ExtractError;
use crate::geometry::Rect;
use crate::preprocessing::VariantKind;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// One text region from one successful (variant, engine) call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawDetection {
    pub text: String,
    pub bbox: Rect,
    pub score: f32,
    pub source_variant: VariantKind,
    pub source_engine: String,
}

impl RawDetection {
    /// Identity of the (variant, engine) call that produced this detection
    pub fn source_key(&self) -> (VariantKind, &str) {
        (self.source_variant, self.source_engine.as_str())
    }
}

/// A deduplicated text element backed by one or more detections
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalSpan {
    pub text: String,
    /// Text before translation, when the translation pass replaced it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
    /// Box of the representative (highest-scoring) detection
    pub bbox: Rect,
    /// Number of distinct (variant, engine) calls backing this span
    pub support_count: usize,
    pub max_score: f32,
    pub contributing_detections: Vec<RawDetection>,
}

impl CanonicalSpan {
    pub fn from_detection(detection: RawDetection) -> Self {
        Self {
            text: detection.text.clone(),
            original_text: None,
            bbox: detection.bbox,
            support_count: 1,
            max_score: detection.score,
            contributing_detections: vec![detection],
        }
    }

    /// Preprocessing variant of the representative detection
    pub fn variant(&self) -> VariantKind {
        self.contributing_detections
            .iter()
            .find(|d| d.text == self.text && d.bbox == self.bbox)
            .or_else(|| self.contributing_detections.first())
            .map(|d| d.source_variant)
            .unwrap_or_default()
    }
}

/// Semantic crowdfunding attributes the classifier can populate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Title,
    GoalAmount,
    CurrentAmount,
    Supporters,
    Percentage,
    Deadline,
    Platform,
    Status,
    Currency,
}

impl FieldType {
    pub const ALL: [FieldType; 9] = [
        FieldType::Title,
        FieldType::GoalAmount,
        FieldType::CurrentAmount,
        FieldType::Supporters,
        FieldType::Percentage,
        FieldType::Deadline,
        FieldType::Platform,
        FieldType::Status,
        FieldType::Currency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::GoalAmount => "goal_amount",
            Self::CurrentAmount => "current_amount",
            Self::Supporters => "supporters",
            Self::Percentage => "percentage",
            Self::Deadline => "deadline",
            Self::Platform => "platform",
            Self::Status => "status",
            Self::Currency => "currency",
        }
    }

    pub fn is_amount(&self) -> bool {
        matches!(self, Self::GoalAmount | Self::CurrentAmount)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How well a candidate matched its rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrength {
    Partial,
    Exact,
}

/// A populated field of the final record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedField {
    pub field_type: FieldType,
    pub value: String,
    pub confidence: f32,
    pub evidence: Vec<CanonicalSpan>,
}

/// Terminal artifact of one extraction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    pub fields: BTreeMap<FieldType, ExtractedField>,
    pub overall_confidence: f32,
    pub total_detections_considered: usize,
    pub diagnostics: Vec<String>,
}

impl ExtractionResult {
    pub fn get(&self, field_type: FieldType) -> Option<&ExtractedField> {
        self.fields.get(&field_type)
    }

    /// Value of a field, if it was found
    pub fn value(&self, field_type: FieldType) -> Option<&str> {
        self.get(field_type).map(|f| f.value.as_str())
    }

    pub fn has_diagnostic(&self, kind: &str) -> bool {
        self.diagnostics.iter().any(|d| d.starts_with(kind))
    }
}

/// Non-fatal events recorded during an extraction
#[derive(Debug, Clone)]
pub enum Diagnostic {
    /// A recovered failure from the error taxonomy
    Recovered(ExtractError),
    Cancelled {
        completed: usize,
        abandoned: usize,
    },
    CandidateRejected {
        field_type: FieldType,
        value: String,
        reason: String,
    },
    FieldFound {
        field_type: FieldType,
        confidence: f32,
    },
    FieldUnreliable {
        field_type: FieldType,
        confidence: f32,
    },
    FieldMissing {
        field_type: FieldType,
    },
}

impl Diagnostic {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Recovered(err) => err.kind(),
            Self::Cancelled { .. } => "Cancelled",
            Self::CandidateRejected { .. } => "CandidateRejected",
            Self::FieldFound { .. } => "FieldFound",
            Self::FieldUnreliable { .. } => "FieldUnreliable",
            Self::FieldMissing { .. } => "FieldMissing",
        }
    }
}

impl From<ExtractError> for Diagnostic {
    fn from(err: ExtractError) -> Self {
        Self::Recovered(err)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.kind())?;
        match self {
            Self::Recovered(err) => write!(f, "{}", err),
            Self::Cancelled {
                completed,
                abandoned,
            } => write!(
                f,
                "extraction cancelled after {} calls, {} abandoned",
                completed, abandoned
            ),
            Self::CandidateRejected {
                field_type,
                value,
                reason,
            } => write!(f, "{} candidate '{}' rejected ({})", field_type, value, reason),
            Self::FieldFound {
                field_type,
                confidence,
            } => write!(f, "{} found (confidence {:.2})", field_type, confidence),
            Self::FieldUnreliable {
                field_type,
                confidence,
            } => write!(
                f,
                "{} found but unreliable (confidence {:.2})",
                field_type, confidence
            ),
            Self::FieldMissing { field_type } => write!(f, "{} not found", field_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(text: &str, variant: VariantKind, engine: &str) -> RawDetection {
        RawDetection {
            text: text.to_string(),
            bbox: Rect::new(0.0, 0.0, 100.0, 20.0),
            score: 0.9,
            source_variant: variant,
            source_engine: engine.to_string(),
        }
    }

    #[test]
    fn test_diagnostic_rendering_starts_with_kind() {
        let diag = Diagnostic::from(ExtractError::NoDetectionsFound);
        assert!(diag.to_string().starts_with("NoDetectionsFound: "));

        let missing = Diagnostic::FieldMissing {
            field_type: FieldType::Deadline,
        };
        assert_eq!(missing.to_string(), "FieldMissing: deadline not found");
    }

    #[test]
    fn test_variant_follows_representative_detection() {
        let mut span = CanonicalSpan::from_detection(detection("Save", VariantKind::Sharpened, "x"));
        span.contributing_detections
            .insert(0, detection("Saue", VariantKind::Original, "y"));
        assert_eq!(span.variant(), VariantKind::Sharpened);
    }
}
