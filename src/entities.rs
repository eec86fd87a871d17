//! Named-entity capability, used only to veto title candidates
//!
//! Any recognizer can be plugged in; the built-in one spots company names by
//! their legal-form suffix and never reports people or places.

use crate::classify::vocabulary::fold_case;
use crate::classify::Vocabulary;
use crate::error::ExtractError;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Location,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    /// The entity's surface text within the input
    pub span: String,
    pub entity_type: EntityType,
}

pub trait EntityRecognizer: Send + Sync {
    fn recognize_entities(&self, text: &str) -> Result<Vec<Entity>, ExtractError>;
}

/// Recognizes "Acme Inc.", "Blue Ocean LLC", "株式会社サンプル" as organizations
pub struct OrganizationSuffixRecognizer {
    suffixes: Vec<String>,
}

impl OrganizationSuffixRecognizer {
    pub fn new(suffixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            suffixes: suffixes.into_iter().map(|s| fold_case(&s.into())).collect(),
        }
    }

    pub fn from_vocabulary(vocabulary: &Vocabulary) -> Self {
        Self::new(vocabulary.organization_suffixes.iter().cloned())
    }

    fn is_organization(&self, folded: &str) -> bool {
        self.suffixes.iter().any(|suffix| {
            if suffix.is_ascii() {
                // a Latin suffix must follow a name, separated by space or comma
                folded
                    .strip_suffix(suffix.as_str())
                    .is_some_and(|name| name.ends_with(' ') || name.ends_with(", "))
            } else {
                folded.starts_with(suffix.as_str()) || folded.ends_with(suffix.as_str())
            }
        })
    }
}

impl EntityRecognizer for OrganizationSuffixRecognizer {
    fn recognize_entities(&self, text: &str) -> Result<Vec<Entity>, ExtractError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        if self.is_organization(&fold_case(trimmed)) {
            return Ok(vec![Entity {
                span: trimmed.to_string(),
                entity_type: EntityType::Organization,
            }]);
        }
        Ok(Vec::new())
    }
}
