//! Preprocessing variant generation
//!
//! One decoded image fans out into a fixed, ordered set of renditions. Every
//! rendition keeps the source dimensions so detection boxes stay comparable.

pub mod steps;
pub mod variants;

pub use variants::{PreprocessingVariant, VariantGenerator, VariantKind, VariantSet};
