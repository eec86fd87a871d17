//! Multi-engine OCR consensus and field extraction for crowdfunding campaign
//! screenshots.
//!
//! One image is rendered into several preprocessing variants, every variant is
//! read by every engine in the pool, and the resulting detections are cleaned,
//! merged into canonical spans, classified into campaign fields and scored.
//! [`Extractor::extract`] is the entry point.

pub mod assemble;
pub mod classify;
pub mod config;
pub mod engine;
pub mod engines;
pub mod entities;
pub mod error;
pub mod extractor;
pub mod geometry;
pub mod model;
pub mod normalize;
pub mod orchestrator;
pub mod preprocessing;
pub mod translate;

pub use config::{Config, ExtractOptions};
pub use engine::{DetectionMode, EngineProfile, RecognitionEngine, Script, TextBox};
pub use engines::EnginePool;
pub use error::ExtractError;
pub use extractor::Extractor;
pub use model::{ExtractedField, ExtractionResult, FieldType};
