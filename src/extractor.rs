//! The single extraction entry point.
//!
//! An [`Extractor`] is built once per process (engine models are expensive to
//! load) and shared; every call to [`Extractor::extract`] is independent and
//! owns all of its intermediate state.

use crate::assemble::Assembler;
use crate::classify::{Classifier, Vocabulary};
use crate::config::{Config, ExtractOptions};
use crate::engines::EnginePool;
use crate::entities::{EntityRecognizer, OrganizationSuffixRecognizer};
use crate::error::ExtractError;
use crate::model::{Diagnostic, ExtractionResult};
use crate::normalize;
use crate::orchestrator::Orchestrator;
use crate::preprocessing::VariantGenerator;
use crate::translate::{translate_spans, HttpTranslator, Translator};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const TRANSLATE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Extractor {
    pool: Arc<EnginePool>,
    classifier: Classifier,
    translator: Option<Arc<dyn Translator>>,
}

impl Extractor {
    pub fn new(pool: Arc<EnginePool>, vocabulary: Vocabulary) -> Result<Self, ExtractError> {
        Ok(Self {
            pool,
            classifier: Classifier::new(Arc::new(vocabulary))?,
            translator: None,
        })
    }

    /// Translate non-Latin spans before classification
    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    /// Veto title candidates that are only an entity name
    pub fn with_recognizer(mut self, recognizer: Arc<dyn EntityRecognizer>) -> Self {
        self.classifier = self.classifier.with_recognizer(recognizer);
        self
    }

    /// Build the engine pool, vocabulary and optional collaborators from the
    /// command-line configuration
    pub fn from_config(config: &Config) -> Result<Self, ExtractError> {
        let pool = Arc::new(EnginePool::from_config(config)?);
        let vocabulary = config.vocabulary()?;
        let recognizer = OrganizationSuffixRecognizer::from_vocabulary(&vocabulary);

        let mut extractor = Self::new(pool, vocabulary)?.with_recognizer(Arc::new(recognizer));
        if let Some(url) = &config.translate_url {
            tracing::info!("Translating non-Latin text via {}", url);
            extractor = extractor.with_translator(Arc::new(HttpTranslator::new(url.clone(), TRANSLATE_TIMEOUT)));
        }
        Ok(extractor)
    }

    /// Extract campaign fields from encoded image bytes.
    ///
    /// Only undecodable input is an error; every other failure degrades the
    /// result and shows up in its diagnostics.
    pub async fn extract(&self, image_bytes: &[u8], options: &ExtractOptions) -> Result<ExtractionResult, ExtractError> {
        self.extract_with_cancel(image_bytes, options, CancellationToken::new())
            .await
    }

    /// Like [`Extractor::extract`], stopping early when `cancel` fires. Work
    /// finished before cancellation still goes into the result.
    pub async fn extract_with_cancel(
        &self,
        image_bytes: &[u8],
        options: &ExtractOptions,
        cancel: CancellationToken,
    ) -> Result<ExtractionResult, ExtractError> {
        let start = Instant::now();
        let options = options.clamped();

        let bytes = image_bytes.to_vec();
        let generator = VariantGenerator::new(options.enabled_variants.as_deref());
        let variant_set = tokio::task::spawn_blocking(move || {
            let image = image::load_from_memory(&bytes)
                .map_err(|e| ExtractError::MalformedImage(e.to_string()))?;
            tracing::debug!("Decoded {}x{} image", image.width(), image.height());
            Ok::<_, ExtractError>(generator.generate(&image))
        })
        .await
        .map_err(|e| ExtractError::Internal(format!("preprocessing task failed: {}", e)))??;

        tracing::info!(
            "Preprocessing produced {} variants ({} skipped)",
            variant_set.variants.len(),
            variant_set.skipped.len()
        );
        let mut diagnostics: Vec<Diagnostic> = variant_set
            .skipped
            .into_iter()
            .map(Diagnostic::Recovered)
            .collect();

        let engines = self
            .pool
            .select(options.enabled_engines.as_deref(), options.script_hint);
        tracing::info!(
            "Running {} engines over {} variants",
            engines.len(),
            variant_set.variants.len()
        );
        let batch = Orchestrator::from_options(&options)
            .run(&variant_set.variants, &engines, &cancel)
            .await;
        diagnostics.extend(batch.diagnostics);
        let total_detections = batch.detections.len();

        let mut spans = normalize::normalize(batch.detections, &options);

        if let Some(translator) = self.translator.as_ref().filter(|_| !cancel.is_cancelled()) {
            let translator = Arc::clone(translator);
            let target = options.target_language.clone();
            let cancel = cancel.clone();
            let (translated, translation_diagnostics) = tokio::task::spawn_blocking(move || {
                let found = translate_spans(&mut spans, translator.as_ref(), &target, &cancel);
                (spans, found)
            })
            .await
            .map_err(|e| ExtractError::Internal(format!("translation task failed: {}", e)))?;
            spans = translated;
            diagnostics.extend(translation_diagnostics);
        }

        let classification = self.classifier.classify(&spans);
        tracing::info!(
            "Classified {} spans into {} candidates",
            spans.len(),
            classification.candidates.len()
        );

        let assembler = Assembler {
            engines_attempted: batch.engines_attempted,
            total_detections,
            return_diagnostics: options.return_diagnostics,
        };
        let result = assembler.assemble(&spans, classification, diagnostics);

        tracing::info!(
            "Extraction complete in {}ms: {} fields, confidence {:.2}",
            start.elapsed().as_millis(),
            result.fields.len(),
            result.overall_confidence
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat};
    use std::io::Cursor;

    fn empty_extractor() -> Extractor {
        Extractor::new(Arc::new(EnginePool::new()), Vocabulary::default()).unwrap()
    }

    #[test]
    fn test_undecodable_input_is_the_only_error() {
        let err = tokio_test::block_on(empty_extractor().extract(&[0u8, 1, 2], &ExtractOptions::default()))
            .unwrap_err();
        assert_eq!(err.kind(), "MalformedImage");
    }

    #[test]
    fn test_tiny_image_reports_skipped_variants() {
        let mut bytes = Vec::new();
        DynamicImage::new_rgb8(1, 1)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let result = tokio_test::block_on(empty_extractor().extract(&bytes, &ExtractOptions::default()))
            .unwrap();
        assert!(result.has_diagnostic("PreprocessingError"));
        assert!(result.has_diagnostic("NoDetectionsFound"));
        assert_eq!(result.overall_confidence, 0.0);
    }
}
