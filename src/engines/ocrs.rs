//! OCRS engine implementation
//!
//! Pure Rust OCR engine using the ocrs library. No system dependencies required.
//! Downloads neural network models automatically on first use. ocrs reads
//! Latin script only.

use crate::config::Config;
use crate::engine::{DetectionMode, EngineProfile, RecognitionEngine, Script, TextBox};
use crate::error::ExtractError;
use crate::geometry::Rect;
use image::DynamicImage;
use ocrs::{DecodeMethod, ImageSource, OcrEngine as OcrsOcrEngine, OcrEngineParams, TextItem};
use rten::Model;
use std::path::PathBuf;
use std::sync::Arc;

/// Default model URLs from the ocrs project
const DETECTION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-detection.rten";
const RECOGNITION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-recognition.rten";

/// One ocrs-backed pool entry. Instances share the loaded models and differ
/// only by detection mode.
pub struct OcrsEngine {
    engine: Arc<OcrsOcrEngine>,
    profile: EngineProfile,
}

impl OcrsEngine {
    /// Load the models once and wrap them for every configured detection mode
    pub fn from_config(config: &Config) -> Result<Vec<Self>, ExtractError> {
        let shared = Arc::new(load_engine()?);
        Ok(config
            .detection_modes
            .iter()
            .map(|&mode| Self::new(Arc::clone(&shared), mode))
            .collect())
    }

    pub fn new(engine: Arc<OcrsOcrEngine>, mode: DetectionMode) -> Self {
        Self {
            engine,
            profile: EngineProfile::new(format!("ocrs-{}", mode.as_str()), [Script::Latin], mode),
        }
    }
}

impl RecognitionEngine for OcrsEngine {
    fn profile(&self) -> &EngineProfile {
        &self.profile
    }

    fn description(&self) -> &'static str {
        "Pure Rust OCR engine - fast, no system dependencies required"
    }

    fn detect(&self, image: &DynamicImage) -> Result<Vec<TextBox>, ExtractError> {
        // Convert to RGB8 (HWC format, which is what ImageSource::from_bytes expects)
        let rgb_img = image.to_rgb8();
        let dimensions = rgb_img.dimensions();

        let img_source = ImageSource::from_bytes(rgb_img.as_raw(), dimensions)
            .map_err(|e| self.failure(format!("Failed to create image source: {}", e)))?;

        let ocr_input = self
            .engine
            .prepare_input(img_source)
            .map_err(|e| self.failure(format!("Failed to prepare input: {}", e)))?;

        let word_rects = self
            .engine
            .detect_words(&ocr_input)
            .map_err(|e| self.failure(format!("Failed to detect words: {}", e)))?;

        let line_rects = self.engine.find_text_lines(&ocr_input, &word_rects);

        let line_texts = self
            .engine
            .recognize_text(&ocr_input, &line_rects)
            .map_err(|e| self.failure(format!("Failed to recognize text: {}", e)))?;

        let mut boxes = Vec::new();
        for line in line_texts.iter().flatten() {
            match self.profile.detection_mode {
                DetectionMode::Standard => {
                    let text = line
                        .words()
                        .map(|word| word.to_string())
                        .collect::<Vec<_>>()
                        .join(" ");
                    push_box(&mut boxes, text, item_rect(line));
                }
                DetectionMode::FineGrained => {
                    for word in line.words() {
                        push_box(&mut boxes, word.to_string(), item_rect(&word));
                    }
                }
                DetectionMode::NumericAggressive => {
                    for word in line.words() {
                        let text = word.to_string();
                        if looks_numeric(&text) {
                            push_box(&mut boxes, text, item_rect(&word));
                        }
                    }
                }
            }
        }

        tracing::debug!("{} produced {} boxes", self.profile.id, boxes.len());
        Ok(boxes)
    }
}

impl OcrsEngine {
    fn failure(&self, reason: String) -> ExtractError {
        ExtractError::EngineUnavailable {
            engine: self.profile.id.clone(),
            variant: String::new(),
            reason,
        }
    }
}

fn push_box(boxes: &mut Vec<TextBox>, text: String, bbox: Rect) {
    let text = text.trim().to_string();
    if text.is_empty() {
        return;
    }
    let score = calculate_confidence(&text);
    boxes.push(TextBox { text, bbox, score });
}

fn item_rect(item: &impl TextItem) -> Rect {
    let rect = item.bounding_rect();
    Rect::new(
        rect.left() as f32,
        rect.top() as f32,
        rect.right() as f32,
        rect.bottom() as f32,
    )
}

/// Tokens worth keeping in numeric-aggressive mode
fn looks_numeric(text: &str) -> bool {
    text.chars()
        .any(|c| c.is_ascii_digit() || c == '%' || matches!(c, '$' | '¥' | '€' | '£' | '₩' | '₹'))
}

fn load_engine() -> Result<OcrsOcrEngine, ExtractError> {
    tracing::info!("Loading ocrs models...");

    let detection_model_path = ensure_model_downloaded(DETECTION_MODEL_URL, "text-detection.rten")?;
    let recognition_model_path =
        ensure_model_downloaded(RECOGNITION_MODEL_URL, "text-recognition.rten")?;

    let detection_model = Model::load_file(&detection_model_path).map_err(|e| {
        ExtractError::InitializationError(format!("Failed to load detection model: {}", e))
    })?;
    let recognition_model = Model::load_file(&recognition_model_path).map_err(|e| {
        ExtractError::InitializationError(format!("Failed to load recognition model: {}", e))
    })?;

    let engine = OcrsOcrEngine::new(OcrEngineParams {
        detection_model: Some(detection_model),
        recognition_model: Some(recognition_model),
        decode_method: DecodeMethod::Greedy,
        ..Default::default()
    })
    .map_err(|e| ExtractError::InitializationError(format!("Failed to create OCR engine: {}", e)))?;

    tracing::info!("ocrs models loaded");
    Ok(engine)
}

/// Ensure model is downloaded and return its path
fn ensure_model_downloaded(url: &str, filename: &str) -> Result<PathBuf, ExtractError> {
    let cache_dir = super::model_cache_dir();
    std::fs::create_dir_all(&cache_dir).map_err(|e| {
        ExtractError::InitializationError(format!("Failed to create cache directory: {}", e))
    })?;

    let model_path = cache_dir.join(filename);
    if !model_path.exists() {
        tracing::info!("Downloading {} (this may take a moment)...", filename);
        super::download_file(url, &model_path)?;
        tracing::info!("Downloaded {} to {:?}", filename, model_path);
    } else {
        tracing::info!("Using cached model from {:?}", model_path);
    }

    Ok(model_path)
}

// ============================================================================
// Detection scoring heuristics
// ============================================================================

/// Score one recognized box from text quality heuristics.
///
/// ocrs doesn't provide per-character confidence, so the recognized text is
/// inspected for patterns that indicate a clean read. Digits count as content
/// alongside letters since campaign pages are mostly figures.
fn calculate_confidence(text: &str) -> f32 {
    if text.is_empty() {
        return 0.0;
    }
    if text.chars().count() < 3 {
        return 0.5;
    }

    let char_score = analyze_char_frequency(text);
    let word_score = analyze_word_lengths(text);
    let repetition_score = detect_repetition(text);

    (0.5 * char_score + 0.3 * word_score + 0.2 * repetition_score).clamp(0.0, 1.0)
}

/// Penalizes text with many symbol/control characters or too little content
fn analyze_char_frequency(text: &str) -> f32 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }

    let content = text.chars().filter(|c| c.is_alphanumeric()).count();
    let special = text
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace() && !c.is_ascii_punctuation())
        .filter(|c| !matches!(c, '¥' | '€' | '£' | '₩' | '₹'))
        .count();

    let special_ratio = special as f32 / total as f32;
    let special_penalty = 1.0 - (special_ratio * 10.0).min(1.0);

    let content_ratio = content as f32 / total as f32;
    let content_score = (content_ratio * 1.5).min(1.0);

    special_penalty * 0.6 + content_score * 0.4
}

/// Garbled OCR often produces single-character "words" or very long sequences
fn analyze_word_lengths(text: &str) -> f32 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0.5;
    }

    let total_len: usize = words.iter().map(|w| w.chars().count()).sum();
    let avg_len = total_len as f32 / words.len() as f32;

    let avg_score = match avg_len as usize {
        0..=1 => 0.3,
        2..=3 => 0.7,
        4..=10 => 1.0,
        11..=14 => 0.8,
        _ => 0.4,
    };

    let single_count = words.iter().filter(|w| w.chars().count() == 1).count();
    let single_ratio = single_count as f32 / words.len() as f32;
    let single_penalty = 1.0 - (single_ratio * 1.5).min(0.5);

    avg_score * single_penalty
}

/// Patterns like "aaaa" or "####" often indicate OCR confusion; runs of
/// zeros are normal in amounts and are not penalized
fn detect_repetition(text: &str) -> f32 {
    let mut max_repeat = 1;
    let mut current = 1;
    let mut prev: Option<char> = None;

    for c in text.chars() {
        if Some(c) == prev && !c.is_whitespace() && c != '0' {
            current += 1;
            max_repeat = max_repeat.max(current);
        } else {
            current = 1;
        }
        prev = Some(c);
    }

    match max_repeat {
        1..=3 => 1.0,
        4..=5 => 0.8,
        6..=10 => 0.5,
        _ => 0.2,
    }
}
