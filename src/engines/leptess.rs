//! Leptess/Tesseract engine implementation
//!
//! Tesseract-based OCR engine. Better for noisy/messy images like phone photos
//! and the only backend here that reads CJK scripts. Uses tesseract-static for
//! static linking (no system dependencies). Downloads tessdata (training data)
//! automatically on first use.
//!
//! Each configured language pairing ("eng+jpn", "eng+kor", ...) becomes its own
//! pool entry per detection mode.

use crate::config::Config;
use crate::engine::{DetectionMode, EngineProfile, RecognitionEngine, Script, TextBox};
use crate::error::ExtractError;
use crate::geometry::Rect;
use image::DynamicImage;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tesseract_static::tesseract::Tesseract;

/// Tesseract page segmentation mode for sparse text, set via variable
const SPARSE_TEXT_PSM: &str = "11";

/// Tesseract OCR Engine
pub struct LeptessEngine {
    /// Path to tessdata directory
    tessdata_path: String,
    /// Tesseract language string, e.g. "eng+jpn"
    language: String,
    profile: EngineProfile,
}

impl LeptessEngine {
    /// One engine per (language pairing, detection mode)
    pub fn from_config(config: &Config) -> Result<Vec<Self>, ExtractError> {
        let mut engines = Vec::new();
        for language in &config.tesseract_languages {
            let tessdata_path = ensure_tessdata_available(language, config.tessdata_path.as_deref())?;

            // Validate that tessdata is accessible by doing a test initialization
            let test_tess = Tesseract::new(Some(&tessdata_path), Some(language)).map_err(|e| {
                ExtractError::InitializationError(format!(
                    "Failed to initialize Tesseract for '{}': {}",
                    language, e
                ))
            })?;
            drop(test_tess);

            for &mode in &config.detection_modes {
                engines.push(Self::new(tessdata_path.clone(), language.clone(), mode));
            }
            tracing::info!(
                "Leptess engine initialized (tessdata: {}, language: {})",
                tessdata_path,
                language
            );
        }
        Ok(engines)
    }

    pub fn new(tessdata_path: String, language: String, mode: DetectionMode) -> Self {
        let scripts = scripts_for(&language);
        let id = format!("tesseract-{}-{}", language, mode.as_str());
        Self {
            tessdata_path,
            language,
            profile: EngineProfile::new(id, scripts, mode),
        }
    }

    fn failure(&self, reason: String) -> ExtractError {
        ExtractError::EngineUnavailable {
            engine: self.profile.id.clone(),
            variant: String::new(),
            reason,
        }
    }
}

impl RecognitionEngine for LeptessEngine {
    fn profile(&self) -> &EngineProfile {
        &self.profile
    }

    fn description(&self) -> &'static str {
        "Tesseract OCR engine - better for noisy/messy images like phone photos"
    }

    fn detect(&self, image: &DynamicImage) -> Result<Vec<TextBox>, ExtractError> {
        let rgb_img = image.to_rgb8();

        // Convert to BMP in memory (BMP is always supported by leptonica)
        let mut bmp_data = Vec::new();
        rgb_img
            .write_to(&mut std::io::Cursor::new(&mut bmp_data), image::ImageFormat::Bmp)
            .map_err(|e| self.failure(format!("Failed to convert to BMP: {}", e)))?;

        let mut tess = Tesseract::new(Some(&self.tessdata_path), Some(&self.language))
            .map_err(|e| self.failure(format!("Failed to create Tesseract: {}", e)))?;

        if self.profile.detection_mode == DetectionMode::NumericAggressive {
            tess = tess
                .set_variable("tessedit_pageseg_mode", SPARSE_TEXT_PSM)
                .map_err(|e| self.failure(format!("Failed to set segmentation mode: {}", e)))?;
        }

        tess = tess
            .set_image_from_mem(&bmp_data)
            .map_err(|e| self.failure(format!("Failed to set image: {}", e)))?;

        tess = tess
            .recognize()
            .map_err(|e| self.failure(format!("Failed to recognize text: {}", e)))?;

        let tsv = tess
            .get_tsv_text(0)
            .map_err(|e| self.failure(format!("Failed to get TSV output: {}", e)))?;

        let words = parse_tsv(&tsv);
        let boxes = match self.profile.detection_mode {
            DetectionMode::Standard => group_lines(&words),
            DetectionMode::FineGrained | DetectionMode::NumericAggressive => {
                words.into_iter().map(TsvWord::into_box).collect()
            }
        };

        tracing::debug!("{} produced {} boxes", self.profile.id, boxes.len());
        Ok(boxes)
    }
}

/// Scripts readable with a Tesseract language string
fn scripts_for(language: &str) -> Vec<Script> {
    language
        .split('+')
        .filter_map(|lang| match lang {
            "eng" | "deu" | "fra" | "spa" | "ita" | "por" | "nld" => Some(Script::Latin),
            "jpn" => Some(Script::Japanese),
            "kor" => Some(Script::Korean),
            "chi_sim" => Some(Script::ChineseSimplified),
            "chi_tra" => Some(Script::ChineseTraditional),
            _ => None,
        })
        .collect()
}

/// One word row of Tesseract TSV output
#[derive(Debug, Clone, PartialEq)]
struct TsvWord {
    line_key: (u32, u32, u32, u32),
    bbox: Rect,
    confidence: f32,
    text: String,
}

impl TsvWord {
    fn into_box(self) -> TextBox {
        TextBox {
            text: self.text,
            bbox: self.bbox,
            score: self.confidence,
        }
    }
}

/// Parse word-level (level 5) rows. Columns: level, page, block, par, line,
/// word, left, top, width, height, conf, text.
fn parse_tsv(tsv: &str) -> Vec<TsvWord> {
    tsv.lines()
        .filter_map(|row| {
            let cols: Vec<&str> = row.split('\t').collect();
            if cols.len() < 12 || cols[0] != "5" {
                return None;
            }
            let num = |i: usize| cols[i].trim().parse::<f32>().ok();
            let text = cols[11].trim();
            let confidence = num(10)?;
            if text.is_empty() || confidence < 0.0 {
                return None;
            }
            Some(TsvWord {
                line_key: (
                    num(1)? as u32,
                    num(2)? as u32,
                    num(3)? as u32,
                    num(4)? as u32,
                ),
                bbox: Rect::from_xywh(num(6)?, num(7)?, num(8)?, num(9)?),
                confidence: (confidence / 100.0).clamp(0.0, 1.0),
                text: text.to_string(),
            })
        })
        .collect()
}

/// Join words sharing a (page, block, paragraph, line) key into line boxes
fn group_lines(words: &[TsvWord]) -> Vec<TextBox> {
    let mut lines: BTreeMap<(u32, u32, u32, u32), Vec<&TsvWord>> = BTreeMap::new();
    for word in words {
        lines.entry(word.line_key).or_default().push(word);
    }

    lines
        .into_values()
        .map(|line| {
            let text = line
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            let bbox = line
                .iter()
                .skip(1)
                .fold(line[0].bbox, |acc, w| acc.union(&w.bbox));
            let score = line.iter().map(|w| w.confidence).sum::<f32>() / line.len() as f32;
            TextBox { text, bbox, score }
        })
        .collect()
}

// ============================================================================
// Tessdata download helpers
// ============================================================================

/// Ensure every language in a pairing is available, downloading if needed.
/// Returns the tessdata directory.
fn ensure_tessdata_available(
    language: &str,
    configured_path: Option<&str>,
) -> Result<String, ExtractError> {
    let cache_dir = match configured_path {
        Some(path) => PathBuf::from(path),
        None => super::model_cache_dir().join("tessdata"),
    };

    std::fs::create_dir_all(&cache_dir).map_err(|e| {
        ExtractError::InitializationError(format!("Failed to create tessdata directory: {}", e))
    })?;

    for lang in language.split('+') {
        let traineddata_path = cache_dir.join(format!("{}.traineddata", lang));
        if !traineddata_path.exists() {
            tracing::info!("Downloading tessdata for '{}' (this may take a moment)...", lang);
            super::download_file(&tessdata_url(lang), &traineddata_path)?;
            tracing::info!("Downloaded tessdata to {:?}", traineddata_path);
        }
    }

    // Tesseract expects the directory, not the file
    cache_dir
        .to_str()
        .map(|s| s.to_string())
        .ok_or_else(|| ExtractError::InitializationError("Invalid tessdata path".to_string()))
}

/// Use tessdata_fast for smaller, faster downloads
fn tessdata_url(language: &str) -> String {
    format!(
        "https://github.com/tesseract-ocr/tessdata_fast/raw/main/{}.traineddata",
        language
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t800\t600\t-1\t
4\t1\t1\t1\t1\t0\t40\t30\t300\t24\t-1\t
5\t1\t1\t1\t1\t1\t40\t30\t60\t24\t96.5\tSave
5\t1\t1\t1\t1\t2\t110\t30\t60\t24\t91.0\tThe
5\t1\t1\t1\t1\t3\t180\t30\t160\t24\t88.0\tOcean
5\t1\t1\t1\t2\t1\t40\t80\t120\t30\t85.0\t$265,400
5\t1\t1\t1\t2\t2\t170\t80\t60\t30\t-1\t ";

    #[test]
    fn test_parse_tsv_keeps_recognized_words() {
        let words = parse_tsv(SAMPLE_TSV);
        assert_eq!(words.len(), 4);
        assert_eq!(words[3].text, "$265,400");
        assert_eq!(words[3].bbox, Rect::new(40.0, 80.0, 160.0, 110.0));
        assert!((words[0].confidence - 0.965).abs() < 1e-6);
    }

    #[test]
    fn test_group_lines_joins_words() {
        let lines = group_lines(&parse_tsv(SAMPLE_TSV));
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Save The Ocean");
        assert_eq!(lines[0].bbox, Rect::new(40.0, 30.0, 340.0, 54.0));
    }

    #[test]
    fn test_scripts_for_pairing() {
        assert_eq!(scripts_for("eng+jpn"), vec![Script::Latin, Script::Japanese]);
        assert_eq!(scripts_for("chi_tra"), vec![Script::ChineseTraditional]);
    }
}
