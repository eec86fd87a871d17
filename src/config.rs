use crate::classify::Vocabulary;
use crate::engine::{DetectionMode, Script};
use crate::error::ExtractError;
use crate::preprocessing::VariantKind;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "campaign-ocr")]
#[command(about = "Extract crowdfunding campaign fields from a screenshot")]
#[command(version)]
pub struct Args {
    /// Image file to read (PNG, JPEG, WebP, ...)
    pub image: PathBuf,

    /// Engine ids to run (comma separated, default: all)
    #[arg(long, env = "CAMPAIGN_OCR_ENGINES", value_delimiter = ',')]
    pub engines: Option<Vec<String>>,

    /// Preprocessing variants to generate (comma separated, default: all)
    #[arg(long, env = "CAMPAIGN_OCR_VARIANTS", value_delimiter = ',', value_parser = str::parse::<VariantKind>)]
    pub variants: Option<Vec<VariantKind>>,

    /// Only run engines that read this script ("en", "ja", "ko", "ch_sim", "ch_tra")
    #[arg(long, env = "CAMPAIGN_OCR_SCRIPT", value_parser = str::parse::<Script>)]
    pub script: Option<Script>,

    /// Per engine call timeout in milliseconds
    #[arg(long, env = "CAMPAIGN_OCR_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// IoU above which detections are merged into one span
    #[arg(long, env = "CAMPAIGN_OCR_IOU")]
    pub iou: Option<f32>,

    /// Maximum concurrent engine calls (default: available cores)
    #[arg(long, env = "CAMPAIGN_OCR_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// TOML file with extraction options
    #[arg(long, env = "CAMPAIGN_OCR_OPTIONS")]
    pub options: Option<PathBuf>,

    /// TOML file overriding the keyword vocabulary
    #[arg(long, env = "CAMPAIGN_OCR_VOCABULARY")]
    pub vocabulary: Option<PathBuf>,

    /// LibreTranslate-compatible endpoint; translation is skipped if unset
    #[arg(long, env = "CAMPAIGN_OCR_TRANSLATE_URL")]
    pub translate_url: Option<String>,

    /// Language spans are translated into
    #[arg(long, env = "CAMPAIGN_OCR_TARGET_LANGUAGE")]
    pub target_language: Option<String>,

    /// Tesseract language pairings, one engine each
    #[arg(
        long,
        env = "CAMPAIGN_OCR_TESSERACT_LANGUAGES",
        value_delimiter = ',',
        default_value = "eng,eng+jpn,eng+kor,eng+chi_sim,eng+chi_tra"
    )]
    pub tesseract_languages: Vec<String>,

    /// Detection modes each backend is instantiated with
    #[arg(
        long,
        env = "CAMPAIGN_OCR_DETECTION_MODES",
        value_delimiter = ',',
        default_value = "standard",
        value_parser = str::parse::<DetectionMode>
    )]
    pub detection_modes: Vec<DetectionMode>,

    /// Path to tessdata directory (uses TESSDATA_PREFIX env var if not set)
    #[arg(long, env = "TESSDATA_PREFIX")]
    pub tessdata_path: Option<String>,

    /// Leave diagnostics out of the printed result
    #[arg(long)]
    pub no_diagnostics: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

/// Process configuration: engine pool setup plus per-run overrides
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub image: PathBuf,
    pub options_path: Option<PathBuf>,
    pub vocabulary_path: Option<PathBuf>,
    pub translate_url: Option<String>,
    pub tesseract_languages: Vec<String>,
    pub detection_modes: Vec<DetectionMode>,
    pub tessdata_path: Option<String>,
    pub engines: Option<Vec<String>>,
    pub variants: Option<Vec<VariantKind>>,
    pub script: Option<Script>,
    pub timeout_ms: Option<u64>,
    pub iou: Option<f32>,
    pub concurrency: Option<usize>,
    pub target_language: Option<String>,
    pub no_diagnostics: bool,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            image: args.image,
            options_path: args.options,
            vocabulary_path: args.vocabulary,
            translate_url: args.translate_url,
            tesseract_languages: args.tesseract_languages,
            detection_modes: args.detection_modes,
            tessdata_path: args.tessdata_path,
            engines: args.engines,
            variants: args.variants,
            script: args.script,
            timeout_ms: args.timeout_ms,
            iou: args.iou,
            concurrency: args.concurrency,
            target_language: args.target_language,
            no_diagnostics: args.no_diagnostics,
        }
    }
}

impl Config {
    /// Options file (if any) with command-line overrides applied
    pub fn extract_options(&self) -> Result<ExtractOptions, ExtractError> {
        let mut options = match &self.options_path {
            Some(path) => ExtractOptions::load(path)?,
            None => ExtractOptions::default(),
        };

        if let Some(engines) = &self.engines {
            options.enabled_engines = Some(engines.clone());
        }
        if let Some(variants) = &self.variants {
            options.enabled_variants = Some(variants.clone());
        }
        if self.script.is_some() {
            options.script_hint = self.script;
        }
        if let Some(ms) = self.timeout_ms {
            options.per_call_timeout_ms = ms;
        }
        if let Some(iou) = self.iou {
            options.merge_iou_threshold = iou;
        }
        if self.concurrency.is_some() {
            options.max_concurrency = self.concurrency;
        }
        if let Some(lang) = &self.target_language {
            options.target_language = lang.clone();
        }
        if self.no_diagnostics {
            options.return_diagnostics = false;
        }

        options.validate()?;
        Ok(options)
    }

    /// Built-in vocabulary, or the one loaded from `vocabulary_path`
    pub fn vocabulary(&self) -> Result<Vocabulary, ExtractError> {
        match &self.vocabulary_path {
            Some(path) => Vocabulary::load(path),
            None => Ok(Vocabulary::default()),
        }
    }
}

/// Knobs for one extraction. Every field has a default so partial TOML files
/// and `ExtractOptions::default()` both work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    /// Variants to generate; `None` means all. The identity variant is always added.
    pub enabled_variants: Option<Vec<VariantKind>>,
    /// Engine ids to run; `None` means the whole pool
    pub enabled_engines: Option<Vec<String>>,
    /// Restrict the pool to engines that read this script
    pub script_hint: Option<Script>,
    pub per_call_timeout_ms: u64,
    pub merge_iou_threshold: f32,
    /// Normalized Levenshtein similarity above which overlapping texts agree
    pub text_similarity_threshold: f32,
    /// Largest gap, in character widths, bridged when rejoining split amounts
    pub amount_join_gap_chars: f32,
    /// Concurrent engine calls; `None` uses the available cores
    pub max_concurrency: Option<usize>,
    pub target_language: String,
    pub return_diagnostics: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            enabled_variants: None,
            enabled_engines: None,
            script_hint: None,
            per_call_timeout_ms: 30_000,
            merge_iou_threshold: 0.5,
            text_similarity_threshold: 0.8,
            amount_join_gap_chars: 1.5,
            max_concurrency: None,
            target_language: "en".to_string(),
            return_diagnostics: true,
        }
    }
}

impl ExtractOptions {
    /// Load options from a TOML file
    pub fn load(path: &Path) -> Result<Self, ExtractError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExtractError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let options: Self = toml::from_str(&content).map_err(|e| {
            ExtractError::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        options.validate()?;
        Ok(options)
    }

    /// Reject values outside their meaningful range
    pub fn validate(&self) -> Result<(), ExtractError> {
        let unit = |name: &str, v: f32| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ExtractError::ConfigError(format!(
                    "{} must be within 0..=1, got {}",
                    name, v
                )))
            }
        };
        unit("merge_iou_threshold", self.merge_iou_threshold)?;
        unit("text_similarity_threshold", self.text_similarity_threshold)?;

        if self.per_call_timeout_ms == 0 {
            return Err(ExtractError::ConfigError(
                "per_call_timeout_ms must be positive".to_string(),
            ));
        }
        if !(self.amount_join_gap_chars >= 0.0) {
            return Err(ExtractError::ConfigError(format!(
                "amount_join_gap_chars must not be negative, got {}",
                self.amount_join_gap_chars
            )));
        }
        if self.max_concurrency == Some(0) {
            return Err(ExtractError::ConfigError(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Copy with out-of-range values pulled back into range
    pub fn clamped(&self) -> Self {
        let defaults = Self::default();
        let unit = |v: f32, fallback: f32| if v.is_nan() { fallback } else { v.clamp(0.0, 1.0) };
        Self {
            merge_iou_threshold: unit(self.merge_iou_threshold, defaults.merge_iou_threshold),
            text_similarity_threshold: unit(
                self.text_similarity_threshold,
                defaults.text_similarity_threshold,
            ),
            amount_join_gap_chars: if self.amount_join_gap_chars >= 0.0 {
                self.amount_join_gap_chars
            } else {
                0.0
            },
            per_call_timeout_ms: self.per_call_timeout_ms.max(1),
            max_concurrency: self.max_concurrency.map(|n| n.max(1)),
            ..self.clone()
        }
    }

    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_millis(self.per_call_timeout_ms)
    }

    /// Worker pool size for engine calls
    pub fn concurrency(&self) -> usize {
        self.max_concurrency.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }
}
