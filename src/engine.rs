use crate::error::ExtractError;
use crate::geometry::Rect;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Writing systems an engine can be configured to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Script {
    Latin,
    Japanese,
    ChineseSimplified,
    ChineseTraditional,
    Korean,
}

/// Parses CLI/config values ("en", "ja", "ko", "ch_sim", "ch_tra", ...)
impl FromStr for Script {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "latin" | "en" | "eng" => Ok(Self::Latin),
            "japanese" | "ja" | "jpn" => Ok(Self::Japanese),
            "chinese_simplified" | "ch_sim" | "chi_sim" | "zh" => Ok(Self::ChineseSimplified),
            "chinese_traditional" | "ch_tra" | "chi_tra" => Ok(Self::ChineseTraditional),
            "korean" | "ko" | "kor" => Ok(Self::Korean),
            _ => Err(format!("unknown script '{}'", s)),
        }
    }
}

impl Script {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Latin => "latin",
            Self::Japanese => "japanese",
            Self::ChineseSimplified => "chinese_simplified",
            Self::ChineseTraditional => "chinese_traditional",
            Self::Korean => "korean",
        }
    }

    /// Guess the dominant non-Latin script of a piece of text.
    ///
    /// Kana wins over Han because Japanese text mixes both; Han alone is
    /// reported as simplified Chinese. Returns `Latin` for text with ASCII
    /// letters only and `None` when no letters are present at all.
    pub fn detect(text: &str) -> Option<Self> {
        let mut han = false;
        let mut latin = false;
        for c in text.chars() {
            match c {
                '\u{3040}'..='\u{30ff}' => return Some(Self::Japanese),
                '\u{ac00}'..='\u{d7af}' | '\u{1100}'..='\u{11ff}' => return Some(Self::Korean),
                '\u{4e00}'..='\u{9fff}' => han = true,
                c if c.is_ascii_alphabetic() => latin = true,
                _ => {}
            }
        }
        if han {
            Some(Self::ChineseSimplified)
        } else if latin {
            Some(Self::Latin)
        } else {
            None
        }
    }
}

/// How aggressively an engine segments the image
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMode {
    /// Line-level detections
    #[default]
    Standard,
    /// Word-level detections
    FineGrained,
    /// Word-level detections tuned for small numerals and currency symbols
    NumericAggressive,
}

impl FromStr for DetectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "standard" => Ok(Self::Standard),
            "fine-grained" | "fine" => Ok(Self::FineGrained),
            "numeric-aggressive" | "numeric" => Ok(Self::NumericAggressive),
            _ => Err(format!("unknown detection mode '{}'", s)),
        }
    }
}

impl DetectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::FineGrained => "fine-grained",
            Self::NumericAggressive => "numeric-aggressive",
        }
    }
}

/// Static description of one engine instance in the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineProfile {
    pub id: String,
    pub supported_scripts: BTreeSet<Script>,
    pub detection_mode: DetectionMode,
}

impl EngineProfile {
    pub fn new(
        id: impl Into<String>,
        scripts: impl IntoIterator<Item = Script>,
        detection_mode: DetectionMode,
    ) -> Self {
        Self {
            id: id.into(),
            supported_scripts: scripts.into_iter().collect(),
            detection_mode,
        }
    }

    /// Whether the engine should be tried for the given script hint.
    ///
    /// Script is rarely known up front, so `None` accepts every engine.
    pub fn accepts(&self, hint: Option<Script>) -> bool {
        match hint {
            None => true,
            Some(script) => self.supported_scripts.contains(&script),
        }
    }
}

/// One text region reported by an engine
#[derive(Debug, Clone, PartialEq)]
pub struct TextBox {
    pub text: String,
    pub bbox: Rect,
    pub score: f32,
}

/// Capability every OCR backend in the pool provides
pub trait RecognitionEngine: Send + Sync {
    /// Static configuration of this instance
    fn profile(&self) -> &EngineProfile;

    /// Returns a human-readable description of the engine
    fn description(&self) -> &'static str {
        ""
    }

    /// Detect text regions in an image. Boxes are in the image's own pixel frame.
    fn detect(&self, image: &DynamicImage) -> Result<Vec<TextBox>, ExtractError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_script() {
        assert_eq!(Script::detect("Save The Ocean"), Some(Script::Latin));
        assert_eq!(Script::detect("支援総額 ¥1,200"), Some(Script::ChineseSimplified));
        assert_eq!(Script::detect("目標金額を達成しました"), Some(Script::Japanese));
        assert_eq!(Script::detect("후원자 120명"), Some(Script::Korean));
        assert_eq!(Script::detect("$265,400"), None);
    }

    #[test]
    fn test_profile_accepts_unknown_script() {
        let profile = EngineProfile::new("eng", [Script::Latin], DetectionMode::Standard);
        assert!(profile.accepts(None));
        assert!(profile.accepts(Some(Script::Latin)));
        assert!(!profile.accepts(Some(Script::Korean)));
    }

    #[test]
    fn test_script_parses_language_codes() {
        assert_eq!("ch_tra".parse(), Ok(Script::ChineseTraditional));
        assert_eq!("JA".parse(), Ok(Script::Japanese));
        assert!("multi".parse::<Script>().is_err());
        assert_eq!("fine_grained".parse(), Ok(DetectionMode::FineGrained));
    }
}
