use crate::error::ExtractError;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use super::steps;
use super::steps::threshold::Polarity;

/// Contrast factor for the colour contrast-enhanced rendition
const CONTRAST_FACTOR: f32 = 1.8;
/// Contrast factor for the grayscale high-contrast rendition
const GRAY_CONTRAST_FACTOR: f32 = 2.5;
const SHARPEN_STRENGTH: f32 = 1.0;
const DENOISE_RADIUS: u32 = 1;
/// Below this edge length filters have no meaningful neighbourhood
const MIN_TRANSFORM_DIMENSION: u32 = 3;

/// Kinds of preprocessing renditions, declared in generation order.
///
/// The order doubles as a merge tie-break: earlier variants win otherwise
/// equal comparisons.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum VariantKind {
    /// The decoded image, untouched
    #[default]
    Original,
    /// Colour contrast stretch around mean luminance
    Contrast,
    /// Grayscale plus Laplacian sharpening
    Sharpened,
    /// Grayscale, strong contrast boost, histogram stretch
    GrayContrast,
    /// Median denoise then Sauvola binarization
    Binarized,
    /// Sauvola binarization of the inverted image (light text on dark)
    Inverted,
    /// Global histogram equalization
    Equalized,
}

/// Parses CLI/config values
impl FromStr for VariantKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "original" | "identity" => Ok(Self::Original),
            "contrast" => Ok(Self::Contrast),
            "sharpened" | "sharpen" => Ok(Self::Sharpened),
            "gray-contrast" | "grayscale" => Ok(Self::GrayContrast),
            "binarized" | "threshold" => Ok(Self::Binarized),
            "inverted" => Ok(Self::Inverted),
            "equalized" => Ok(Self::Equalized),
            _ => Err(format!("unknown variant '{}'", s)),
        }
    }
}

impl VariantKind {
    pub const ALL: [VariantKind; 7] = [
        VariantKind::Original,
        VariantKind::Contrast,
        VariantKind::Sharpened,
        VariantKind::GrayContrast,
        VariantKind::Binarized,
        VariantKind::Inverted,
        VariantKind::Equalized,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Contrast => "contrast",
            Self::Sharpened => "sharpened",
            Self::GrayContrast => "gray-contrast",
            Self::Binarized => "binarized",
            Self::Inverted => "inverted",
            Self::Equalized => "equalized",
        }
    }

    fn transform(&self, image: &DynamicImage) -> Result<DynamicImage, ExtractError> {
        match self {
            Self::Original => Ok(image.clone()),
            Self::Contrast => steps::contrast::enhance(image, CONTRAST_FACTOR),
            Self::Sharpened => steps::sharpen::apply(image.clone(), SHARPEN_STRENGTH),
            Self::GrayContrast => {
                let boosted = steps::contrast::grayscale_boost(image, GRAY_CONTRAST_FACTOR)?;
                steps::normalize::apply(boosted)
            }
            Self::Binarized => {
                let denoised = steps::denoise::apply(image.clone(), DENOISE_RADIUS)?;
                steps::threshold::apply(denoised, Polarity::DarkText)
            }
            Self::Inverted => steps::threshold::apply(image.clone(), Polarity::LightText),
            Self::Equalized => steps::equalize::apply(image.clone()),
        }
    }
}

/// One rendition of the input image
#[derive(Debug, Clone)]
pub struct PreprocessingVariant {
    pub kind: VariantKind,
    pub image: Arc<DynamicImage>,
    pub time_ms: u64,
}

impl PreprocessingVariant {
    pub fn id(&self) -> &'static str {
        self.kind.as_str()
    }
}

/// Output of the generator: the usable renditions plus why any were dropped
#[derive(Debug, Clone)]
pub struct VariantSet {
    pub variants: Vec<PreprocessingVariant>,
    pub skipped: Vec<ExtractError>,
}

/// Produces the ordered variant set for an image
#[derive(Debug, Clone)]
pub struct VariantGenerator {
    kinds: Vec<VariantKind>,
}

impl Default for VariantGenerator {
    fn default() -> Self {
        Self {
            kinds: VariantKind::ALL.to_vec(),
        }
    }
}

impl VariantGenerator {
    /// Restrict generation to `enabled` kinds. The identity rendition is
    /// always included, and output follows generation order regardless of
    /// the order given.
    pub fn new(enabled: Option<&[VariantKind]>) -> Self {
        let mut kinds = match enabled {
            Some(list) => list.to_vec(),
            None => VariantKind::ALL.to_vec(),
        };
        kinds.push(VariantKind::Original);
        kinds.sort();
        kinds.dedup();
        Self { kinds }
    }

    pub fn kinds(&self) -> &[VariantKind] {
        &self.kinds
    }

    /// Build every enabled rendition. Transforms that fail are skipped and
    /// reported; the identity rendition is never skipped.
    pub fn generate(&self, image: &DynamicImage) -> VariantSet {
        let mut variants = Vec::with_capacity(self.kinds.len());
        let mut skipped = Vec::new();
        let degenerate = image.width() < MIN_TRANSFORM_DIMENSION
            || image.height() < MIN_TRANSFORM_DIMENSION;

        for &kind in &self.kinds {
            if kind != VariantKind::Original && degenerate {
                skipped.push(ExtractError::PreprocessingError(format!(
                    "variant '{}' skipped: image {}x{} too small to transform",
                    kind.as_str(),
                    image.width(),
                    image.height()
                )));
                continue;
            }

            let start = Instant::now();
            match kind.transform(image) {
                Ok(derived) => variants.push(PreprocessingVariant {
                    kind,
                    image: Arc::new(derived),
                    time_ms: start.elapsed().as_millis() as u64,
                }),
                Err(e) => {
                    tracing::warn!("Variant '{}' skipped: {}", kind.as_str(), e);
                    skipped.push(ExtractError::PreprocessingError(format!(
                        "variant '{}' skipped: {}",
                        kind.as_str(),
                        e
                    )));
                }
            }
        }

        tracing::debug!(
            "Generated {} variants ({} skipped)",
            variants.len(),
            skipped.len()
        );

        VariantSet { variants, skipped }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, RgbImage};

    fn sample_image() -> DynamicImage {
        let mut img = RgbImage::from_pixel(60, 30, image::Rgb([235, 235, 235]));
        for x in 10..50 {
            for y in 12..16 {
                img.put_pixel(x, y, image::Rgb([30, 30, 30]));
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_generates_all_variants_in_order() {
        let set = VariantGenerator::default().generate(&sample_image());
        let kinds: Vec<VariantKind> = set.variants.iter().map(|v| v.kind).collect();
        assert_eq!(kinds, VariantKind::ALL.to_vec());
        assert!(set.skipped.is_empty());
    }

    #[test]
    fn test_variants_keep_source_dimensions() {
        let set = VariantGenerator::default().generate(&sample_image());
        for variant in &set.variants {
            assert_eq!(variant.image.width(), 60, "{}", variant.id());
            assert_eq!(variant.image.height(), 30, "{}", variant.id());
        }
    }

    #[test]
    fn test_identity_always_present() {
        let generator = VariantGenerator::new(Some(&[VariantKind::Binarized]));
        assert_eq!(
            generator.kinds(),
            &[VariantKind::Original, VariantKind::Binarized]
        );
    }

    #[test]
    fn test_degenerate_image_keeps_only_identity() {
        let tiny = DynamicImage::ImageLuma8(GrayImage::from_pixel(1, 1, Luma([0])));
        let set = VariantGenerator::default().generate(&tiny);
        assert_eq!(set.variants.len(), 1);
        assert_eq!(set.variants[0].kind, VariantKind::Original);
        assert_eq!(set.skipped.len(), VariantKind::ALL.len() - 1);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let image = sample_image();
        let a = VariantGenerator::default().generate(&image);
        let b = VariantGenerator::default().generate(&image);
        for (x, y) in a.variants.iter().zip(b.variants.iter()) {
            assert_eq!(x.image.as_bytes(), y.image.as_bytes());
        }
    }

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in VariantKind::ALL {
            assert_eq!(kind.as_str().parse(), Ok(kind));
        }
    }
}
