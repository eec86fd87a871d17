use crate::error::ExtractError;
use image::{DynamicImage, GrayImage, Luma, RgbImage};

/// Scale every channel away from the mean luminance by `factor`.
/// `factor` 1.0 is the identity, values above 1.0 increase contrast.
pub fn enhance(image: &DynamicImage, factor: f32) -> Result<DynamicImage, ExtractError> {
    if !factor.is_finite() || factor < 0.0 {
        return Err(ExtractError::PreprocessingError(format!(
            "invalid contrast factor {}",
            factor
        )));
    }

    let mean = mean_luminance(&image.to_luma8());
    let mut rgb: RgbImage = image.to_rgb8();
    for pixel in rgb.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = blend(*channel, mean, factor);
        }
    }
    Ok(DynamicImage::ImageRgb8(rgb))
}

/// Grayscale conversion followed by a contrast boost
pub fn grayscale_boost(image: &DynamicImage, factor: f32) -> Result<DynamicImage, ExtractError> {
    let gray = image.to_luma8();
    let mean = mean_luminance(&gray);
    let boosted = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([blend(gray.get_pixel(x, y).0[0], mean, factor)])
    });
    Ok(DynamicImage::ImageLuma8(boosted))
}

fn blend(value: u8, mean: f32, factor: f32) -> u8 {
    (mean + (value as f32 - mean) * factor).round().clamp(0.0, 255.0) as u8
}

fn mean_luminance(gray: &GrayImage) -> f32 {
    let count = (gray.width() as u64 * gray.height() as u64).max(1);
    let sum: u64 = gray.pixels().map(|p| p.0[0] as u64).sum();
    sum as f32 / count as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enhance_spreads_values_around_mean() {
        let img = GrayImage::from_fn(10, 1, |x, _| Luma([if x < 5 { 100 } else { 150 }]));
        let result = enhance(&DynamicImage::ImageLuma8(img), 2.0).unwrap().to_luma8();

        let dark = result.get_pixel(0, 0).0[0];
        let light = result.get_pixel(9, 0).0[0];
        assert!(light - dark > 50, "expected wider spread, got {} vs {}", dark, light);
    }

    #[test]
    fn test_identity_factor_keeps_pixels() {
        let img = GrayImage::from_fn(4, 4, |x, y| Luma([(x * 40 + y * 10) as u8]));
        let result = grayscale_boost(&DynamicImage::ImageLuma8(img.clone()), 1.0)
            .unwrap()
            .to_luma8();
        assert_eq!(result, img);
    }

    #[test]
    fn test_rejects_negative_factor() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(2, 2));
        assert!(enhance(&img, -1.0).is_err());
    }
}
