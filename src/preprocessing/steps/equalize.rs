use crate::error::ExtractError;
use image::DynamicImage;
use imageproc::contrast::equalize_histogram;

/// Global histogram equalization. Pulls thin currency glyphs (¥, ₩) out of
/// low-contrast banners where a linear stretch leaves them washed out.
pub fn apply(image: DynamicImage) -> Result<DynamicImage, ExtractError> {
    let gray = image.to_luma8();
    Ok(DynamicImage::ImageLuma8(equalize_histogram(&gray)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_equalize_widens_narrow_histogram() {
        let img = GrayImage::from_fn(16, 16, |x, _| Luma([120 + (x as u8 % 8)]));
        let result = apply(DynamicImage::ImageLuma8(img)).unwrap().to_luma8();

        let min = result.pixels().map(|p| p.0[0]).min().unwrap();
        let max = result.pixels().map(|p| p.0[0]).max().unwrap();
        assert!(max - min > 100, "expected a wide range, got {}..{}", min, max);
    }
}
