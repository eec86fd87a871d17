use crate::error::ExtractError;
use image::{DynamicImage, GrayImage, Luma};

/// Fraction of pixels ignored at each end of the histogram, so a few specks
/// of pure black/white from UI chrome don't pin the stretch range.
const CLIP_FRACTION: f32 = 0.01;

/// Stretch grayscale contrast so the clipped histogram spans 0-255
pub fn apply(image: DynamicImage) -> Result<DynamicImage, ExtractError> {
    let gray = image.to_luma8();
    let (low, high) = clipped_range(&gray, CLIP_FRACTION);

    if high <= low {
        return Ok(DynamicImage::ImageLuma8(gray));
    }

    let range = (high - low) as f32;
    let stretched = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let pixel = gray.get_pixel(x, y).0[0].clamp(low, high);
        Luma([((pixel - low) as f32 / range * 255.0).round() as u8])
    });

    Ok(DynamicImage::ImageLuma8(stretched))
}

fn clipped_range(img: &GrayImage, clip: f32) -> (u8, u8) {
    let mut histogram = [0u64; 256];
    for pixel in img.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    let cut = (total as f32 * clip) as u64;

    let mut seen = 0u64;
    let mut low = 0u8;
    for (value, count) in histogram.iter().enumerate() {
        seen += count;
        if seen > cut {
            low = value as u8;
            break;
        }
    }

    seen = 0;
    let mut high = 255u8;
    for (value, count) in histogram.iter().enumerate().rev() {
        seen += count;
        if seen > cut {
            high = value as u8;
            break;
        }
    }

    (low, high)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_stretches_histogram() {
        let img = GrayImage::from_fn(10, 10, |x, _| Luma([50 + (x as u8 * 15).min(150)]));

        let result = apply(DynamicImage::ImageLuma8(img)).unwrap().to_luma8();
        let (min, max) = clipped_range(&result, 0.0);

        assert_eq!(min, 0);
        assert_eq!(max, 255);
    }

    #[test]
    fn test_normalize_handles_uniform_image() {
        let img = GrayImage::from_pixel(10, 10, Luma([128]));
        let result = apply(DynamicImage::ImageLuma8(img)).unwrap().to_luma8();
        assert_eq!(result.get_pixel(0, 0).0[0], 128);
    }

    #[test]
    fn test_outlier_speck_does_not_pin_range() {
        let mut img = GrayImage::from_fn(20, 20, |x, _| Luma([100 + x as u8]));
        img.put_pixel(0, 0, Luma([0]));
        let result = apply(DynamicImage::ImageLuma8(img)).unwrap().to_luma8();
        // the brightest band is stretched to full white despite the black speck
        assert_eq!(result.get_pixel(19, 10).0[0], 255);
    }
}
