use crate::error::ExtractError;
use image::{DynamicImage, GrayImage, Luma};

/// Sauvola threshold parameters
const WINDOW_SIZE: u32 = 15;
const K: f32 = 0.2;
const R: f32 = 128.0; // Dynamic range / 2

/// Which side of the local threshold holds the text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Dark text on a light background
    DarkText,
    /// Light text on a dark background; the image is inverted first so the
    /// output is always black text on white
    LightText,
}

/// Apply Sauvola adaptive thresholding
pub fn apply(image: DynamicImage, polarity: Polarity) -> Result<DynamicImage, ExtractError> {
    let mut gray = image.to_luma8();
    if gray.width() == 0 || gray.height() == 0 {
        return Err(ExtractError::PreprocessingError(
            "cannot binarize an empty image".to_string(),
        ));
    }
    if polarity == Polarity::LightText {
        image::imageops::invert(&mut gray);
    }
    Ok(DynamicImage::ImageLuma8(sauvola_threshold(&gray, WINDOW_SIZE, K)))
}

/// For each pixel, threshold = mean * (1 + k * (std_dev / R - 1))
fn sauvola_threshold(img: &GrayImage, window_size: u32, k: f32) -> GrayImage {
    let (width, height) = img.dimensions();
    let half_window = window_size as i32 / 2;
    let integral = IntegralImages::new(img);

    GrayImage::from_fn(width, height, |x, y| {
        let x1 = (x as i32 - half_window).max(0) as usize;
        let y1 = (y as i32 - half_window).max(0) as usize;
        let x2 = (x as i32 + half_window).min(width as i32 - 1) as usize + 1;
        let y2 = (y as i32 + half_window).min(height as i32 - 1) as usize + 1;

        let (mean, std_dev) = integral.window_stats(x1, y1, x2, y2);
        let threshold = mean * (1.0 + k * (std_dev / R - 1.0));

        if img.get_pixel(x, y).0[0] as f32 > threshold {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Summed-area tables of values and squared values, flattened row-major
struct IntegralImages {
    stride: usize,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl IntegralImages {
    fn new(img: &GrayImage) -> Self {
        let (width, height) = (img.width() as usize, img.height() as usize);
        let stride = width + 1;
        let mut sum = vec![0.0f64; stride * (height + 1)];
        let mut sum_sq = vec![0.0f64; stride * (height + 1)];

        for y in 0..height {
            for x in 0..width {
                let val = img.get_pixel(x as u32, y as u32).0[0] as f64;
                let at = (y + 1) * stride + x + 1;
                sum[at] = val + sum[at - stride] + sum[at - 1] - sum[at - stride - 1];
                sum_sq[at] =
                    val * val + sum_sq[at - stride] + sum_sq[at - 1] - sum_sq[at - stride - 1];
            }
        }

        Self {
            stride,
            sum,
            sum_sq,
        }
    }

    /// Mean and standard deviation over the half-open window [x1, x2) x [y1, y2)
    fn window_stats(&self, x1: usize, y1: usize, x2: usize, y2: usize) -> (f32, f32) {
        let area = ((x2 - x1) * (y2 - y1)) as f64;
        let rect = |table: &[f64]| {
            table[y2 * self.stride + x2] - table[y1 * self.stride + x2]
                - table[y2 * self.stride + x1]
                + table[y1 * self.stride + x1]
        };

        let mean = rect(&self.sum) / area;
        let variance = rect(&self.sum_sq) / area - mean * mean;
        (mean as f32, variance.max(0.0).sqrt() as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_binarizes_image() {
        let img = GrayImage::from_fn(50, 50, |x, _| Luma([(x as u8 * 5).min(255)]));
        let result = apply(DynamicImage::ImageLuma8(img), Polarity::DarkText)
            .unwrap()
            .to_luma8();

        for pixel in result.pixels() {
            assert!(pixel.0[0] == 0 || pixel.0[0] == 255);
        }
    }

    #[test]
    fn test_dark_text_on_light_background() {
        let mut img = GrayImage::from_pixel(50, 20, Luma([240]));
        for x in 10..40 {
            img.put_pixel(x, 10, Luma([20]));
        }

        let result = apply(DynamicImage::ImageLuma8(img), Polarity::DarkText)
            .unwrap()
            .to_luma8();

        assert_eq!(result.get_pixel(25, 10).0[0], 0);
        assert_eq!(result.get_pixel(25, 5).0[0], 255);
    }

    #[test]
    fn test_light_text_comes_out_black() {
        let mut img = GrayImage::from_pixel(50, 20, Luma([15]));
        for x in 10..40 {
            img.put_pixel(x, 10, Luma([235]));
        }

        let result = apply(DynamicImage::ImageLuma8(img), Polarity::LightText)
            .unwrap()
            .to_luma8();

        assert_eq!(result.get_pixel(25, 10).0[0], 0);
        assert_eq!(result.get_pixel(25, 5).0[0], 255);
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(0, 0));
        assert!(apply(img, Polarity::DarkText).is_err());
    }
}
