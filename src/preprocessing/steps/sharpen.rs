use crate::error::ExtractError;
use image::DynamicImage;
use imageproc::filter::filter3x3;

/// Laplacian sharpening on the luminance channel.
///
/// `strength` scales the edge term: the kernel centre is `1 + 4 * strength`
/// with `-strength` on the four direct neighbours.
pub fn apply(image: DynamicImage, strength: f32) -> Result<DynamicImage, ExtractError> {
    if !(0.0..=4.0).contains(&strength) {
        return Err(ExtractError::PreprocessingError(format!(
            "sharpen strength {} out of range",
            strength
        )));
    }

    let gray = image.to_luma8();
    let s = strength;
    let kernel: [f32; 9] = [0.0, -s, 0.0, -s, 1.0 + 4.0 * s, -s, 0.0, -s, 0.0];

    let sharpened = filter3x3(&gray, &kernel);
    Ok(DynamicImage::ImageLuma8(sharpened))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn edge_image() -> GrayImage {
        GrayImage::from_fn(20, 10, |x, _| if x < 10 { Luma([50]) } else { Luma([200]) })
    }

    #[test]
    fn test_sharpen_enhances_edges() {
        let result = apply(DynamicImage::ImageLuma8(edge_image()), 1.0)
            .unwrap()
            .to_luma8();

        let edge_left = result.get_pixel(9, 5).0[0];
        let edge_right = result.get_pixel(10, 5).0[0];
        let result_diff = (edge_right as i32 - edge_left as i32).abs();

        assert!(result_diff >= 150, "Edge should be enhanced: {}", result_diff);
    }

    #[test]
    fn test_zero_strength_is_identity() {
        let img = edge_image();
        let result = apply(DynamicImage::ImageLuma8(img.clone()), 0.0)
            .unwrap()
            .to_luma8();
        assert_eq!(result.get_pixel(5, 5), img.get_pixel(5, 5));
        assert_eq!(result.get_pixel(15, 5), img.get_pixel(15, 5));
    }

    #[test]
    fn test_rejects_out_of_range_strength() {
        assert!(apply(DynamicImage::ImageLuma8(edge_image()), 9.0).is_err());
    }
}
