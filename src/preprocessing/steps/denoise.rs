use crate::error::ExtractError;
use image::DynamicImage;
use imageproc::filter::median_filter;

/// Median filter over a (2r+1)x(2r+1) window; removes JPEG speckle while
/// keeping glyph edges, which matters before binarization.
pub fn apply(image: DynamicImage, radius: u32) -> Result<DynamicImage, ExtractError> {
    if radius == 0 {
        return Ok(DynamicImage::ImageLuma8(image.to_luma8()));
    }
    let gray = image.to_luma8();
    if gray.width() <= radius * 2 || gray.height() <= radius * 2 {
        return Err(ExtractError::PreprocessingError(format!(
            "image {}x{} smaller than median window",
            gray.width(),
            gray.height()
        )));
    }
    Ok(DynamicImage::ImageLuma8(median_filter(&gray, radius, radius)))
}
