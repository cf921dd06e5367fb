//! Image preprocessing: model-input resize and tensor conversion

use crate::error::Result;
use crate::types::NormalizedImage;
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;

/// Preprocessing configuration for model input tensors
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    /// Square model input resolution (pixels per side)
    pub target_size: u32,
    /// Per-channel normalization mean (RGB, 0-1 scale)
    pub normalization_mean: [f32; 3],
    /// Per-channel normalization std (RGB, 0-1 scale)
    pub normalization_std: [f32; 3],
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        // ImageNet statistics, shared by every checkpoint this pipeline serves
        Self {
            target_size: crate::config::DEFAULT_MODEL_INPUT_RESOLUTION,
            normalization_mean: [0.485, 0.456, 0.406],
            normalization_std: [0.229, 0.224, 0.225],
        }
    }
}

impl PreprocessingConfig {
    /// Default normalization at a custom target resolution
    #[must_use]
    pub fn with_target_size(target_size: u32) -> Self {
        Self {
            target_size,
            ..Self::default()
        }
    }
}

/// Resize an image to the square model input resolution, capturing its
/// original dimensions for the final compositing resize
///
/// The resize is exact (not aspect-preserving): the compositor undoes it by
/// resizing artifacts back to the captured `(width, height)`.
///
/// # Errors
/// - `InvalidConfig` when the input image is empty
pub fn normalize_image(
    image: &DynamicImage,
    config: &PreprocessingConfig,
    filter: FilterType,
) -> Result<NormalizedImage> {
    let original_dimensions = (image.width(), image.height());
    if original_dimensions.0 == 0 || original_dimensions.1 == 0 {
        return Err(crate::error::SegmentationError::invalid_config(
            "Input image must not be empty",
        ));
    }
    let rgb = image.to_rgb8();
    let resized =
        image::imageops::resize(&rgb, config.target_size, config.target_size, filter);
    NormalizedImage::new(resized, original_dimensions)
}

/// Convert a normalized image to an NCHW float tensor with per-channel
/// normalization
#[must_use]
pub fn to_input_tensor(image: &NormalizedImage, config: &PreprocessingConfig) -> Array4<f32> {
    let (width, height) = image.resolution();
    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

    #[allow(clippy::indexing_slicing)]
    // Tensor dimensions pre-allocated to match the pixel buffer
    for (x, y, pixel) in image.image().enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for channel in 0..3 {
            let normalized = (f32::from(pixel[channel]) / 255.0
                - config.normalization_mean[channel])
                / config.normalization_std[channel];
            tensor[[0, channel, y, x]] = normalized;
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn solid_image(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
    }

    #[test]
    fn test_normalize_captures_original_dimensions() {
        let image = solid_image(640, 480, [10, 20, 30]);
        let config = PreprocessingConfig::with_target_size(64);
        let normalized = normalize_image(&image, &config, FilterType::Triangle).unwrap();

        assert_eq!(normalized.resolution(), (64, 64));
        assert_eq!(normalized.original_dimensions(), (640, 480));
    }

    #[test]
    fn test_tensor_shape_is_nchw() {
        let image = solid_image(100, 100, [0, 0, 0]);
        let config = PreprocessingConfig::with_target_size(32);
        let normalized = normalize_image(&image, &config, FilterType::Triangle).unwrap();
        let tensor = to_input_tensor(&normalized, &config);

        assert_eq!(tensor.shape(), &[1, 3, 32, 32]);
    }

    #[test]
    fn test_tensor_normalization_values() {
        // A pure white image: (1.0 - mean) / std per channel
        let image = solid_image(8, 8, [255, 255, 255]);
        let config = PreprocessingConfig::with_target_size(8);
        let normalized = normalize_image(&image, &config, FilterType::Nearest).unwrap();
        let tensor = to_input_tensor(&normalized, &config);

        for channel in 0..3 {
            let expected =
                (1.0 - config.normalization_mean[channel]) / config.normalization_std[channel];
            let actual = tensor[[0, channel, 0, 0]];
            assert!((actual - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_normalize_rejects_empty_image() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        let config = PreprocessingConfig::with_target_size(16);
        assert!(normalize_image(&image, &config, FilterType::Triangle).is_err());
    }
}
