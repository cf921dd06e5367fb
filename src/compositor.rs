//! Rendering of canonical masks into mask and overlay artifacts
//!
//! The compositor is the only stage that resizes back to the original
//! resolution, and it does so exactly once, as its last step.

use crate::config::SegmentationConfig;
use crate::error::{Result, SegmentationError};
use crate::types::{CanonicalMask, CompositeArtifact, NormalizedImage};
use image::imageops::FilterType;
use image::{GrayImage, Rgb, RgbImage};

/// Foreground recolor target (tumour regions render blue)
const FOREGROUND_COLOR: [u8; 3] = [0, 0, 255];

/// Background recolor target (white, so the blend stays bright)
const BACKGROUND_COLOR: [u8; 3] = [255, 255, 255];

/// Renders a canonical mask plus the normalized image into artifacts at the
/// image's original resolution
#[derive(Debug, Clone)]
pub struct Compositor {
    alpha: f32,
    filter: FilterType,
}

impl Compositor {
    /// Compositor with an explicit blend weight and resampling filter
    #[must_use]
    pub fn new(alpha: f32, filter: FilterType) -> Self {
        Self { alpha, filter }
    }

    /// Compositor configured from a request configuration
    #[must_use]
    pub fn from_config(config: &SegmentationConfig) -> Self {
        Self::new(config.alpha, config.resize_filter.to_filter_type())
    }

    /// Render one mask into its artifact pair
    ///
    /// Steps, in order: expand the mask to a 0/255 grayscale image, recolor
    /// it (foreground blue, background white, exact triple matching), blend
    /// the normalized image over the recolored mask, then resize both the
    /// raw mask and the blend back to the captured original dimensions.
    ///
    /// # Errors
    /// - `ShapeMismatch` when the mask's dimensions differ from the
    ///   normalized image's resolution
    pub fn composite(
        &self,
        image: &NormalizedImage,
        mask: &CanonicalMask,
        source_label: &str,
    ) -> Result<CompositeArtifact> {
        let resolution = image.resolution();
        let mask_dims = mask.dimensions();
        if mask_dims != resolution {
            return Err(SegmentationError::shape_mismatch(
                format!("compositing '{source_label}'"),
                (resolution.0 as usize, resolution.1 as usize),
                (mask_dims.0 as usize, mask_dims.1 as usize),
            ));
        }

        let gray = mask.to_luma_image();
        let recolored = recolor_mask(&gray);
        let blended = blend_images(image.image(), &recolored, self.alpha);

        let (width, height) = image.original_dimensions();
        let mask_image = image::imageops::resize(&gray, width, height, self.filter);
        let blend_image = image::imageops::resize(&blended, width, height, self.filter);

        Ok(CompositeArtifact {
            mask_image,
            blend_image,
            source_label: source_label.to_string(),
        })
    }
}

/// Expand a 0/255 grayscale mask to RGB and recolor it by exact triple
/// matching: pure white becomes pure blue, pure black becomes pure white
fn recolor_mask(gray: &GrayImage) -> RgbImage {
    let (width, height) = gray.dimensions();
    let mut recolored = RgbImage::new(width, height);
    for (x, y, pixel) in gray.enumerate_pixels() {
        let value = pixel.0[0];
        let rgb = match [value, value, value] {
            [255, 255, 255] => FOREGROUND_COLOR,
            [0, 0, 0] => BACKGROUND_COLOR,
            other => other,
        };
        recolored.put_pixel(x, y, Rgb(rgb));
    }
    recolored
}

/// Per-channel alpha blend: `alpha * image + (1 - alpha) * overlay`,
/// truncated to u8 like the original's unsigned-byte assignment
fn blend_images(image: &RgbImage, overlay: &RgbImage, alpha: f32) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut blended = RgbImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels() {
        let over = overlay.get_pixel(x, y);
        let mut out = [0u8; 3];
        for channel in 0..3 {
            let value =
                alpha * f32::from(pixel.0[channel]) + (1.0 - alpha) * f32::from(over.0[channel]);
            out[channel] = value as u8;
        }
        blended.put_pixel(x, y, Rgb(out));
    }
    blended
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn normalized(image: RgbImage, original: (u32, u32)) -> NormalizedImage {
        NormalizedImage::new(image, original).unwrap()
    }

    fn single_foreground_mask() -> CanonicalMask {
        CanonicalMask::from_binary(array![[0u8, 0], [0, 1]]).unwrap()
    }

    #[test]
    fn test_recolor_exact_triples() {
        let mask = single_foreground_mask();
        let recolored = recolor_mask(&mask.to_luma_image());

        assert_eq!(recolored.get_pixel(1, 1).0, [0, 0, 255]);
        for (x, y) in [(0, 0), (1, 0), (0, 1)] {
            assert_eq!(recolored.get_pixel(x, y).0, [255, 255, 255]);
        }
    }

    #[test]
    fn test_blend_alpha_one_is_source_image() {
        let image = RgbImage::from_fn(3, 3, |x, y| Rgb([x as u8 * 40, y as u8 * 40, 17]));
        let overlay = RgbImage::from_pixel(3, 3, Rgb([255, 255, 255]));

        let blended = blend_images(&image, &overlay, 1.0);
        assert_eq!(blended.as_raw(), image.as_raw());
    }

    #[test]
    fn test_blend_alpha_zero_is_overlay() {
        let image = RgbImage::from_pixel(3, 3, Rgb([120, 7, 200]));
        let overlay = RgbImage::from_fn(3, 3, |x, _| Rgb([x as u8, 0, 255]));

        let blended = blend_images(&image, &overlay, 0.0);
        assert_eq!(blended.as_raw(), overlay.as_raw());
    }

    #[test]
    fn test_composite_resizes_to_original_dimensions() {
        // Deliberately non-square original so an aspect-ratio bug shows up
        let image = normalized(RgbImage::new(4, 4), (123, 77));
        let mask = CanonicalMask::zeros((4, 4));
        let compositor = Compositor::new(0.8, FilterType::Triangle);

        let artifact = compositor.composite(&image, &mask, "HRNet Seg").unwrap();
        assert_eq!(artifact.mask_image.dimensions(), (123, 77));
        assert_eq!(artifact.blend_image.dimensions(), (123, 77));
        assert_eq!(artifact.source_label, "HRNet Seg");
    }

    #[test]
    fn test_composite_alpha_boundaries_end_to_end() {
        // Same original and model resolution with a nearest filter, so the
        // final resize is the identity and boundary alphas are exact
        let source = RgbImage::from_fn(2, 2, |x, y| Rgb([x as u8 * 90 + 10, y as u8 * 90, 55]));
        let image = normalized(source.clone(), (2, 2));
        let mask = single_foreground_mask();

        let artifact = Compositor::new(1.0, FilterType::Nearest)
            .composite(&image, &mask, "HRNet Seg")
            .unwrap();
        assert_eq!(artifact.blend_image.as_raw(), source.as_raw());

        let artifact = Compositor::new(0.0, FilterType::Nearest)
            .composite(&image, &mask, "HRNet Seg")
            .unwrap();
        assert_eq!(artifact.blend_image.get_pixel(1, 1).0, [0, 0, 255]);
        assert_eq!(artifact.blend_image.get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn test_mask_image_stays_binary_valued() {
        let image = normalized(RgbImage::new(2, 2), (2, 2));
        let mask = single_foreground_mask();
        let compositor = Compositor::new(0.8, FilterType::Nearest);

        let artifact = compositor.composite(&image, &mask, "HRNet Seg").unwrap();
        assert!(artifact
            .mask_image
            .pixels()
            .all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn test_mask_resolution_mismatch_rejected() {
        let image = normalized(RgbImage::new(4, 4), (10, 10));
        let mask = CanonicalMask::zeros((2, 2));
        let compositor = Compositor::new(0.8, FilterType::Triangle);

        let err = compositor.composite(&image, &mask, "HRNet Seg").unwrap_err();
        assert!(matches!(err, SegmentationError::ShapeMismatch { .. }));
    }
}
