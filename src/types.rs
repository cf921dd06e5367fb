//! Core types for segmentation operations

use crate::error::{Result, SegmentationError};
use image::{GrayImage, RgbImage};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;

/// Fixed-resolution RGB input image plus the original dimensions captured
/// before resizing
///
/// Owned by the processor for the duration of one request and never mutated
/// after construction. The original `(width, height)` is what the final
/// compositing resize restores.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    image: RgbImage,
    original_dimensions: (u32, u32),
}

impl NormalizedImage {
    /// Wrap an already-resized RGB buffer together with the dimensions the
    /// source image had before resizing
    ///
    /// # Errors
    /// - `InvalidConfig` when either buffer or original dimensions are empty
    pub fn new(image: RgbImage, original_dimensions: (u32, u32)) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(SegmentationError::invalid_config(
                "Normalized image buffer must not be empty",
            ));
        }
        if original_dimensions.0 == 0 || original_dimensions.1 == 0 {
            return Err(SegmentationError::invalid_config(
                "Original image dimensions must not be empty",
            ));
        }
        Ok(Self {
            image,
            original_dimensions,
        })
    }

    /// The resized RGB pixel buffer at model input resolution
    #[must_use]
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Buffer dimensions as `(width, height)`
    #[must_use]
    pub fn resolution(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Dimensions of the source image before resizing, as `(width, height)`
    #[must_use]
    pub fn original_dimensions(&self) -> (u32, u32) {
        self.original_dimensions
    }
}

/// Binary segmentation mask in the canonical, model-independent encoding
///
/// Values are exactly 0 or 1; the constructor rejects anything else so no
/// adapter residue can leak through. Spatial shape matches the
/// `NormalizedImage` the mask was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalMask {
    data: Array2<u8>,
}

impl CanonicalMask {
    /// Create a mask from binary data laid out as `(height, width)`
    ///
    /// # Errors
    /// - `Processing` when any value is neither 0 nor 1
    pub fn from_binary(data: Array2<u8>) -> Result<Self> {
        if let Some(bad) = data.iter().find(|&&v| v > 1) {
            return Err(SegmentationError::processing(format!(
                "Canonical mask values must be 0 or 1, found {bad}"
            )));
        }
        Ok(Self { data })
    }

    /// All-background mask of the given `(width, height)`
    #[must_use]
    pub fn zeros(dimensions: (u32, u32)) -> Self {
        Self {
            data: Array2::zeros((dimensions.1 as usize, dimensions.0 as usize)),
        }
    }

    /// Mask dimensions as `(width, height)`
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        let (h, w) = self.data.dim();
        (w as u32, h as u32)
    }

    /// The underlying binary array, laid out `(height, width)`
    #[must_use]
    pub fn data(&self) -> &Array2<u8> {
        &self.data
    }

    /// Render the mask as an 8-bit grayscale image with foreground at 255
    #[must_use]
    pub fn to_luma_image(&self) -> GrayImage {
        let (w, h) = self.dimensions();
        let pixels: Vec<u8> = self.data.iter().map(|&v| v * 255).collect();
        GrayImage::from_raw(w, h, pixels)
            .unwrap_or_else(|| GrayImage::new(w, h))
    }

    /// Foreground/background pixel counts and ratios
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let foreground_pixels = self.data.iter().filter(|&&v| v == 1).count();
        let background_pixels = total_pixels - foreground_pixels;

        MaskStatistics {
            total_pixels,
            foreground_pixels,
            background_pixels,
            foreground_ratio: foreground_pixels as f32 / total_pixels as f32,
            background_ratio: background_pixels as f32 / total_pixels as f32,
        }
    }
}

/// Statistics about a canonical mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub background_pixels: usize,
    pub foreground_ratio: f32,
    pub background_ratio: f32,
}

/// Logical combination applied across an ensemble of masks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnsembleOp {
    /// Pixel is foreground only where every contributing mask agrees
    And,
    /// Pixel is foreground where any contributing mask says so
    Or,
}

impl std::fmt::Display for EnsembleOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::And => write!(f, "Ensemble AND"),
            Self::Or => write!(f, "Ensemble OR"),
        }
    }
}

/// A combined mask tagged with its combination kind and contributing models
///
/// Only produced when two or more canonical masks were combined; the member
/// order records the request order but does not affect the combined mask.
#[derive(Debug, Clone)]
pub struct EnsembleResult {
    pub op: EnsembleOp,
    pub mask: CanonicalMask,
    pub members: Vec<String>,
}

impl EnsembleResult {
    /// Artifact label for this ensemble (`"Ensemble AND"` / `"Ensemble OR"`)
    #[must_use]
    pub fn label(&self) -> String {
        self.op.to_string()
    }
}

/// Rendered output pair for one mask at the original image resolution
#[derive(Debug, Clone)]
pub struct CompositeArtifact {
    /// Raw mask as grayscale (foreground 255) at original resolution
    pub mask_image: GrayImage,

    /// Alpha blend of the source image over the recolored mask
    pub blend_image: RgbImage,

    /// Which model or ensemble produced this artifact
    pub source_label: String,
}

impl CompositeArtifact {
    /// Encode the mask image as lossless PNG bytes
    ///
    /// # Errors
    /// - `Image` on encoding failures
    pub fn mask_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.mask_image
            .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)?;
        Ok(buffer)
    }

    /// Encode the blend image as lossless PNG bytes
    ///
    /// # Errors
    /// - `Image` on encoding failures
    pub fn blend_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.blend_image
            .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)?;
        Ok(buffer)
    }

    /// Save the mask image as PNG
    ///
    /// # Errors
    /// - `Image` or `Io` on write failures
    pub fn save_mask_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.mask_image
            .save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }

    /// Save the blend image as PNG
    ///
    /// # Errors
    /// - `Image` or `Io` on write failures
    pub fn save_blend_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.blend_image
            .save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }
}

/// Timing breakdown for one segmentation request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Image resize and tensor conversion
    pub preprocessing_ms: u64,

    /// Scoring-function execution across all requested models
    pub inference_ms: u64,

    /// AND/OR combination (zero for single-model requests)
    pub ensemble_ms: u64,

    /// Recoloring, blending and the final resize for every artifact
    pub compositing_ms: u64,

    /// Total end-to-end request time
    pub total_ms: u64,
}

/// Metadata about one segmentation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    /// Models that contributed, in request order after deduplication
    pub model_names: Vec<String>,

    /// Timing breakdown
    pub timings: ProcessingTimings,
}

impl ProcessingMetadata {
    #[must_use]
    pub fn new(model_names: Vec<String>) -> Self {
        Self {
            model_names,
            timings: ProcessingTimings::default(),
        }
    }
}

/// Complete artifact set for one request: one artifact per requested model,
/// plus `"Ensemble AND"` / `"Ensemble OR"` artifacts when two or more models
/// were requested
#[derive(Debug, Clone)]
pub struct PredictionSet {
    pub artifacts: Vec<CompositeArtifact>,
    pub metadata: ProcessingMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mask_rejects_non_binary_values() {
        let err = CanonicalMask::from_binary(array![[0u8, 2], [1, 0]]).unwrap_err();
        assert!(err.to_string().contains("0 or 1"));
    }

    #[test]
    fn test_mask_dimensions_are_width_height() {
        let mask = CanonicalMask::from_binary(Array2::zeros((4, 3))).unwrap();
        assert_eq!(mask.dimensions(), (3, 4));
    }

    #[test]
    fn test_zeros_mask() {
        let mask = CanonicalMask::zeros((5, 2));
        assert_eq!(mask.dimensions(), (5, 2));
        assert!(mask.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_to_luma_scales_foreground_to_255() {
        let mask = CanonicalMask::from_binary(array![[1u8, 0], [0, 1]]).unwrap();
        let luma = mask.to_luma_image();
        assert_eq!(luma.get_pixel(0, 0).0, [255]);
        assert_eq!(luma.get_pixel(1, 0).0, [0]);
        assert_eq!(luma.get_pixel(1, 1).0, [255]);
    }

    #[test]
    fn test_mask_statistics() {
        let mask = CanonicalMask::from_binary(array![[1u8, 1], [0, 0]]).unwrap();
        let stats = mask.statistics();
        assert_eq!(stats.total_pixels, 4);
        assert_eq!(stats.foreground_pixels, 2);
        assert_eq!(stats.background_pixels, 2);
        assert_eq!(stats.foreground_ratio, 0.5);
    }

    #[test]
    fn test_ensemble_op_labels() {
        assert_eq!(EnsembleOp::And.to_string(), "Ensemble AND");
        assert_eq!(EnsembleOp::Or.to_string(), "Ensemble OR");
    }

    #[test]
    fn test_normalized_image_rejects_empty_dimensions() {
        let buffer = RgbImage::new(8, 8);
        assert!(NormalizedImage::new(buffer, (0, 10)).is_err());
    }

    #[test]
    fn test_artifact_png_encoding() {
        let artifact = CompositeArtifact {
            mask_image: GrayImage::new(4, 4),
            blend_image: RgbImage::new(4, 4),
            source_label: "HRNet Seg".to_string(),
        };
        let png = artifact.mask_png_bytes().unwrap();
        assert_eq!(&png[1..4], b"PNG");
        let png = artifact.blend_png_bytes().unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}
