//! Canonicalization of heterogeneous model outputs into binary masks
//!
//! Every model declares one output convention at registration time; the
//! matching adapter hides how that model encodes "this pixel is tumour" and
//! always yields a [`CanonicalMask`] at the normalized-image resolution.

use crate::error::{Result, SegmentationError};
use crate::inference::{InstanceDetection, RawPrediction};
use crate::types::CanonicalMask;
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

/// Class label treated as foreground by classification heads
const FOREGROUND_CLASS: usize = 1;

/// Probability cutoff for threshold and instance heads (strictly greater)
const MASK_THRESHOLD: f32 = 0.5;

/// Declared output convention of a segmentation model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputConvention {
    /// Per-class score planes; the mask is the per-pixel argmax
    Classification,
    /// Single probability map; sigmoid, min-max rescale, then threshold
    Threshold,
    /// Ranked instance detections; the best instance is thresholded
    Instance,
}

impl std::fmt::Display for OutputConvention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Classification => write!(f, "classification"),
            Self::Threshold => write!(f, "threshold"),
            Self::Instance => write!(f, "instance"),
        }
    }
}

impl OutputConvention {
    /// Convert a raw prediction into a canonical mask of the expected
    /// `(width, height)` resolution
    ///
    /// # Errors
    /// - `Model` when the raw prediction variant does not match this
    ///   convention
    /// - `ShapeMismatch` when the raw output's spatial shape differs from
    ///   the expected resolution
    pub fn canonicalize(
        self,
        model_name: &str,
        raw: RawPrediction,
        resolution: (u32, u32),
    ) -> Result<CanonicalMask> {
        match (self, raw) {
            (Self::Classification, RawPrediction::ClassScores(scores)) => {
                classification_to_mask(model_name, &scores, resolution)
            },
            (Self::Threshold, RawPrediction::Probability(prob)) => {
                threshold_to_mask(model_name, &prob, resolution)
            },
            (Self::Instance, RawPrediction::Instances(detections)) => {
                instances_to_mask(model_name, &detections, resolution)
            },
            (convention, raw) => Err(SegmentationError::model(format!(
                "Model '{model_name}' is declared as a {convention} head but produced {}",
                raw.kind()
            ))),
        }
    }
}

fn check_spatial_shape(
    model_name: &str,
    actual: (usize, usize),
    resolution: (u32, u32),
) -> Result<()> {
    let expected = (resolution.1 as usize, resolution.0 as usize);
    if actual != expected {
        return Err(SegmentationError::shape_mismatch(
            format!("model '{model_name}' output"),
            (expected.1, expected.0),
            (actual.1, actual.0),
        ));
    }
    Ok(())
}

/// Per-pixel argmax over class planes; foreground is class label 1
///
/// No thresholding: the winning class index is the mask value, re-encoded so
/// anything other than the foreground class maps to background.
#[allow(clippy::indexing_slicing)] // Indices bounded by the checked tensor shape
fn classification_to_mask(
    model_name: &str,
    scores: &Array3<f32>,
    resolution: (u32, u32),
) -> Result<CanonicalMask> {
    let (classes, height, width) = scores.dim();
    if classes == 0 {
        return Err(SegmentationError::model(format!(
            "Model '{model_name}' produced zero class planes"
        )));
    }
    check_spatial_shape(model_name, (height, width), resolution)?;

    let mut mask = Array2::<u8>::zeros((height, width));
    for ((y, x), out) in mask.indexed_iter_mut() {
        let mut best_class = 0usize;
        let mut best_score = scores[[0, y, x]];
        for class in 1..classes {
            let score = scores[[class, y, x]];
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }
        *out = u8::from(best_class == FOREGROUND_CLASS);
    }

    CanonicalMask::from_binary(mask)
}

/// Sigmoid, min-max rescale across the map, then strict `> 0.5`
///
/// A constant map has no min-max range and canonicalizes to all-background.
fn threshold_to_mask(
    model_name: &str,
    prob: &Array2<f32>,
    resolution: (u32, u32),
) -> Result<CanonicalMask> {
    check_spatial_shape(model_name, prob.dim(), resolution)?;

    let sigmoid = prob.mapv(|v| 1.0 / (1.0 + (-v).exp()));

    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &v in &sigmoid {
        min = min.min(v);
        max = max.max(v);
    }

    let range = max - min;
    let mask = if range > 0.0 {
        sigmoid.mapv(|v| u8::from((v - min) / range > MASK_THRESHOLD))
    } else {
        Array2::zeros(sigmoid.dim())
    };

    CanonicalMask::from_binary(mask)
}

/// Highest-confidence instance thresholded at `> 0.5`; an empty detection
/// list is a valid all-background outcome, not an error
fn instances_to_mask(
    model_name: &str,
    detections: &[InstanceDetection],
    resolution: (u32, u32),
) -> Result<CanonicalMask> {
    let Some(best) = detections
        .iter()
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    else {
        return Ok(CanonicalMask::zeros(resolution));
    };

    check_spatial_shape(model_name, best.mask.dim(), resolution)?;

    let mask = best.mask.mapv(|v| u8::from(v > MASK_THRESHOLD));
    CanonicalMask::from_binary(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classification_argmax_no_threshold() {
        // Background wins at (0,0) and (1,1), foreground elsewhere; margins
        // are irrelevant because there is no thresholding
        let background = array![[0.9f32, 0.1], [0.4, 0.51]];
        let foreground = array![[0.1f32, 0.2], [0.6, 0.5]];
        let scores = ndarray::stack(ndarray::Axis(0), &[background.view(), foreground.view()])
            .unwrap();

        let mask = OutputConvention::Classification
            .canonicalize("HRNet Seg", RawPrediction::ClassScores(scores), (2, 2))
            .unwrap();

        assert_eq!(mask.data(), &array![[0u8, 1], [1, 0]]);
    }

    #[test]
    fn test_threshold_rescale_separates_foreground() {
        // After sigmoid + min-max rescale the inner values land near 0.24
        // and 0.76; only the upper half survives the 0.5 cutoff
        let prob = array![[-3.0f32, -1.0], [1.0, 3.0]];
        let mask = OutputConvention::Threshold
            .canonicalize("U2Net Seg", RawPrediction::Probability(prob), (2, 2))
            .unwrap();

        assert_eq!(mask.data(), &array![[0u8, 0], [1, 1]]);
    }

    #[test]
    fn test_threshold_constant_map_is_all_background() {
        let prob = Array2::from_elem((3, 3), 0.7f32);
        let mask = OutputConvention::Threshold
            .canonicalize("U2Net Seg", RawPrediction::Probability(prob), (3, 3))
            .unwrap();

        assert!(mask.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_instance_empty_detections_yield_zero_mask() {
        let mask = OutputConvention::Instance
            .canonicalize("Mask-RCNN Seg", RawPrediction::Instances(Vec::new()), (4, 4))
            .unwrap();

        assert_eq!(mask.dimensions(), (4, 4));
        assert!(mask.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_instance_selects_highest_confidence() {
        let low = InstanceDetection {
            confidence: 0.4,
            mask: Array2::from_elem((2, 2), 0.9f32),
        };
        let high = InstanceDetection {
            confidence: 0.9,
            // 0.5 exactly must stay background: the cutoff is strict
            mask: array![[0.9f32, 0.5], [0.1, 0.9]],
        };

        let mask = OutputConvention::Instance
            .canonicalize(
                "Mask-RCNN Seg",
                RawPrediction::Instances(vec![low, high]),
                (2, 2),
            )
            .unwrap();

        assert_eq!(mask.data(), &array![[1u8, 0], [0, 1]]);
    }

    #[test]
    fn test_shape_mismatch_names_model_and_shapes() {
        let prob = Array2::zeros((4, 4));
        let err = OutputConvention::Threshold
            .canonicalize("U2Net Seg", RawPrediction::Probability(prob), (8, 8))
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("U2Net Seg"));
        assert!(msg.contains("8x8"));
        assert!(msg.contains("4x4"));
    }

    #[test]
    fn test_convention_mismatch_is_model_error() {
        let prob = Array2::zeros((4, 4));
        let err = OutputConvention::Classification
            .canonicalize("HRNet Seg", RawPrediction::Probability(prob), (4, 4))
            .unwrap_err();

        assert!(matches!(err, SegmentationError::Model(_)));
        assert!(err.to_string().contains("probability map"));
    }

    #[test]
    fn test_convention_serde_names() {
        let json = serde_json::to_string(&OutputConvention::Classification).unwrap();
        assert_eq!(json, "\"classification\"");
        let parsed: OutputConvention = serde_json::from_str("\"instance\"").unwrap();
        assert_eq!(parsed, OutputConvention::Instance);
    }
}
