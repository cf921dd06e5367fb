//! Scoring-function abstraction over heterogeneous segmentation models

use crate::config::ExecutionProvider;
use crate::error::Result;
use ndarray::{Array2, Array3, Array4};

/// Raw inference output before canonicalization
///
/// Each variant corresponds to one output convention; the matching
/// [`crate::adapter::OutputConvention`] turns it into a canonical mask.
#[derive(Debug, Clone)]
pub enum RawPrediction {
    /// One score plane per class, laid out `(classes, height, width)`
    ClassScores(Array3<f32>),

    /// Single-channel probability map, laid out `(height, width)`
    Probability(Array2<f32>),

    /// Ranked instance detections, possibly empty
    Instances(Vec<InstanceDetection>),
}

impl RawPrediction {
    /// Short name of the variant, for error messages
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClassScores(_) => "class scores",
            Self::Probability(_) => "probability map",
            Self::Instances(_) => "instance detections",
        }
    }
}

/// One detected instance: a soft mask plus the detector's confidence
#[derive(Debug, Clone)]
pub struct InstanceDetection {
    /// Detector confidence for this instance
    pub confidence: f32,

    /// Soft instance mask, laid out `(height, width)`
    pub mask: Array2<f32>,
}

/// Trait for opaque, frozen scoring functions
///
/// A scorer owns one model's weights and maps a normalized NCHW input tensor
/// to its raw output. Scorers hold no per-call state: invoking `score`
/// repeatedly must not leak state between calls.
///
/// `bind`/`unbind` are the accelerator-placement hooks driven by the
/// registry's lease: `bind` moves the working set onto the requested
/// provider immediately before scoring and `unbind` returns it to host
/// memory right after, successful or not.
pub trait Scorer: Send + std::fmt::Debug {
    /// Run inference on the input tensor
    ///
    /// # Errors
    /// - Scorer not bound to a provider
    /// - Model inference failures
    /// - Tensor conversion or output extraction errors
    fn score(&mut self, input: &Array4<f32>) -> Result<RawPrediction>;

    /// Move the model's working set onto the given provider
    ///
    /// # Errors
    /// - Model loading or provider initialization failures
    fn bind(&mut self, provider: ExecutionProvider) -> Result<()>;

    /// Release the model's working set back to host memory
    ///
    /// # Errors
    /// - Backend release failures
    fn unbind(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_raw_prediction_kind_names() {
        let scores = RawPrediction::ClassScores(Array3::zeros((2, 4, 4)));
        assert_eq!(scores.kind(), "class scores");

        let prob = RawPrediction::Probability(Array2::zeros((4, 4)));
        assert_eq!(prob.kind(), "probability map");

        let instances = RawPrediction::Instances(Vec::new());
        assert_eq!(instances.kind(), "instance detections");
    }
}
