//! Mock scorers for testing without model files

use crate::config::ExecutionProvider;
use crate::error::{Result, SegmentationError};
use crate::inference::{InstanceDetection, RawPrediction, Scorer};
use ndarray::{Array2, Array3, Array4, Axis};
use std::sync::{Arc, Mutex};

/// Scorer returning the same prediction on every call
#[derive(Debug, Clone)]
pub struct StaticScorer {
    prediction: RawPrediction,
}

impl StaticScorer {
    /// Scorer returning an arbitrary fixed prediction
    #[must_use]
    pub fn new(prediction: RawPrediction) -> Self {
        Self { prediction }
    }

    /// Scorer emulating a threshold head with a fixed probability map
    #[must_use]
    pub fn probability(map: Array2<f32>) -> Self {
        Self::new(RawPrediction::Probability(map))
    }

    /// Scorer emulating a classification head with fixed score planes
    #[must_use]
    pub fn class_scores(scores: Array3<f32>) -> Self {
        Self::new(RawPrediction::ClassScores(scores))
    }

    /// Scorer emulating an instance head with a fixed detection list
    #[must_use]
    pub fn instances(detections: Vec<InstanceDetection>) -> Self {
        Self::new(RawPrediction::Instances(detections))
    }

    /// Scorer whose classification output canonicalizes to exactly the
    /// given binary mask
    #[must_use]
    pub fn classification_from_mask(mask: &Array2<u8>) -> Self {
        let background = mask.mapv(|v| 1.0 - f32::from(v));
        let foreground = mask.mapv(f32::from);
        let mut scores = Array3::zeros((0, mask.dim().0, mask.dim().1));
        scores.push(Axis(0), background.view()).ok();
        scores.push(Axis(0), foreground.view()).ok();
        Self::class_scores(scores)
    }
}

impl Scorer for StaticScorer {
    fn score(&mut self, _input: &Array4<f32>) -> Result<RawPrediction> {
        Ok(self.prediction.clone())
    }

    fn bind(&mut self, _provider: ExecutionProvider) -> Result<()> {
        Ok(())
    }

    fn unbind(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Scorer recording every lifecycle event, for lease-discipline assertions
#[derive(Debug)]
pub struct RecordingScorer {
    prediction: RawPrediction,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl RecordingScorer {
    /// Recording scorer emulating a threshold head
    #[must_use]
    pub fn new(map: Array2<f32>) -> Self {
        Self {
            prediction: RawPrediction::Probability(map),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle to the event log ("bind", "score", "unbind")
    #[must_use]
    pub fn log(&self) -> Arc<Mutex<Vec<&'static str>>> {
        Arc::clone(&self.log)
    }

    fn record(&self, event: &'static str) {
        if let Ok(mut log) = self.log.lock() {
            log.push(event);
        }
    }
}

impl Scorer for RecordingScorer {
    fn score(&mut self, _input: &Array4<f32>) -> Result<RawPrediction> {
        self.record("score");
        Ok(self.prediction.clone())
    }

    fn bind(&mut self, _provider: ExecutionProvider) -> Result<()> {
        self.record("bind");
        Ok(())
    }

    fn unbind(&mut self) -> Result<()> {
        self.record("unbind");
        Ok(())
    }
}

/// Scorer failing at a chosen lifecycle stage
#[derive(Debug)]
pub struct FailingScorer {
    fail_on_bind: bool,
    message: String,
}

impl FailingScorer {
    /// Scorer whose `score` call fails
    #[must_use]
    pub fn on_score<S: Into<String>>(message: S) -> Self {
        Self {
            fail_on_bind: false,
            message: message.into(),
        }
    }

    /// Scorer whose `bind` call fails
    #[must_use]
    pub fn on_bind<S: Into<String>>(message: S) -> Self {
        Self {
            fail_on_bind: true,
            message: message.into(),
        }
    }
}

impl Scorer for FailingScorer {
    fn score(&mut self, _input: &Array4<f32>) -> Result<RawPrediction> {
        Err(SegmentationError::inference(self.message.clone()))
    }

    fn bind(&mut self, _provider: ExecutionProvider) -> Result<()> {
        if self.fail_on_bind {
            return Err(SegmentationError::model(self.message.clone()));
        }
        Ok(())
    }

    fn unbind(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::OutputConvention;
    use ndarray::array;

    #[test]
    fn test_classification_from_mask_round_trips() {
        let target = array![[1u8, 0], [0, 1]];
        let mut scorer = StaticScorer::classification_from_mask(&target);

        let raw = scorer.score(&Array4::zeros((1, 3, 2, 2))).unwrap();
        let mask = OutputConvention::Classification
            .canonicalize("mock", raw, (2, 2))
            .unwrap();

        assert_eq!(mask.data(), &target);
    }

    #[test]
    fn test_failing_scorer_stages() {
        let mut scorer = FailingScorer::on_bind("no weights");
        assert!(scorer.bind(ExecutionProvider::Cpu).is_err());

        let mut scorer = FailingScorer::on_score("inference exploded");
        assert!(scorer.bind(ExecutionProvider::Cpu).is_ok());
        assert!(scorer.score(&Array4::zeros((1, 3, 2, 2))).is_err());
    }
}
