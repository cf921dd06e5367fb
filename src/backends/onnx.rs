//! ONNX Runtime scoring backend

use crate::adapter::OutputConvention;
use crate::config::ExecutionProvider;
use crate::error::{Result, SegmentationError};
use crate::inference::{InstanceDetection, RawPrediction, Scorer};
use crate::registry::{CatalogueEntry, ScorerFactory};
use ndarray::{Array2, Array3, Array4, ArrayD};
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::{self, value::Value};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Scorer backed by an ONNX Runtime session
///
/// The session is built on `bind` and dropped on `unbind`, so the model's
/// working set only occupies the execution provider between the two calls.
/// That is exactly the window the registry's accelerator lease spans.
#[derive(Debug)]
pub struct OnnxScorer {
    model_name: String,
    model_path: PathBuf,
    convention: OutputConvention,
    session: Option<Session>,
}

impl OnnxScorer {
    /// Create an unbound scorer for a model file
    #[must_use]
    pub fn new(model_name: String, model_path: PathBuf, convention: OutputConvention) -> Self {
        Self {
            model_name,
            model_path,
            convention,
            session: None,
        }
    }

    fn build_session(&self, provider: ExecutionProvider) -> Result<Session> {
        let mut session_builder = Session::builder()
            .map_err(|e| {
                SegmentationError::inference(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                SegmentationError::inference(format!("Failed to set optimization level: {e}"))
            })?;

        session_builder = match provider {
            ExecutionProvider::Auto => {
                // Auto-detect: CUDA > CoreML > CPU with availability checks
                let mut providers = Vec::new();
                let cuda = CUDAExecutionProvider::default();
                if OrtExecutionProvider::is_available(&cuda).unwrap_or(false) {
                    debug!(model = %self.model_name, "CUDA execution provider available");
                    providers.push(cuda.build());
                }
                let coreml = CoreMLExecutionProvider::default();
                if OrtExecutionProvider::is_available(&coreml).unwrap_or(false) {
                    debug!(model = %self.model_name, "CoreML execution provider available");
                    providers.push(coreml.build());
                }
                if providers.is_empty() {
                    debug!(model = %self.model_name, "No accelerator available, using CPU");
                    session_builder
                } else {
                    session_builder
                        .with_execution_providers(providers)
                        .map_err(|e| {
                            SegmentationError::inference(format!(
                                "Failed to set auto execution providers: {e}"
                            ))
                        })?
                }
            },
            ExecutionProvider::Cpu => session_builder,
            ExecutionProvider::Cuda => {
                let cuda = CUDAExecutionProvider::default();
                if OrtExecutionProvider::is_available(&cuda).unwrap_or(false) {
                    session_builder
                        .with_execution_providers([cuda.build()])
                        .map_err(|e| {
                            SegmentationError::inference(format!(
                                "Failed to set CUDA execution provider: {e}"
                            ))
                        })?
                } else {
                    warn!(model = %self.model_name, "CUDA requested but not available, falling back to CPU");
                    session_builder
                }
            },
            ExecutionProvider::CoreMl => {
                let coreml = CoreMLExecutionProvider::default().with_subgraphs(true);
                if OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                    .unwrap_or(false)
                {
                    session_builder
                        .with_execution_providers([coreml.build()])
                        .map_err(|e| {
                            SegmentationError::inference(format!(
                                "Failed to set CoreML execution provider: {e}"
                            ))
                        })?
                } else {
                    warn!(model = %self.model_name, "CoreML requested but not available, falling back to CPU");
                    session_builder
                }
            },
        };

        let model_data = std::fs::read(&self.model_path).map_err(|e| {
            SegmentationError::model(format!(
                "Failed to read model weights '{}': {e}",
                self.model_path.display()
            ))
        })?;

        session_builder.commit_from_memory(&model_data).map_err(|e| {
            SegmentationError::model(format!(
                "Failed to create session for '{}': {e}",
                self.model_name
            ))
        })
    }

    fn to_raw_prediction(&self, outputs: Vec<ArrayD<f32>>) -> Result<RawPrediction> {
        match self.convention {
            OutputConvention::Classification => {
                let scores = take_batched_output(outputs, &self.model_name)?;
                let scores: Array3<f32> = scores.into_dimensionality().map_err(|e| {
                    SegmentationError::processing(format!(
                        "Class score planes for '{}' are not 3-dimensional: {e}",
                        self.model_name
                    ))
                })?;
                Ok(RawPrediction::ClassScores(scores))
            },
            OutputConvention::Threshold => {
                let map = take_batched_output(outputs, &self.model_name)?;
                // A leading singleton channel axis is part of the NCHW layout
                let map = if map.ndim() == 3 && map.shape().first() == Some(&1) {
                    map.remove_axis(ndarray::Axis(0))
                } else {
                    map
                };
                let map: Array2<f32> = map.into_dimensionality().map_err(|e| {
                    SegmentationError::processing(format!(
                        "Probability map for '{}' is not 2-dimensional: {e}",
                        self.model_name
                    ))
                })?;
                Ok(RawPrediction::Probability(map))
            },
            OutputConvention::Instance => self.to_instances(outputs),
        }
    }

    /// Pair per-instance confidences (1-D output) with soft masks
    /// (4-D `(instances, 1, height, width)` output)
    fn to_instances(&self, outputs: Vec<ArrayD<f32>>) -> Result<RawPrediction> {
        let scores = outputs.iter().find(|o| o.ndim() == 1).cloned();
        let masks = outputs.into_iter().find(|o| o.ndim() == 4);

        let (Some(scores), Some(masks)) = (scores, masks) else {
            return Err(SegmentationError::model(format!(
                "Instance head '{}' must produce a 1-D score output and a 4-D mask output",
                self.model_name
            )));
        };

        let masks: Array4<f32> = masks.into_dimensionality().map_err(|e| {
            SegmentationError::processing(format!(
                "Instance masks for '{}' have an unexpected layout: {e}",
                self.model_name
            ))
        })?;

        if scores.len() != masks.dim().0 {
            return Err(SegmentationError::processing(format!(
                "Instance head '{}' produced {} scores for {} masks",
                self.model_name,
                scores.len(),
                masks.dim().0
            )));
        }

        let mut detections = Vec::with_capacity(scores.len());
        for (index, confidence) in scores.iter().enumerate() {
            let mask = masks
                .index_axis(ndarray::Axis(0), index)
                .index_axis(ndarray::Axis(0), 0)
                .to_owned();
            detections.push(InstanceDetection {
                confidence: *confidence,
                mask,
            });
        }
        Ok(RawPrediction::Instances(detections))
    }
}

/// Drop the batch axis of a `(1, ...)` output
fn take_batched_output(outputs: Vec<ArrayD<f32>>, model_name: &str) -> Result<ArrayD<f32>> {
    let output = outputs.into_iter().next().ok_or_else(|| {
        SegmentationError::processing(format!("Model '{model_name}' produced no outputs"))
    })?;
    if output.ndim() < 3 || output.shape().first() != Some(&1) {
        return Err(SegmentationError::processing(format!(
            "Expected a batched NCHW output for '{model_name}', got shape {:?}",
            output.shape()
        )));
    }
    Ok(output.remove_axis(ndarray::Axis(0)))
}

impl Scorer for OnnxScorer {
    fn score(&mut self, input: &Array4<f32>) -> Result<RawPrediction> {
        let session = self.session.as_mut().ok_or_else(|| {
            SegmentationError::internal(format!(
                "Scorer for '{}' invoked without an accelerator lease",
                self.model_name
            ))
        })?;

        let input_value = Value::from_array(input.clone()).map_err(|e| {
            SegmentationError::processing(format!("Failed to convert input tensor: {e}"))
        })?;

        let outputs = session.run(ort::inputs![input_value]).map_err(|e| {
            SegmentationError::inference(format!(
                "ONNX inference failed for '{}': {e}",
                self.model_name
            ))
        })?;

        // Collect every f32 output tensor, first one first
        let mut extracted: Vec<ArrayD<f32>> = Vec::new();
        for key in outputs.keys() {
            let Some(value) = outputs.get(key) else {
                continue;
            };
            if let Ok(tensor) = value.try_extract_array::<f32>() {
                extracted.push(tensor.view().to_owned());
            }
        }
        if extracted.is_empty() {
            return Err(SegmentationError::processing(format!(
                "No output tensors found for '{}'",
                self.model_name
            )));
        }

        drop(outputs);
        self.to_raw_prediction(extracted)
    }

    fn bind(&mut self, provider: ExecutionProvider) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        let session = self.build_session(provider)?;
        info!(model = %self.model_name, provider = %provider, "Model weights loaded");
        self.session = Some(session);
        Ok(())
    }

    fn unbind(&mut self) -> Result<()> {
        // Dropping the session releases the provider's working set
        self.session = None;
        Ok(())
    }
}

/// Factory building [`OnnxScorer`]s from catalogue entries
#[derive(Debug, Default)]
pub struct OnnxScorerFactory;

impl OnnxScorerFactory {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ScorerFactory for OnnxScorerFactory {
    fn create_scorer(&self, entry: &CatalogueEntry) -> Result<Box<dyn Scorer>> {
        if !entry.weights.is_file() {
            return Err(SegmentationError::model(format!(
                "Model weights not found for '{}': {}",
                entry.name,
                entry.weights.display()
            )));
        }
        Ok(Box::new(OnnxScorer::new(
            entry.name.clone(),
            entry.weights.clone(),
            entry.convention,
        )))
    }
}
