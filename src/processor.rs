//! Unified segmentation processor
//!
//! Ties the pipeline stages together for one request: normalize the input
//! image, fan out over the requested models, combine ensembles when two or
//! more masks exist, and composite every mask into its artifact pair.

use crate::compositor::Compositor;
use crate::config::SegmentationConfig;
use crate::ensemble;
use crate::error::{Result, SegmentationError};
use crate::orchestrator::{InferenceOrchestrator, ModelMask};
use crate::preprocessing::{self, PreprocessingConfig};
use crate::registry::ModelRegistry;
use crate::types::{
    CompositeArtifact, NormalizedImage, PredictionSet, ProcessingMetadata, ProcessingTimings,
};
use image::DynamicImage;
use instant::Instant;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Request-scoped segmentation pipeline over an immutable model registry
#[derive(Debug)]
pub struct SegmentationProcessor {
    config: SegmentationConfig,
    registry: ModelRegistry,
}

impl SegmentationProcessor {
    /// Create a processor from a validated configuration and a registry
    ///
    /// # Errors
    /// - `InvalidConfig` when the configuration fails validation
    pub fn new(config: SegmentationConfig, registry: ModelRegistry) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, registry })
    }

    /// The active configuration
    #[must_use]
    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// The model registry backing this processor
    #[must_use]
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Run the full pipeline for one image and a set of requested models
    ///
    /// Returns one artifact per requested model (in request order, duplicates
    /// removed) and, when two or more models were requested, `"Ensemble AND"`
    /// and `"Ensemble OR"` artifacts appended at the end. Requesting zero
    /// models yields an empty artifact set.
    ///
    /// # Errors
    /// - `UnknownModel` when any requested name is absent (the whole request
    ///   fails; no partial artifact set is returned)
    /// - Scoring, canonicalization and compositing failures
    #[instrument(
        skip(self, image),
        fields(
            models = ?model_names,
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    pub fn process_image(
        &self,
        image: &DynamicImage,
        model_names: &[String],
    ) -> Result<PredictionSet> {
        let mut timings = ProcessingTimings::default();
        let total_start = Instant::now();
        let preprocessing_config =
            PreprocessingConfig::with_target_size(self.config.model_input_resolution);

        let normalized = self.normalize(image, &preprocessing_config, &mut timings)?;
        let masks = self.infer(&normalized, preprocessing_config, model_names, &mut timings)?;
        let ensembles = self.combine(&masks, &mut timings)?;
        let artifacts = self.render(&normalized, &masks, &ensembles, &mut timings)?;

        timings.total_ms = total_start.elapsed().as_millis() as u64;
        info!(
            artifacts = artifacts.len(),
            total_ms = timings.total_ms,
            "Segmentation request complete"
        );

        let mut metadata =
            ProcessingMetadata::new(masks.into_iter().map(|m| m.model).collect());
        metadata.timings = timings;

        Ok(PredictionSet {
            artifacts,
            metadata,
        })
    }

    /// Run the pipeline on encoded image bytes (PNG, JPEG, TIFF, ...)
    ///
    /// # Errors
    /// - `Processing` when the bytes cannot be decoded
    /// - Everything [`Self::process_image`] can fail with
    pub fn process_bytes(&self, image_bytes: &[u8], model_names: &[String]) -> Result<PredictionSet> {
        let image = image::load_from_memory(image_bytes).map_err(|e| {
            SegmentationError::processing(format!("Failed to decode image from bytes: {e}"))
        })?;
        self.process_image(&image, model_names)
    }

    /// Run the pipeline on an image file
    ///
    /// # Errors
    /// - `Processing` when the file cannot be read or decoded
    /// - Everything [`Self::process_image`] can fail with
    pub fn process_file<P: AsRef<Path>>(
        &self,
        input_path: P,
        model_names: &[String],
    ) -> Result<PredictionSet> {
        let path = input_path.as_ref();
        let image = image::open(path).map_err(|e| {
            SegmentationError::processing(format!(
                "Failed to load image '{}': {e}",
                path.display()
            ))
        })?;
        self.process_image(&image, model_names)
    }

    /// Run the pipeline with the registry's preferred model
    ///
    /// # Errors
    /// - `InvalidConfig` when the registry has no preferred model
    /// - Everything [`Self::process_image`] can fail with
    pub fn process_with_preferred(&self, image: &DynamicImage) -> Result<PredictionSet> {
        let preferred = self.registry.default_model().ok_or_else(|| {
            SegmentationError::invalid_config("No preferred model configured in the registry")
        })?;
        self.process_image(image, &[preferred.to_string()])
    }

    fn normalize(
        &self,
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
        timings: &mut ProcessingTimings,
    ) -> Result<NormalizedImage> {
        let start = Instant::now();
        let normalized = preprocessing::normalize_image(
            image,
            preprocessing_config,
            self.config.resize_filter.to_filter_type(),
        )?;
        timings.preprocessing_ms = start.elapsed().as_millis() as u64;
        Ok(normalized)
    }

    fn infer(
        &self,
        normalized: &NormalizedImage,
        preprocessing_config: PreprocessingConfig,
        model_names: &[String],
        timings: &mut ProcessingTimings,
    ) -> Result<Vec<ModelMask>> {
        let start = Instant::now();
        let orchestrator = InferenceOrchestrator::new(&self.registry, preprocessing_config);
        let masks = orchestrator.infer_all(normalized, model_names)?;
        timings.inference_ms = start.elapsed().as_millis() as u64;
        Ok(masks)
    }

    fn combine(
        &self,
        masks: &[ModelMask],
        timings: &mut ProcessingTimings,
    ) -> Result<Vec<crate::types::EnsembleResult>> {
        let start = Instant::now();
        let ensembles = ensemble::combine(masks)?;
        timings.ensemble_ms = start.elapsed().as_millis() as u64;
        if !ensembles.is_empty() {
            debug!(members = masks.len(), "Combined ensemble masks");
        }
        Ok(ensembles)
    }

    fn render(
        &self,
        normalized: &NormalizedImage,
        masks: &[ModelMask],
        ensembles: &[crate::types::EnsembleResult],
        timings: &mut ProcessingTimings,
    ) -> Result<Vec<CompositeArtifact>> {
        let start = Instant::now();
        let compositor = Compositor::from_config(&self.config);

        let mut artifacts = Vec::with_capacity(masks.len() + ensembles.len());
        for entry in masks {
            artifacts.push(compositor.composite(normalized, &entry.mask, &entry.model)?);
        }
        for result in ensembles {
            artifacts.push(compositor.composite(normalized, &result.mask, &result.label())?);
        }

        timings.compositing_ms = start.elapsed().as_millis() as u64;
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::OutputConvention;
    use crate::backends::test_utils::StaticScorer;
    use image::RgbImage;
    use ndarray::array;

    fn test_processor() -> SegmentationProcessor {
        let registry = ModelRegistry::builder()
            .register(
                "HRNet Seg",
                OutputConvention::Classification,
                Box::new(StaticScorer::classification_from_mask(&array![
                    [1u8, 0],
                    [1, 1]
                ])),
            )
            .register(
                "U2Net Seg",
                OutputConvention::Classification,
                Box::new(StaticScorer::classification_from_mask(&array![
                    [1u8, 1],
                    [0, 1]
                ])),
            )
            .preferred("HRNet Seg")
            .build()
            .unwrap();

        let config = SegmentationConfig::builder()
            .model_input_resolution(2)
            .build()
            .unwrap();
        SegmentationProcessor::new(config, registry).unwrap()
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    fn test_image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(20, 10))
    }

    #[test]
    fn test_two_models_yield_four_artifacts() {
        let set = test_processor()
            .process_image(&test_image(), &names(&["HRNet Seg", "U2Net Seg"]))
            .unwrap();

        let labels: Vec<&str> = set.artifacts.iter().map(|a| a.source_label.as_str()).collect();
        assert_eq!(
            labels,
            ["HRNet Seg", "U2Net Seg", "Ensemble AND", "Ensemble OR"]
        );
        assert_eq!(set.metadata.model_names, vec!["HRNet Seg", "U2Net Seg"]);

        // Every artifact is rendered at the original resolution
        for artifact in &set.artifacts {
            assert_eq!(artifact.mask_image.dimensions(), (20, 10));
            assert_eq!(artifact.blend_image.dimensions(), (20, 10));
        }
    }

    #[test]
    fn test_single_model_has_no_ensembles() {
        let set = test_processor()
            .process_image(&test_image(), &names(&["U2Net Seg"]))
            .unwrap();

        assert_eq!(set.artifacts.len(), 1);
        assert_eq!(set.artifacts[0].source_label, "U2Net Seg");
    }

    #[test]
    fn test_zero_models_is_empty_not_error() {
        let set = test_processor().process_image(&test_image(), &[]).unwrap();
        assert!(set.artifacts.is_empty());
        assert!(set.metadata.model_names.is_empty());
    }

    #[test]
    fn test_unknown_model_fails_whole_request() {
        let err = test_processor()
            .process_image(&test_image(), &names(&["HRNet Seg", "UNKNOWN"]))
            .unwrap_err();
        assert!(matches!(err, SegmentationError::UnknownModel(ref n) if n == "UNKNOWN"));
    }

    #[test]
    fn test_preferred_model_shortcut() {
        let set = test_processor().process_with_preferred(&test_image()).unwrap();
        assert_eq!(set.artifacts.len(), 1);
        assert_eq!(set.artifacts[0].source_label, "HRNet Seg");
    }

    #[test]
    fn test_invalid_bytes_are_processing_error() {
        let err = test_processor()
            .process_bytes(b"not an image", &names(&["HRNet Seg"]))
            .unwrap_err();
        assert!(matches!(err, SegmentationError::Processing(_)));
    }
}
