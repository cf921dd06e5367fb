#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]

//! # Spheroid Segmentation Library
//!
//! Serves binary segmentation predictions for biomedical micrographs: a
//! normalized image is scored by one or more independently-trained models,
//! their heterogeneous outputs are reconciled into canonical binary masks,
//! multiple masks are combined into AND/OR ensembles, and every mask is
//! rendered as a raw mask image plus a color-blended overlay at the image's
//! original resolution.
//!
//! ## Pipeline
//!
//! - **Registry**: immutable name → model mapping built once from a static
//!   catalogue; hands out scoped accelerator leases around scoring calls
//! - **Orchestrator**: fans one image out over the requested models and
//!   canonicalizes each model's raw output by its declared convention
//!   (classification, threshold or instance head)
//! - **Ensemble**: AND/OR combination when two or more masks exist
//! - **Compositor**: recolors each mask (tumour blue on white), blends it
//!   under the source image and resizes back to the original dimensions
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spheroid_seg::{
//!     CatalogueEntry, ExecutionProvider, ModelRegistry, OnnxScorerFactory,
//!     OutputConvention, SegmentationConfig, SegmentationProcessor,
//! };
//!
//! # fn example() -> spheroid_seg::Result<()> {
//! // One-time setup: build the registry from a static catalogue
//! let entries = vec![CatalogueEntry {
//!     name: "HRNet Seg".to_string(),
//!     weights: "models/hrnet.onnx".into(),
//!     convention: OutputConvention::Classification,
//!     preferred: true,
//! }];
//! let registry = ModelRegistry::from_catalogue(
//!     &entries,
//!     &OnnxScorerFactory::new(),
//!     ExecutionProvider::Auto,
//! )?;
//! let processor = SegmentationProcessor::new(SegmentationConfig::default(), registry)?;
//!
//! // Per request: one image, a list of model names, one artifact set back
//! let image = image::open("well_a01.png")?;
//! let set = processor.process_image(&image, &["HRNet Seg".to_string()])?;
//! for artifact in &set.artifacts {
//!     artifact.save_blend_png(format!("{}_blend.png", artifact.source_label))?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `onnx` (default): ONNX Runtime scoring backend with CUDA/CoreML support
//! - `cli` (default): the `spheroid-seg` command-line tool

pub mod adapter;
pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod ensemble;
pub mod error;
pub mod inference;
pub mod orchestrator;
pub mod preprocessing;
pub mod processor;
pub mod registry;
pub mod types;

pub use adapter::OutputConvention;
pub use compositor::Compositor;
pub use config::{
    ExecutionProvider, ResizeFilter, SegmentationConfig, SegmentationConfigBuilder, DEFAULT_ALPHA,
    DEFAULT_MODEL_INPUT_RESOLUTION,
};
pub use error::{Result, SegmentationError};
pub use inference::{InstanceDetection, RawPrediction, Scorer};
pub use orchestrator::{InferenceOrchestrator, ModelMask};
pub use preprocessing::PreprocessingConfig;
pub use processor::SegmentationProcessor;
pub use registry::{
    AcceleratorLease, CatalogueEntry, ModelDescriptor, ModelRegistry, ModelRegistryBuilder,
    ScorerFactory,
};
pub use types::{
    CanonicalMask, CompositeArtifact, EnsembleOp, EnsembleResult, MaskStatistics, NormalizedImage,
    PredictionSet, ProcessingMetadata, ProcessingTimings,
};

#[cfg(feature = "onnx")]
pub use backends::{OnnxScorer, OnnxScorerFactory};
