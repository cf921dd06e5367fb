//! Configuration types for segmentation operations

use crate::error::{Result, SegmentationError};
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

/// Execution provider options for scoring backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl Default for ExecutionProvider {
    fn default() -> Self {
        Self::Auto
    }
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = SegmentationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(SegmentationError::invalid_config(format!(
                "Unknown execution provider: {other} (expected auto, cpu, cuda or coreml)"
            ))),
        }
    }
}

/// Resampling filter used for the final resize back to original resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResizeFilter {
    /// Nearest-neighbor (keeps masks strictly binary across the resize)
    Nearest,
    /// Bilinear interpolation
    Bilinear,
    /// Catmull-Rom cubic interpolation
    CatmullRom,
    /// Lanczos windowed sinc, 3-lobe
    Lanczos3,
}

impl Default for ResizeFilter {
    fn default() -> Self {
        Self::Bilinear
    }
}

impl ResizeFilter {
    /// Map to the `image` crate's filter type
    #[must_use]
    pub fn to_filter_type(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Bilinear => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Default blend weight of the source image over the recolored mask
pub const DEFAULT_ALPHA: f32 = 0.8;

/// Default model input resolution (square, pixels per side)
pub const DEFAULT_MODEL_INPUT_RESOLUTION: u32 = 1002;

/// Configuration for a segmentation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Blend weight: `alpha * image + (1 - alpha) * recolored mask`
    pub alpha: f32,

    /// Square resolution every image is resized to before scoring
    pub model_input_resolution: u32,

    /// Resampling filter for the final resize back to original dimensions
    pub resize_filter: ResizeFilter,

    /// Execution provider for scoring backends
    pub execution_provider: ExecutionProvider,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            model_input_resolution: DEFAULT_MODEL_INPUT_RESOLUTION,
            resize_filter: ResizeFilter::default(),
            execution_provider: ExecutionProvider::default(),
        }
    }
}

impl SegmentationConfig {
    /// Create a builder for custom configuration
    #[must_use]
    pub fn builder() -> SegmentationConfigBuilder {
        SegmentationConfigBuilder::new()
    }

    /// Validate configuration values
    ///
    /// # Errors
    /// - `InvalidConfig` when alpha is outside `0.0..=1.0` or not finite
    /// - `InvalidConfig` when the model input resolution is zero
    pub fn validate(&self) -> Result<()> {
        if !self.alpha.is_finite() || !(0.0..=1.0).contains(&self.alpha) {
            return Err(SegmentationError::config_value_error(
                "alpha",
                self.alpha,
                "0.0-1.0",
            ));
        }
        if self.model_input_resolution == 0 {
            return Err(SegmentationError::config_value_error(
                "model_input_resolution",
                self.model_input_resolution,
                "1 or greater",
            ));
        }
        Ok(())
    }
}

/// Builder for [`SegmentationConfig`]
#[derive(Debug, Clone, Default)]
pub struct SegmentationConfigBuilder {
    config: SegmentationConfig,
}

impl SegmentationConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the blend weight (clamped to `0.0..=1.0`)
    #[must_use]
    pub fn alpha(mut self, alpha: f32) -> Self {
        self.config.alpha = alpha.clamp(0.0, 1.0);
        self
    }

    /// Set the square model input resolution
    #[must_use]
    pub fn model_input_resolution(mut self, resolution: u32) -> Self {
        self.config.model_input_resolution = resolution;
        self
    }

    /// Set the resampling filter for the final resize
    #[must_use]
    pub fn resize_filter(mut self, filter: ResizeFilter) -> Self {
        self.config.resize_filter = filter;
        self
    }

    /// Set the execution provider for scoring backends
    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    /// Build the configuration, validating values
    ///
    /// # Errors
    /// - `InvalidConfig` when any setting fails [`SegmentationConfig::validate`]
    pub fn build(self) -> Result<SegmentationConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
