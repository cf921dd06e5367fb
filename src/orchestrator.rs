//! Fan-out of one normalized image over the requested models

use crate::error::Result;
use crate::preprocessing::{self, PreprocessingConfig};
use crate::registry::ModelRegistry;
use crate::types::{CanonicalMask, NormalizedImage};
use tracing::debug;

/// One model's canonical mask, tagged with the producing model's name
#[derive(Debug, Clone)]
pub struct ModelMask {
    pub model: String,
    pub mask: CanonicalMask,
}

/// Drives the registry and adapters to produce one canonical mask per
/// requested model
///
/// Masks are computed sequentially in request order; the accelerator lease
/// around each scoring call keeps multi-model requests sequential at the
/// accelerator by construction.
pub struct InferenceOrchestrator<'r> {
    registry: &'r ModelRegistry,
    preprocessing: PreprocessingConfig,
}

impl<'r> InferenceOrchestrator<'r> {
    #[must_use]
    pub fn new(registry: &'r ModelRegistry, preprocessing: PreprocessingConfig) -> Self {
        Self {
            registry,
            preprocessing,
        }
    }

    /// Produce one canonical mask per requested model
    ///
    /// Duplicate names are dropped, keeping the first occurrence's position.
    /// An empty request yields an empty mask set. Any unknown name fails the
    /// whole call before a single model is scored, so a malformed request
    /// never produces a partial mask set.
    ///
    /// # Errors
    /// - `UnknownModel` naming the first offending entry
    /// - Lease, scoring and canonicalization failures for any model
    pub fn infer_all(
        &self,
        image: &NormalizedImage,
        model_names: &[String],
    ) -> Result<Vec<ModelMask>> {
        let requested = dedupe_preserving_order(model_names);

        // Fail fast on unknown names: masks for one image must be
        // comparable as a set, so a malformed request runs nothing
        for name in &requested {
            self.registry.lookup(name)?;
        }

        if requested.is_empty() {
            return Ok(Vec::new());
        }

        let input = preprocessing::to_input_tensor(image, &self.preprocessing);
        let resolution = image.resolution();

        let mut masks = Vec::with_capacity(requested.len());
        for name in requested {
            let descriptor = self.registry.lookup(&name)?;

            // Exclusive accelerator occupancy for exactly this scoring call
            let raw = {
                let lease = self.registry.lease(&name)?;
                lease.score(&input)?
            };

            let mask = descriptor.convention().canonicalize(&name, raw, resolution)?;
            debug!(
                model = %name,
                foreground_ratio = f64::from(mask.statistics().foreground_ratio),
                "Canonicalized model output"
            );
            masks.push(ModelMask { model: name, mask });
        }

        Ok(masks)
    }
}

fn dedupe_preserving_order(names: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    names
        .iter()
        .filter(|name| seen.insert(name.as_str()))
        .cloned()
        .collect()
}
