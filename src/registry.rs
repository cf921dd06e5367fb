//! Model registry and accelerator-lease lifecycle
//!
//! The registry is built once at startup from a static catalogue and is
//! immutable afterwards, except for the accelerator-occupancy bookkeeping
//! that backs the scoped lease handed out around each scoring call.

use crate::adapter::OutputConvention;
use crate::config::ExecutionProvider;
use crate::error::{Result, SegmentationError};
use crate::inference::{RawPrediction, Scorer};
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, warn};

/// One entry of the static model catalogue a registry is built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogueEntry {
    /// Unique model name, also the artifact source label
    pub name: String,

    /// Location of the model weights
    pub weights: PathBuf,

    /// Declared output convention, fixed at registration time
    pub convention: OutputConvention,

    /// Marks the preferred checkpoint used when no model is requested
    /// explicitly; at most one entry may carry it
    #[serde(default)]
    pub preferred: bool,
}

/// Factory turning catalogue entries into scoring functions
///
/// The seam that keeps the registry independent of any concrete inference
/// backend; the ONNX backend provides the production implementation.
pub trait ScorerFactory {
    /// Create a scorer for one catalogue entry
    ///
    /// # Errors
    /// - Weight file missing or unreadable
    /// - Backend-specific model loading failures
    fn create_scorer(&self, entry: &CatalogueEntry) -> Result<Box<dyn Scorer>>;
}

/// A registered model: name, declared output convention and its scorer
///
/// The scorer sits behind a mutex because scoring requires exclusive access
/// to the backend session; everything else is immutable after registration.
#[derive(Debug)]
pub struct ModelDescriptor {
    name: String,
    convention: OutputConvention,
    scorer: Mutex<Box<dyn Scorer>>,
}

impl ModelDescriptor {
    /// Model name (unique registry key)
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared output convention
    #[must_use]
    pub fn convention(&self) -> OutputConvention {
        self.convention
    }
}

/// Process-wide mapping from model name to descriptor
pub struct ModelRegistry {
    models: BTreeMap<String, ModelDescriptor>,
    default_model: Option<String>,
    provider: ExecutionProvider,
    /// Name of the model currently occupying the accelerator, if any
    occupancy: Mutex<Option<String>>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.names())
            .field("default_model", &self.default_model)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl ModelRegistry {
    /// Create a builder for manual registration
    #[must_use]
    pub fn builder() -> ModelRegistryBuilder {
        ModelRegistryBuilder::new()
    }

    /// Build a registry from a static catalogue, creating one scorer per
    /// entry through the given factory
    ///
    /// # Errors
    /// - `InvalidConfig` on duplicate names or more than one preferred entry
    /// - Factory errors while loading a model
    pub fn from_catalogue(
        entries: &[CatalogueEntry],
        factory: &dyn ScorerFactory,
        provider: ExecutionProvider,
    ) -> Result<Self> {
        let mut builder = Self::builder().execution_provider(provider);
        for entry in entries {
            let scorer = factory.create_scorer(entry)?;
            builder = builder.register(entry.name.clone(), entry.convention, scorer);
            if entry.preferred {
                builder = builder.preferred(entry.name.clone());
            }
        }
        builder.build()
    }

    /// Look up a model descriptor by name
    ///
    /// # Errors
    /// - `UnknownModel` when the name is not present
    pub fn lookup(&self, name: &str) -> Result<&ModelDescriptor> {
        self.models
            .get(name)
            .ok_or_else(|| SegmentationError::unknown_model(name))
    }

    /// All registered model names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    /// The preferred model chosen at registry construction, if any
    #[must_use]
    pub fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    /// Number of registered models
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the registry holds no models
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Acquire exclusive accelerator occupancy for one model
    ///
    /// Binds the model's working set onto the configured provider and hands
    /// back a lease; dropping the lease unbinds the weights and releases
    /// occupancy, whether or not scoring succeeded. Two live leases within
    /// one request violate the sequential-accelerator contract.
    ///
    /// # Errors
    /// - `UnknownModel` when the name is not present
    /// - `Internal` when the accelerator is already occupied
    /// - Scorer bind failures
    pub fn lease(&self, name: &str) -> Result<AcceleratorLease<'_>> {
        let descriptor = self.lookup(name)?;

        {
            let mut occupancy = self
                .occupancy
                .lock()
                .map_err(|_| SegmentationError::internal("Accelerator state lock poisoned"))?;
            if let Some(ref occupant) = *occupancy {
                return Err(SegmentationError::internal(format!(
                    "Accelerator already occupied by '{occupant}' while leasing '{name}'"
                )));
            }
            *occupancy = Some(descriptor.name.clone());
        }

        debug!(model = %descriptor.name, provider = %self.provider, "Acquiring accelerator lease");
        let bind_result = descriptor
            .scorer
            .lock()
            .map_err(|_| SegmentationError::internal("Scorer lock poisoned"))
            .and_then(|mut scorer| scorer.bind(self.provider));

        if let Err(e) = bind_result {
            self.release_occupancy();
            return Err(e);
        }

        Ok(AcceleratorLease {
            registry: self,
            descriptor,
        })
    }

    fn release_occupancy(&self) {
        if let Ok(mut occupancy) = self.occupancy.lock() {
            *occupancy = None;
        }
    }
}

/// Scoped right to occupy accelerator memory for one model's scoring call
///
/// Releases occupancy and moves the weights back to host memory on drop.
pub struct AcceleratorLease<'r> {
    registry: &'r ModelRegistry,
    descriptor: &'r ModelDescriptor,
}

impl AcceleratorLease<'_> {
    /// Name of the leased model
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.descriptor.name
    }

    /// Run the leased model's scoring function
    ///
    /// # Errors
    /// - Scorer inference failures
    pub fn score(&self, input: &Array4<f32>) -> Result<RawPrediction> {
        self.descriptor
            .scorer
            .lock()
            .map_err(|_| SegmentationError::internal("Scorer lock poisoned"))?
            .score(input)
    }
}

impl Drop for AcceleratorLease<'_> {
    fn drop(&mut self) {
        match self.descriptor.scorer.lock() {
            Ok(mut scorer) => {
                if let Err(e) = scorer.unbind() {
                    warn!(model = %self.descriptor.name, error = %e, "Failed to release model weights");
                }
            },
            Err(_) => {
                warn!(model = %self.descriptor.name, "Scorer lock poisoned during lease release");
            },
        }
        self.registry.release_occupancy();
        debug!(model = %self.descriptor.name, "Released accelerator lease");
    }
}

/// Builder for [`ModelRegistry`]
#[derive(Debug, Default)]
pub struct ModelRegistryBuilder {
    entries: Vec<(String, OutputConvention, Box<dyn Scorer>)>,
    preferred: Vec<String>,
    provider: ExecutionProvider,
}

impl ModelRegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            preferred: Vec::new(),
            provider: ExecutionProvider::default(),
        }
    }

    /// Register a model under a unique name
    #[must_use]
    pub fn register<S: Into<String>>(
        mut self,
        name: S,
        convention: OutputConvention,
        scorer: Box<dyn Scorer>,
    ) -> Self {
        self.entries.push((name.into(), convention, scorer));
        self
    }

    /// Mark the preferred model (at most once)
    #[must_use]
    pub fn preferred<S: Into<String>>(mut self, name: S) -> Self {
        self.preferred.push(name.into());
        self
    }

    /// Set the execution provider leases bind models to
    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.provider = provider;
        self
    }

    /// Build the registry
    ///
    /// # Errors
    /// - `InvalidConfig` on duplicate model names, more than one preferred
    ///   name, or a preferred name that was never registered
    pub fn build(self) -> Result<ModelRegistry> {
        let mut models = BTreeMap::new();
        for (name, convention, scorer) in self.entries {
            if models.contains_key(&name) {
                return Err(SegmentationError::invalid_config(format!(
                    "Duplicate model name in catalogue: {name}"
                )));
            }
            models.insert(
                name.clone(),
                ModelDescriptor {
                    name,
                    convention,
                    scorer: Mutex::new(scorer),
                },
            );
        }

        if self.preferred.len() > 1 {
            return Err(SegmentationError::invalid_config(format!(
                "More than one preferred model in catalogue: {}",
                self.preferred.join(", ")
            )));
        }
        let default_model = self.preferred.into_iter().next();
        if let Some(ref name) = default_model {
            if !models.contains_key(name) {
                return Err(SegmentationError::invalid_config(format!(
                    "Preferred model is not in the catalogue: {name}"
                )));
            }
        }

        Ok(ModelRegistry {
            models,
            default_model,
            provider: self.provider,
            occupancy: Mutex::new(None),
        })
    }
}
