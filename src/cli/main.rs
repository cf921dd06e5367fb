//! Spheroid segmentation CLI
//!
//! Loads a static model catalogue, runs the requested models over image
//! files or directories, and writes `_pred` / `_blend` artifacts next to the
//! inputs or into an output directory.

use crate::backends::OnnxScorerFactory;
use crate::config::{ExecutionProvider, SegmentationConfig};
use crate::processor::SegmentationProcessor;
use crate::registry::{CatalogueEntry, ModelRegistry};
use crate::types::PredictionSet;
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// File extensions the CLI picks up when batching a directory
const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff"];

/// Spheroid segmentation CLI tool
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "spheroid-seg")]
pub struct Cli {
    /// Input image files or directories
    #[arg(value_name = "INPUT", required_unless_present = "list_models")]
    pub input: Vec<PathBuf>,

    /// Output directory [default: alongside each input file]
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Model catalogue file (JSON array of name/weights/convention entries)
    #[arg(short, long, value_name = "FILE", default_value = "catalogue.json")]
    pub catalogue: PathBuf,

    /// Model to run; repeat for ensembles [default: the preferred model]
    #[arg(short, long = "model", value_name = "NAME")]
    pub models: Vec<String>,

    /// Blend weight of the source image over the recolored mask
    #[arg(long, default_value_t = crate::config::DEFAULT_ALPHA)]
    pub alpha: f32,

    /// Square model input resolution
    #[arg(long, default_value_t = crate::config::DEFAULT_MODEL_INPUT_RESOLUTION)]
    pub resolution: u32,

    /// Execution provider (auto, cpu, cuda, coreml)
    #[arg(short, long, default_value = "auto")]
    pub execution_provider: String,

    /// List catalogue models and exit
    #[arg(long)]
    pub list_models: bool,

    /// Enable verbose logging (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// CLI entry point
///
/// # Errors
/// - Catalogue loading or registry construction failures
/// - No processable input files
pub fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let provider: ExecutionProvider = cli
        .execution_provider
        .parse()
        .context("Invalid execution provider")?;

    let entries = load_catalogue(&cli.catalogue)?;
    let registry = ModelRegistry::from_catalogue(&entries, &OnnxScorerFactory::new(), provider)
        .context("Failed to build model registry")?;

    if cli.list_models {
        for name in registry.names() {
            if registry.default_model() == Some(name.as_str()) {
                println!("{name} (preferred)");
            } else {
                println!("{name}");
            }
        }
        return Ok(());
    }

    let model_names = if cli.models.is_empty() {
        let preferred = registry.default_model().context(
            "No model requested and the catalogue marks none as preferred; pass --model",
        )?;
        vec![preferred.to_string()]
    } else {
        cli.models.clone()
    };

    let config = SegmentationConfig::builder()
        .alpha(cli.alpha)
        .model_input_resolution(cli.resolution)
        .execution_provider(provider)
        .build()
        .context("Invalid configuration")?;
    let processor = SegmentationProcessor::new(config, registry)?;

    let files = collect_input_files(&cli.input)?;
    if files.is_empty() {
        bail!("No processable image files found in the given inputs");
    }

    if let Some(ref output) = cli.output {
        std::fs::create_dir_all(output)
            .with_context(|| format!("Failed to create output directory '{}'", output.display()))?;
    }

    let mut processed = 0usize;
    let mut failed = 0usize;
    for file in &files {
        match process_one(&processor, file, &model_names, cli.output.as_deref()) {
            Ok(()) => processed += 1,
            Err(e) => {
                failed += 1;
                error!(file = %file.display(), error = %e, "Failed to process image");
            },
        }
    }

    info!(processed, failed, "Batch complete");
    if processed == 0 {
        bail!("All {failed} input file(s) failed to process");
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Load the catalogue file, resolving relative weight paths against the
/// catalogue's own directory
fn load_catalogue(path: &Path) -> Result<Vec<CatalogueEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalogue '{}'", path.display()))?;
    let mut entries: Vec<CatalogueEntry> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse catalogue '{}'", path.display()))?;

    if let Some(base) = path.parent() {
        for entry in &mut entries {
            if entry.weights.is_relative() {
                entry.weights = base.join(&entry.weights);
            }
        }
    }
    Ok(entries)
}

/// Expand files and one level of directory contents into a processable list
///
/// Earlier artifacts (`*_pred.*`, `*_blend.*`) found in a directory are
/// skipped so re-running over an output folder does not cascade.
fn collect_input_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut dir_files: Vec<PathBuf> = std::fs::read_dir(input)
                .with_context(|| format!("Failed to read directory '{}'", input.display()))?
                .filter_map(std::result::Result::ok)
                .map(|e| e.path())
                .filter(|p| p.is_file() && is_processable(p))
                .collect();
            dir_files.sort();
            files.extend(dir_files);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

fn is_processable(path: &Path) -> bool {
    let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    if !SUPPORTED_EXTENSIONS.contains(&extension.to_lowercase().as_str()) {
        return false;
    }
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_lowercase();
    !stem.ends_with("_pred") && !stem.ends_with("_blend")
}

fn process_one(
    processor: &SegmentationProcessor,
    file: &Path,
    model_names: &[String],
    output_dir: Option<&Path>,
) -> Result<()> {
    let set = processor.process_file(file, model_names)?;
    let target_dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => file.parent().unwrap_or_else(|| Path::new(".")).to_path_buf(),
    };
    save_artifacts(&set, file, &target_dir)?;

    info!(
        file = %file.display(),
        artifacts = set.artifacts.len(),
        total_ms = set.metadata.timings.total_ms,
        "Processed image"
    );
    Ok(())
}

/// Write `<stem>_pred.png` / `<stem>_blend.png` pairs; with more than one
/// artifact the source label is slugged into the file name
fn save_artifacts(set: &PredictionSet, input: &Path, target_dir: &Path) -> Result<()> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");

    for artifact in &set.artifacts {
        let (mask_name, blend_name) = if set.artifacts.len() == 1 {
            (format!("{stem}_pred.png"), format!("{stem}_blend.png"))
        } else {
            let slug = label_slug(&artifact.source_label);
            (
                format!("{stem}_{slug}_pred.png"),
                format!("{stem}_{slug}_blend.png"),
            )
        };
        artifact
            .save_mask_png(target_dir.join(&mask_name))
            .with_context(|| format!("Failed to save '{mask_name}'"))?;
        artifact
            .save_blend_png(target_dir.join(&blend_name))
            .with_context(|| format!("Failed to save '{blend_name}'"))?;
    }
    Ok(())
}

fn label_slug(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}
