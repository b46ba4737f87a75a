//! Pipeline orchestration
//!
//! Runs the full generation pipeline:
//! - Load the base inventory and optional private override
//! - Merge the two documents
//! - Validate the merged inventory (the gate)
//! - Materialize the artifact set
//!
//! Any validator failure short-circuits before anything is written. The
//! pipeline is strictly sequential and holds no state between runs;
//! re-running on identical inputs produces byte-identical outputs.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::document::{load_document, DocumentError, DocumentSource, Value};
use crate::inventory::Inventory;
use crate::materialize::{materialize, ArtifactSummary, MaterializeError, TemplateSet};
use crate::merge::merge_layers;
use crate::validate::Violation;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    #[error("validation error: {0}")]
    Validation(#[from] Violation),

    #[error("materialization error: {0}")]
    Materialize(#[from] MaterializeError),
}

impl PipelineError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Document(_) => 1,
            PipelineError::Validation(_) => 2,
            PipelineError::Materialize(MaterializeError::Render(_)) => 3,
            PipelineError::Materialize(MaterializeError::Io(_)) => 1,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Path to the base inventory document.
    pub inventory_path: PathBuf,

    /// Path to the private override document. Absence is not an error.
    pub overrides_path: PathBuf,

    /// Templates directory; built-in templates when unset.
    pub templates_dir: Option<PathBuf>,

    /// Output directory for the artifact set.
    pub out_dir: PathBuf,

    /// Verbose progress on stderr.
    pub verbose: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inventory_path: PathBuf::from("inventory.yml"),
            overrides_path: PathBuf::from("inventory.private.yml"),
            templates_dir: None,
            out_dir: PathBuf::from("generated"),
            verbose: false,
        }
    }
}

/// Outcome of a `check` run: the merged inventory passed validation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckReport {
    /// Contributing documents in precedence order, with digests.
    pub sources: Vec<DocumentSource>,

    /// Number of instances in the merged inventory.
    pub instance_count: usize,

    /// Instance names in sequence order.
    pub instances: Vec<String>,

    /// Global subnets, as validated.
    pub subnet_ipv4: String,
    pub subnet_ipv6: String,
}

/// Load both documents and merge them, base first.
pub fn load_and_merge(
    config: &PipelineConfig,
) -> PipelineResult<(Value, Vec<DocumentSource>)> {
    let (base, base_source) = load_document(&config.inventory_path)?;
    let (overrides, override_source) = load_document(&config.overrides_path)?;

    let sources: Vec<DocumentSource> =
        [base_source, override_source].into_iter().flatten().collect();

    let merged = merge_layers(vec![Value::Mapping(base), Value::Mapping(overrides)]);
    Ok((merged, sources))
}

/// Load, merge, and validate; no artifacts are touched.
pub fn check(config: &PipelineConfig) -> PipelineResult<CheckReport> {
    let (merged, sources) = load_and_merge(config)?;
    let inventory = Inventory::resolve(&merged)?;

    Ok(CheckReport {
        sources,
        instance_count: inventory.instances.len(),
        instances: inventory.instances.iter().map(|i| i.name.clone()).collect(),
        subnet_ipv4: inventory.global.subnet_ipv4.to_string(),
        subnet_ipv6: inventory.global.subnet_ipv6.to_string(),
    })
}

/// Run the full pipeline: load, merge, validate, materialize.
pub fn run(config: &PipelineConfig) -> PipelineResult<ArtifactSummary> {
    if config.verbose {
        eprintln!("Loading {}...", config.inventory_path.display());
    }
    let (merged, sources) = load_and_merge(config)?;
    if config.verbose {
        eprintln!("Merged {} document(s)", sources.len());
    }

    let inventory = Inventory::resolve(&merged)?;
    if config.verbose {
        eprintln!(
            "Inventory valid: {} instance(s) in {}",
            inventory.instances.len(),
            inventory.global.subnet_ipv4
        );
    }

    let templates = match &config.templates_dir {
        Some(dir) => TemplateSet::load_dir(dir)?,
        None => TemplateSet::builtin(),
    };

    let summary = materialize(&inventory, &templates, &config.out_dir)?;
    if config.verbose {
        for relative in &summary.files {
            eprintln!("Wrote: {}", Path::new(&summary.out_dir).join(relative).display());
        }
    }

    Ok(summary)
}
