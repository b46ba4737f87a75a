//! fleetgen - deployment artifact generator
//!
//! Generates deployment configuration artifacts (compose file, per-instance
//! reverse-proxy configs, per-instance service properties, environment file)
//! from a declarative YAML inventory describing a fleet of named instances
//! sharing a global configuration.

pub mod document;
pub mod inventory;
pub mod materialize;
pub mod merge;
pub mod net;
pub mod pipeline;
pub mod render;
pub mod validate;

pub use document::{load_document, DocumentError, DocumentSource, Mapping, Record, Value};
pub use inventory::{GlobalConfig, Instance, Inventory, ResolvedEnvironment};
pub use materialize::{materialize, ArtifactSummary, MaterializeError, TemplateSet};
pub use merge::{deep_merge, merge_layers};
pub use net::{Subnet, SubnetError};
pub use pipeline::{CheckReport, PipelineConfig, PipelineError, PipelineResult};
pub use render::{RenderError, Template};
pub use validate::{validate, SubnetFamily, Violation};
