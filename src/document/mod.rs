//! Inventory document model
//!
//! Parses YAML inventory documents into a closed value model so that the
//! merge and validation stages dispatch on a fixed set of shapes instead
//! of probing types at runtime.

mod loader;
mod value;

pub use loader::{load_document, DocumentError, DocumentSource};
pub use value::{Mapping, Record, Value};
