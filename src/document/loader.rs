//! Document loading with source provenance
//!
//! Reads YAML inventory documents from disk. A missing document is an
//! empty mapping, not an error, since the private override file is
//! optional.
//! Each document actually read contributes a [`DocumentSource`] entry
//! (path plus SHA-256 of the raw bytes) to the check report.

use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::{Mapping, Value};

/// Errors raised while loading or parsing a document.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("mapping key is not a string: {0}")]
    NonStringKey(String),

    #[error("document root is not a mapping: {path}")]
    NonMappingRoot { path: String },
}

/// Provenance of a contributing document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSource {
    /// Path the document was read from.
    pub path: String,

    /// SHA-256 digest of the raw file bytes.
    pub digest: String,
}

/// Load a document from `path` as a mapping.
///
/// Returns an empty mapping and no provenance when the file does not
/// exist. An empty file also yields an empty mapping.
pub fn load_document(path: &Path) -> Result<(Mapping, Option<DocumentSource>), DocumentError> {
    if !path.exists() {
        return Ok((Mapping::new(), None));
    }

    let raw = std::fs::read(path)?;
    let digest = hex::encode(Sha256::digest(&raw));
    let source = DocumentSource {
        path: path.to_string_lossy().to_string(),
        digest,
    };

    let yaml: serde_yaml::Value = serde_yaml::from_slice(&raw)?;
    let mapping = match Value::from_yaml(yaml)? {
        Value::Mapping(map) => map,
        Value::Null => Mapping::new(),
        _ => {
            return Err(DocumentError::NonMappingRoot {
                path: path.to_string_lossy().to_string(),
            })
        }
    };

    Ok((mapping, Some(source)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_document_is_empty() {
        let dir = TempDir::new().unwrap();
        let (mapping, source) = load_document(&dir.path().join("absent.yml")).unwrap();
        assert!(mapping.is_empty());
        assert!(source.is_none());
    }

    #[test]
    fn test_empty_document_is_empty_mapping() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.yml");
        fs::write(&path, "").unwrap();
        let (mapping, source) = load_document(&path).unwrap();
        assert!(mapping.is_empty());
        assert!(source.is_some());
    }

    #[test]
    fn test_loads_mapping_with_digest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("inventory.yml");
        fs::write(&path, "global:\n  project_name: fleet\n").unwrap();

        let (mapping, source) = load_document(&path).unwrap();
        assert_eq!(
            mapping["global"].get("project_name"),
            Some(&Value::String("fleet".to_string()))
        );

        let source = source.unwrap();
        assert_eq!(source.digest.len(), 64);
    }

    #[test]
    fn test_malformed_yaml_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yml");
        fs::write(&path, "global: [unclosed\n").unwrap();
        assert!(matches!(
            load_document(&path),
            Err(DocumentError::Yaml(_))
        ));
    }

    #[test]
    fn test_scalar_root_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scalar.yml");
        fs::write(&path, "just a string\n").unwrap();
        assert!(matches!(
            load_document(&path),
            Err(DocumentError::NonMappingRoot { .. })
        ));
    }
}
