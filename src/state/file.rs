//! JSON file persistence with an integrity checksum.
//!
//! On disk the document is `{ "structure": {...}, "checksum": "<sha256>" }`.
//! The checksum covers the compact JSON encoding of `structure` (object keys
//! sorted). A bare structure document without the envelope is also accepted
//! on load so hand-written definition files work.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::structure::{DefinitionStructure, PersistenceCollaborator};
use crate::error::{Result, SignalError};

#[derive(Serialize, Deserialize)]
struct Envelope {
    structure: Value,
    checksum: String,
}

/// SHA-256 of the canonical encoding of `structure`.
pub fn structure_checksum(structure: &Value) -> Result<String> {
    let bytes = serde_json::to_vec(structure)?;
    let hash = Sha256::digest(&bytes);
    Ok(format!("{:x}", hash))
}

/// What [`JsonFilePersistence::inspect`] found in a file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    /// Version as stored, before migration.
    pub stored_version: u64,
    /// `None` for a bare structure without checksum.
    pub checksum_verified: Option<bool>,
    pub structure: DefinitionStructure,
}

/// Persists definitions to one JSON file.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read, verify and migrate the file.
    pub fn inspect(&self) -> Result<FileReport> {
        let content = fs::read_to_string(&self.path).map_err(|e| SignalError::FileReadError {
            path: self.path.clone(),
            source: e,
        })?;
        let data: Value = serde_json::from_str(&content)?;

        let (structure, checksum_verified) = if data.get("structure").is_some() {
            let envelope: Envelope = serde_json::from_value(data)?;
            let actual = structure_checksum(&envelope.structure)?;
            if actual != envelope.checksum {
                return Err(SignalError::ChecksumMismatch {
                    path: self.path.clone(),
                    expected: envelope.checksum,
                    actual,
                });
            }
            (envelope.structure, Some(true))
        } else {
            (data, None)
        };

        let stored_version = super::migration::structure_version(&structure)?;
        let structure = DefinitionStructure::from_value(structure)?;
        debug!(
            path = %self.path.display(),
            stored_version,
            signals = structure.signals.len(),
            "loaded definition structure"
        );
        Ok(FileReport {
            stored_version,
            checksum_verified,
            structure,
        })
    }
}

impl PersistenceCollaborator for JsonFilePersistence {
    fn sync_definitions(&self, structure: &DefinitionStructure) -> Result<()> {
        let structure = serde_json::to_value(structure)?;
        let checksum = structure_checksum(&structure)?;
        let content = serde_json::to_string_pretty(&Envelope {
            structure,
            checksum,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| SignalError::FileWriteError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        fs::write(&self.path, content).map_err(|e| SignalError::FileWriteError {
            path: self.path.clone(),
            source: e,
        })?;
        info!(path = %self.path.display(), "definitions synced");
        Ok(())
    }

    fn get_structure_for_project(&self) -> Result<Option<DefinitionStructure>> {
        if !self.path.exists() {
            return Ok(None);
        }
        Ok(Some(self.inspect()?.structure))
    }
}
