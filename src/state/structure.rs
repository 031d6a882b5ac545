//! Persisted definition structure and the persistence seam.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::migration::{migrate_structure, CURRENT_STRUCTURE_VERSION};
use crate::error::Result;
use crate::signal::{SignalDefinition, SignalDefinitionStore};

/// Everything about derived signals that leaves the engine. Computed results
/// are never part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionStructure {
    pub version: u64,
    pub signals: Vec<SignalDefinition>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl DefinitionStructure {
    /// Snapshot of a definition store.
    pub fn from_store(store: &SignalDefinitionStore) -> Self {
        Self {
            version: CURRENT_STRUCTURE_VERSION,
            signals: store.signals().to_vec(),
            created_at: store.created_at(),
            modified_at: store.modified_at(),
        }
    }

    /// Parse a structure document of any supported version.
    pub fn from_value(data: serde_json::Value) -> Result<Self> {
        let migrated = migrate_structure(data)?;
        Ok(serde_json::from_value(migrated)?)
    }

    pub fn into_store(self) -> SignalDefinitionStore {
        SignalDefinitionStore::from_parts(self.signals, self.created_at, self.modified_at)
    }
}

/// Where definitions are stored between sessions.
pub trait PersistenceCollaborator: Send + Sync {
    /// Store the current definition set.
    fn sync_definitions(&self, structure: &DefinitionStructure) -> Result<()>;

    /// The stored definition set, if one exists.
    fn get_structure_for_project(&self) -> Result<Option<DefinitionStructure>>;
}

/// Keeps the last synced structure in memory.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    structure: RwLock<Option<DefinitionStructure>>,
    read_only: bool,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeded with `structure`.
    pub fn with_structure(structure: DefinitionStructure) -> Self {
        Self {
            structure: RwLock::new(Some(structure)),
            read_only: false,
        }
    }

    /// Seeded with `structure`; later syncs are ignored.
    pub fn read_only(structure: DefinitionStructure) -> Self {
        Self {
            structure: RwLock::new(Some(structure)),
            read_only: true,
        }
    }

    pub fn snapshot(&self) -> Option<DefinitionStructure> {
        self.structure
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PersistenceCollaborator for InMemoryPersistence {
    fn sync_definitions(&self, structure: &DefinitionStructure) -> Result<()> {
        if !self.read_only {
            *self.structure.write().unwrap_or_else(PoisonError::into_inner) =
                Some(structure.clone());
        }
        Ok(())
    }

    fn get_structure_for_project(&self) -> Result<Option<DefinitionStructure>> {
        Ok(self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_migrates_v1() {
        let data = json!({
            "version": 1,
            "signals": [{
                "id": "a",
                "name": "A",
                "polarity": "positive",
                "source": {
                    "kind": "1d",
                    "signalRef": { "kind": "mir", "audioSourceId": "track", "functionId": "rms" }
                },
                "createdAt": "2026-01-01T00:00:00Z",
                "modifiedAt": "2026-01-01T00:00:00Z"
            }],
            "createdAt": "2026-01-01T00:00:00Z",
            "modifiedAt": "2026-01-01T00:00:00Z"
        });
        let structure = DefinitionStructure::from_value(data).unwrap();
        assert_eq!(structure.version, CURRENT_STRUCTURE_VERSION);
        assert_eq!(
            structure.signals[0].polarity(),
            crate::pipeline::PolarityMode::Positive
        );
    }

    #[test]
    fn test_in_memory_sync() {
        let persistence = InMemoryPersistence::new();
        assert!(persistence.get_structure_for_project().unwrap().is_none());

        let structure = DefinitionStructure::from_store(&SignalDefinitionStore::new());
        persistence.sync_definitions(&structure).unwrap();
        assert_eq!(persistence.snapshot(), Some(structure.clone()));

        let frozen = InMemoryPersistence::read_only(structure.clone());
        let mut changed = structure.clone();
        changed.version = 7;
        frozen.sync_definitions(&changed).unwrap();
        assert_eq!(frozen.snapshot(), Some(structure));
    }
}
