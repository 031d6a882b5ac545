//! Definition persistence
//!
//! Provides the persisted structure, the persistence collaborator seam and
//! its in-memory and JSON file implementations, plus version migrations.

pub mod file;
pub mod migration;
pub mod structure;

pub use file::{structure_checksum, FileReport, JsonFilePersistence};
pub use migration::{migrate_structure, CURRENT_STRUCTURE_VERSION};
pub use structure::{DefinitionStructure, InMemoryPersistence, PersistenceCollaborator};
