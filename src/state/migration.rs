//! Structure version migrations.
//!
//! Persisted definition structures carry an integer `version`. Older
//! documents are upgraded step by step through the registry before they are
//! deserialized, so the typed model only ever sees the current layout.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::error::{Result, SignalError};

/// Version written by this build.
pub const CURRENT_STRUCTURE_VERSION: u64 = 2;

/// Oldest version that can still be upgraded.
pub const OLDEST_STRUCTURE_VERSION: u64 = 1;

type MigrationFn = fn(Value) -> Result<Value>;

/// Maps a version to the function upgrading it to the next one.
fn get_migration_registry() -> HashMap<u64, MigrationFn> {
    let mut registry: HashMap<u64, MigrationFn> = HashMap::new();
    registry.insert(1, migrate_v1_to_v2);
    registry
}

/// Read the version of a raw structure document. Missing means version 1.
pub fn structure_version(data: &Value) -> Result<u64> {
    match data.get("version") {
        None | Some(Value::Null) => Ok(OLDEST_STRUCTURE_VERSION),
        Some(value) => value.as_u64().ok_or_else(|| SignalError::InvalidDefinition {
            reason: format!("structure version must be an unsigned integer, got {value}"),
        }),
    }
}

/// Upgrade a raw structure document to [`CURRENT_STRUCTURE_VERSION`].
pub fn migrate_structure(mut data: Value) -> Result<Value> {
    let version = structure_version(&data)?;
    if version > CURRENT_STRUCTURE_VERSION || version < OLDEST_STRUCTURE_VERSION {
        return Err(SignalError::InvalidStructureVersion { version });
    }

    let registry = get_migration_registry();
    for from in version..CURRENT_STRUCTURE_VERSION {
        let to = from + 1;
        let migration = registry.get(&from).ok_or_else(|| SignalError::MigrationError {
            from,
            to,
            reason: "Migration function not found in registry".to_string(),
        })?;

        data = migration(data).map_err(|e| SignalError::MigrationError {
            from,
            to,
            reason: format!("Migration failed: {}", e),
        })?;

        if let Some(obj) = data.as_object_mut() {
            obj.insert("version".to_string(), json!(to));
        }
    }

    Ok(data)
}

/// Version 1 stored polarity as a top-level `polarity` field on each signal.
/// Version 2 expresses it as a `polarity` step at the end of the chain.
fn migrate_v1_to_v2(mut data: Value) -> Result<Value> {
    let Some(signals) = data.get_mut("signals").and_then(Value::as_array_mut) else {
        return Ok(data);
    };

    for signal in signals {
        let Some(obj) = signal.as_object_mut() else {
            return Err(SignalError::InvalidDefinition {
                reason: "signal entry is not an object".to_string(),
            });
        };
        let Some(polarity) = obj.remove("polarity") else {
            continue;
        };
        let mode = match polarity.as_str() {
            Some(mode) => mode.to_string(),
            None => {
                return Err(SignalError::InvalidDefinition {
                    reason: format!("polarity must be a string, got {polarity}"),
                })
            }
        };
        if mode == "signed" {
            continue;
        }

        let transforms = obj
            .entry("transforms".to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        let Some(steps) = transforms.as_array_mut() else {
            return Err(SignalError::InvalidDefinition {
                reason: "transforms must be an array".to_string(),
            });
        };
        let has_polarity = steps
            .iter()
            .any(|step| step.get("kind").and_then(Value::as_str) == Some("polarity"));
        if !has_polarity {
            steps.push(json!({ "kind": "polarity", "mode": mode }));
        }
    }

    Ok(data)
}
