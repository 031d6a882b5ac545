//! Derived signal definitions, results and the definition store.

mod definition;
mod result;
mod store;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use definition::{
    EventsSource, OneDSource, SignalDefinition, SignalDraft, SignalRef, SignalSource,
    SignalUpdate, StreamRef, TwoDSource,
};
pub use result::{PercentileRange, SignalResult, SignalStatus, ValueRange};
pub use store::SignalDefinitionStore;

/// Stable identifier of a derived signal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalId(String);

impl SignalId {
    /// Fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for SignalId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SignalId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&SignalId> for SignalId {
    fn from(id: &SignalId) -> Self {
        id.clone()
    }
}
