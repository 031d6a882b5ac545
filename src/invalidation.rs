//! Cross-domain invalidation events
//!
//! Every producer of change (signal edits, band edits, audio source swaps)
//! publishes on the [`InvalidationBus`]; consumers never hold a reference to
//! another domain's store.

use serde::{Deserialize, Serialize};

use crate::bus::EventBus;
use crate::signal::SignalId;

/// The bus shared by all domains.
pub type InvalidationBus = EventBus<InvalidationEvent>;

/// A change that may invalidate cached derived state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum InvalidationEvent {
    SignalAdded {
        signal_id: SignalId,
    },
    SignalUpdated {
        signal_id: SignalId,
    },
    SignalRemoved {
        signal_id: SignalId,
    },
    BandAdded {
        source_id: String,
        band_id: String,
    },
    BandRemoved {
        source_id: String,
        band_id: String,
    },
    BandUpdated {
        source_id: String,
        band_id: String,
    },
    BandEnabledChanged {
        source_id: String,
        band_id: String,
        enabled: bool,
    },
    /// All bands of a source were removed.
    StructureCleared {
        source_id: String,
    },
    /// A band structure was imported wholesale for a source.
    StructureImported {
        source_id: String,
    },
    AudioSourceChanged {
        audio_source_id: String,
    },
}

impl InvalidationEvent {
    /// Whether this event describes a signal definition change.
    pub fn is_definition_event(&self) -> bool {
        matches!(
            self,
            InvalidationEvent::SignalAdded { .. }
                | InvalidationEvent::SignalUpdated { .. }
                | InvalidationEvent::SignalRemoved { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            InvalidationEvent::SignalAdded { .. } => "signalAdded",
            InvalidationEvent::SignalUpdated { .. } => "signalUpdated",
            InvalidationEvent::SignalRemoved { .. } => "signalRemoved",
            InvalidationEvent::BandAdded { .. } => "bandAdded",
            InvalidationEvent::BandRemoved { .. } => "bandRemoved",
            InvalidationEvent::BandUpdated { .. } => "bandUpdated",
            InvalidationEvent::BandEnabledChanged { .. } => "bandEnabledChanged",
            InvalidationEvent::StructureCleared { .. } => "structureCleared",
            InvalidationEvent::StructureImported { .. } => "structureImported",
            InvalidationEvent::AudioSourceChanged { .. } => "audioSourceChanged",
        }
    }
}
