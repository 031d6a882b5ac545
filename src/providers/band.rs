//! Frequency band definitions and the bridge onto the invalidation bus.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::BandDefinitionProvider;
use crate::bus::{Callback, EventBus, Subscription};
use crate::error::Result;
use crate::invalidation::{InvalidationBus, InvalidationEvent};

/// Listener id used by [`bridge_band_events`].
pub const BAND_BRIDGE_LISTENER: &str = "invalidation-bridge";

/// A user-defined frequency band on an audio source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrequencyBand {
    pub id: String,
    pub source_id: String,
    pub label: String,
    pub low_hz: f64,
    pub high_hz: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Change notifications emitted by the band domain.
#[derive(Debug, Clone, PartialEq)]
pub enum BandEvent {
    Added { source_id: String, band_id: String },
    Removed { source_id: String, band_id: String },
    Updated { source_id: String, band_id: String },
    EnabledChanged {
        source_id: String,
        band_id: String,
        enabled: bool,
    },
    Cleared { source_id: String },
    Imported { source_id: String },
}

impl From<BandEvent> for InvalidationEvent {
    fn from(event: BandEvent) -> Self {
        match event {
            BandEvent::Added { source_id, band_id } => {
                InvalidationEvent::BandAdded { source_id, band_id }
            }
            BandEvent::Removed { source_id, band_id } => {
                InvalidationEvent::BandRemoved { source_id, band_id }
            }
            BandEvent::Updated { source_id, band_id } => {
                InvalidationEvent::BandUpdated { source_id, band_id }
            }
            BandEvent::EnabledChanged {
                source_id,
                band_id,
                enabled,
            } => InvalidationEvent::BandEnabledChanged {
                source_id,
                band_id,
                enabled,
            },
            BandEvent::Cleared { source_id } => InvalidationEvent::StructureCleared { source_id },
            BandEvent::Imported { source_id } => InvalidationEvent::StructureImported { source_id },
        }
    }
}

/// Republish every band event on the invalidation bus.
pub fn bridge_band_events(
    provider: &dyn BandDefinitionProvider,
    bus: &InvalidationBus,
) -> Subscription<BandEvent> {
    let bus = bus.clone();
    provider.subscribe(
        BAND_BRIDGE_LISTENER,
        Arc::new(move |event: &BandEvent| -> Result<()> {
            let event = InvalidationEvent::from(event.clone());
            debug!(event = event.name(), "forwarding band event");
            // Subscriber failures are logged by the bus and do not concern the band domain.
            bus.publish(&event);
            Ok(())
        }),
    )
}

/// In-memory band store.
#[derive(Default)]
pub struct BandRegistry {
    bands: RwLock<Vec<FrequencyBand>>,
    events: EventBus<BandEvent>,
}

impl BandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn emit(&self, event: BandEvent) {
        self.events.publish(&event);
    }

    pub fn add_band(&self, band: FrequencyBand) {
        let event = BandEvent::Added {
            source_id: band.source_id.clone(),
            band_id: band.id.clone(),
        };
        self.bands
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(band);
        self.emit(event);
    }

    /// Replace a band's definition. Returns false if the id is unknown.
    pub fn update_band(&self, band: FrequencyBand) -> bool {
        let event = {
            let mut bands = self.bands.write().unwrap_or_else(PoisonError::into_inner);
            let Some(slot) = bands.iter_mut().find(|b| b.id == band.id) else {
                return false;
            };
            let event = BandEvent::Updated {
                source_id: band.source_id.clone(),
                band_id: band.id.clone(),
            };
            *slot = band;
            event
        };
        self.emit(event);
        true
    }

    pub fn set_enabled(&self, band_id: &str, enabled: bool) -> bool {
        let event = {
            let mut bands = self.bands.write().unwrap_or_else(PoisonError::into_inner);
            let Some(slot) = bands.iter_mut().find(|b| b.id == band_id) else {
                return false;
            };
            if slot.enabled == enabled {
                return true;
            }
            slot.enabled = enabled;
            BandEvent::EnabledChanged {
                source_id: slot.source_id.clone(),
                band_id: slot.id.clone(),
                enabled,
            }
        };
        self.emit(event);
        true
    }

    pub fn remove_band(&self, band_id: &str) -> Option<FrequencyBand> {
        let removed = {
            let mut bands = self.bands.write().unwrap_or_else(PoisonError::into_inner);
            let index = bands.iter().position(|b| b.id == band_id)?;
            bands.remove(index)
        };
        self.emit(BandEvent::Removed {
            source_id: removed.source_id.clone(),
            band_id: removed.id.clone(),
        });
        Some(removed)
    }

    /// Remove every band of `source_id`.
    pub fn clear_source(&self, source_id: &str) {
        self.bands
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|b| b.source_id != source_id);
        self.emit(BandEvent::Cleared {
            source_id: source_id.to_string(),
        });
    }

    /// Replace every band of `source_id` with `bands`.
    pub fn import_source(&self, source_id: &str, bands: Vec<FrequencyBand>) {
        {
            let mut current = self.bands.write().unwrap_or_else(PoisonError::into_inner);
            current.retain(|b| b.source_id != source_id);
            current.extend(bands.into_iter().filter(|b| b.source_id == source_id));
        }
        self.emit(BandEvent::Imported {
            source_id: source_id.to_string(),
        });
    }

    pub fn get_band(&self, band_id: &str) -> Option<FrequencyBand> {
        self.bands
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|b| b.id == band_id)
            .cloned()
    }
}

impl BandDefinitionProvider for BandRegistry {
    fn subscribe(
        &self,
        listener_id: &str,
        callback: Callback<BandEvent>,
    ) -> Subscription<BandEvent> {
        self.events.subscribe_callback(listener_id, callback)
    }

    fn get_bands_for_source(&self, source_id: &str) -> Vec<FrequencyBand> {
        self.bands
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|b| b.source_id == source_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn band(id: &str, source_id: &str) -> FrequencyBand {
        FrequencyBand {
            id: id.to_string(),
            source_id: source_id.to_string(),
            label: id.to_uppercase(),
            low_hz: 20.0,
            high_hz: 200.0,
            enabled: true,
        }
    }

    #[test]
    fn test_bridge_forwards_band_events() {
        let registry = BandRegistry::new();
        let bus = InvalidationBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _ = bus.subscribe("test", move |event: &InvalidationEvent| {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        });

        let _bridge = bridge_band_events(&registry, &bus);
        registry.add_band(band("low", "track"));
        registry.set_enabled("low", false);
        registry.clear_source("track");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(
            seen[1],
            InvalidationEvent::BandEnabledChanged {
                source_id: "track".to_string(),
                band_id: "low".to_string(),
                enabled: false,
            }
        );
        assert_eq!(
            seen[2],
            InvalidationEvent::StructureCleared {
                source_id: "track".to_string()
            }
        );
    }

    #[test]
    fn test_bands_for_source() {
        let registry = BandRegistry::new();
        registry.add_band(band("low", "a"));
        registry.add_band(band("mid", "b"));
        registry.import_source("a", vec![band("high", "a"), band("stray", "b")]);

        let bands = registry.get_bands_for_source("a");
        assert_eq!(bands.len(), 1);
        assert_eq!(bands[0].id, "high");
        assert!(registry.get_band("stray").is_none());
        assert!(registry.remove_band("mid").is_some());
        assert!(!registry.update_band(band("mid", "b")));
    }
}
