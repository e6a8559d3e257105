//! Concurrent zone registry - single source of truth for occupancy
//!
//! Maps zone name to its state. Each zone sits behind its own mutex so
//! mutations on different zones proceed in parallel; only the outer map
//! lock is shared, and it is held just long enough to look a zone up.

use crate::infra::config::ZoneDef;
use crate::services::zone_state::ZoneState;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Shared handle to one zone's serialized state
pub type ZoneHandle = Arc<Mutex<ZoneState>>;

/// Registry of all known zones
#[derive(Default)]
pub struct ZoneRegistry {
    zones: RwLock<HashMap<String, ZoneHandle>>,
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self { zones: RwLock::new(HashMap::new()) }
    }

    /// Build a registry from configured zone definitions
    pub fn from_defs(defs: &[ZoneDef]) -> Self {
        let registry = Self::new();
        for def in defs {
            registry.upsert(&def.name, def.capacity);
        }
        registry
    }

    /// Look up a zone by name
    pub fn get(&self, name: &str) -> Option<ZoneHandle> {
        self.zones.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.zones.read().contains_key(name)
    }

    /// Create a zone or update its capacity (admin-driven).
    ///
    /// A capacity change never resets membership; the zone's crowd level
    /// is recomputed against the new capacity.
    pub fn upsert(&self, name: &str, capacity: u32) {
        if let Some(zone) = self.get(name) {
            zone.lock().set_capacity(capacity);
            debug!(zone = %name, capacity = %capacity, "zone_capacity_updated");
            return;
        }

        let mut zones = self.zones.write();
        // Re-check under the write lock; a racing upsert may have inserted it
        if let Some(zone) = zones.get(name) {
            zone.lock().set_capacity(capacity);
            debug!(zone = %name, capacity = %capacity, "zone_capacity_updated");
        } else {
            zones.insert(name.to_string(), Arc::new(Mutex::new(ZoneState::new(name, capacity))));
            info!(zone = %name, capacity = %capacity, "zone_registered");
        }
    }

    /// All zone handles, collected at call time and ordered by name.
    ///
    /// A fresh read each call rather than a live view, so callers never
    /// iterate a map that is being mutated underneath them.
    pub fn all(&self) -> Vec<ZoneHandle> {
        let zones = self.zones.read();
        let mut handles: Vec<(String, ZoneHandle)> =
            zones.iter().map(|(name, zone)| (name.clone(), zone.clone())).collect();
        drop(zones);
        handles.sort_by(|a, b| a.0.cmp(&b.0));
        handles.into_iter().map(|(_, zone)| zone).collect()
    }

    pub fn len(&self) -> usize {
        self.zones.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.read().is_empty()
    }
}
