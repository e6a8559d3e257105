//! Versioned snapshot records for backup and restore
//!
//! The registry is periodically serialized to durable storage and restored
//! on startup so in-flight TLV timers are not lost across restarts.
//! Records are structured (not an opaque object graph) and carry a format
//! version so cross-version restores can be handled explicitly.

use crate::domain::types::UserId;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// One live presence record inside a zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupantRecord {
    pub user_id: UserId,
    /// Entry timestamp (epoch ms)
    pub entry_ms: u64,
    /// Auto-exit deadline (epoch ms)
    pub expected_exit_ms: u64,
}

/// Full state of one zone at snapshot time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRecord {
    pub name: String,
    pub capacity: u32,
    pub occupants: Vec<OccupantRecord>,
}

/// Complete point-in-time state of the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub version: u32,
    /// When the snapshot was taken (epoch ms)
    pub taken_at_ms: u64,
    /// Zone records, ordered by zone name
    pub zones: Vec<ZoneRecord>,
}

impl RegistrySnapshot {
    pub fn new(taken_at_ms: u64, mut zones: Vec<ZoneRecord>) -> Self {
        zones.sort_by(|a, b| a.name.cmp(&b.name));
        Self { version: SNAPSHOT_VERSION, taken_at_ms, zones }
    }

    /// Total number of live presence records across all zones
    pub fn occupant_count(&self) -> usize {
        self.zones.iter().map(|z| z.occupants.len()).sum()
    }
}
